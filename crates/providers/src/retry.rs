use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};

/// Bounded retry with exponential backoff and jitter.
///
/// Only errors whose `is_transient()` is true are retried; everything else
/// surfaces on the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Relative jitter applied to each backoff, e.g. 0.2 for ±20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * 2f64.powi(attempt as i32);
        let base = base.min(self.max_backoff.as_secs_f64());
        let jittered = if self.jitter > 0.0 {
            let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
            base * factor
        } else {
            base
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Runs `op` under `policy`, aborting pending waits when `cancel` fires.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            r = op() => r,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                let backoff = policy.backoff_for(attempt);
                warn!(attempt = attempt + 1, ?backoff, %err, "transient provider error, backing off");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                attempt += 1;
            }
            Err(err) => {
                debug!(attempt = attempt + 1, %err, "provider call failed");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            jitter: 0.0,
        }
    }

    #[tokio::test]
    async fn transient_error_then_success_uses_two_calls() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let cancel = CancellationToken::new();

        let result = with_retry(&fast_policy(3), &cancel, move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProviderError::Timeout("first".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transient_errors_are_bounded_by_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let cancel = CancellationToken::new();

        let result: ProviderResult<()> = with_retry(&fast_policy(3), &cancel, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Unavailable {
                    status: 503,
                    message: "down".into(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn deterministic_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let cancel = CancellationToken::new();

        let result: ProviderResult<()> = with_retry(&fast_policy(3), &cancel, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Auth("bad key".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: ProviderResult<()> =
            with_retry(&fast_policy(3), &cancel, || async { Ok(()) }).await;

        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }
}
