use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scribeflow_providers::error::{ProviderError, ProviderResult};
use scribeflow_providers::llm::{ChatPrompt, Completion, LlmOptions, LlmProvider};
use scribeflow_providers::retry::{with_retry, RetryPolicy};

use crate::error::ServiceResult;

/// Drives the minute-generation LLM call with bounded retry.
///
/// Transient failures back off 1s/2s/4s with 20% jitter for at most three
/// provider calls. A context-window overflow halves `max_tokens` once and
/// retries; a second overflow surfaces.
pub struct LlmOrchestrator {
    policy: RetryPolicy,
}

impl Default for LlmOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmOrchestrator {
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_secs(1),
                max_backoff: Duration::from_secs(4),
                jitter: 0.2,
            },
        }
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub async fn generate(
        &self,
        llm: &Arc<dyn LlmProvider>,
        prompt: &ChatPrompt,
        opts: &LlmOptions,
        cancel: &CancellationToken,
    ) -> ServiceResult<Completion> {
        match self.attempt(llm, prompt, opts, cancel).await {
            Err(ProviderError::ContextLength(reason)) if opts.max_tokens > 1 => {
                let mut reduced = opts.clone();
                reduced.max_tokens = opts.max_tokens / 2;
                warn!(
                    %reason,
                    max_tokens = reduced.max_tokens,
                    "context overflow, retrying once with halved max_tokens"
                );
                self.attempt(llm, prompt, &reduced, cancel)
                    .await
                    .map_err(Into::into)
            }
            other => other.map_err(Into::into),
        }
    }

    async fn attempt(
        &self,
        llm: &Arc<dyn LlmProvider>,
        prompt: &ChatPrompt,
        opts: &LlmOptions,
        cancel: &CancellationToken,
    ) -> ProviderResult<Completion> {
        let completion = with_retry(&self.policy, cancel, || llm.complete(prompt, opts)).await?;
        info!(
            provider = llm.name(),
            usage_tokens = completion.usage_tokens,
            chars = completion.text.len(),
            "minutes generated"
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct ScriptedLlm {
        calls: AtomicU32,
        script: Mutex<Vec<ProviderResult<Completion>>>,
        seen_max_tokens: Mutex<Vec<u32>>,
    }

    impl ScriptedLlm {
        fn new(script: Vec<ProviderResult<Completion>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                script: Mutex::new(script),
                seen_max_tokens: Mutex::new(Vec::new()),
            })
        }

        fn completion(text: &str) -> Completion {
            Completion {
                text: text.into(),
                usage_tokens: 100,
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _prompt: &ChatPrompt,
            opts: &LlmOptions,
        ) -> ProviderResult<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_max_tokens.lock().unwrap().push(opts.max_tokens);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(Self::completion("default"))
            } else {
                script.remove(0)
            }
        }

        async fn ready(&self) -> bool {
            true
        }
    }

    fn fast_orchestrator() -> LlmOrchestrator {
        LlmOrchestrator::with_policy(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            jitter: 0.0,
        })
    }

    fn prompt() -> ChatPrompt {
        ChatPrompt {
            system: Some("sys".into()),
            user: "user".into(),
        }
    }

    #[tokio::test]
    async fn transient_failure_then_success_makes_two_calls() {
        let llm = ScriptedLlm::new(vec![
            Err(ProviderError::Timeout("blip".into())),
            Ok(ScriptedLlm::completion("ok")),
        ]);
        let provider: Arc<dyn LlmProvider> = llm.clone();

        let completion = fast_orchestrator()
            .generate(
                &provider,
                &prompt(),
                &LlmOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(completion.text, "ok");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn auth_failure_makes_one_call_and_surfaces() {
        let llm = ScriptedLlm::new(vec![Err(ProviderError::Auth("bad key".into()))]);
        let provider: Arc<dyn LlmProvider> = llm.clone();

        let err = fast_orchestrator()
            .generate(
                &provider,
                &prompt(),
                &LlmOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "UPSTREAM_AUTH");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn context_overflow_halves_max_tokens_once() {
        let llm = ScriptedLlm::new(vec![
            Err(ProviderError::ContextLength("too long".into())),
            Ok(ScriptedLlm::completion("fits now")),
        ]);
        let provider: Arc<dyn LlmProvider> = llm.clone();

        let completion = fast_orchestrator()
            .generate(
                &provider,
                &prompt(),
                &LlmOptions {
                    max_tokens: 2000,
                    ..Default::default()
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(completion.text, "fits now");
        let seen = llm.seen_max_tokens.lock().unwrap().clone();
        assert_eq!(seen, vec![2000, 1000]);
    }

    #[tokio::test]
    async fn double_context_overflow_surfaces() {
        let llm = ScriptedLlm::new(vec![
            Err(ProviderError::ContextLength("too long".into())),
            Err(ProviderError::ContextLength("still too long".into())),
        ]);
        let provider: Arc<dyn LlmProvider> = llm.clone();

        let err = fast_orchestrator()
            .generate(
                &provider,
                &prompt(),
                &LlmOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "CONTEXT_LENGTH");
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }
}
