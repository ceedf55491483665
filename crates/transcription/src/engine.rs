use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scribeflow_providers::asr::{AsrInput, AsrOptions, AsrOutcome, AsrProvider};
use scribeflow_providers::error::ProviderError;

use crate::audio;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("audio runs {actual:.0}s, over the {limit:.0}s cap")]
    DurationExceeded { limit: f64, actual: f64 },

    #[error("audio incompatible with the {provider} provider: {reason}")]
    UnsupportedFormat { provider: String, reason: String },

    #[error("recognition cancelled")]
    Cancelled,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Drives one ASR provider call: capability checks, duration cap, hotword
/// biasing, cancellation.
pub struct AsrEngine {
    provider: Arc<dyn AsrProvider>,
    max_duration_secs: f64,
}

impl AsrEngine {
    pub fn new(provider: Arc<dyn AsrProvider>, max_duration_secs: f64) -> Self {
        Self {
            provider,
            max_duration_secs,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn recognize(
        &self,
        input: AsrInput,
        opts: &AsrOptions,
        cancel: &CancellationToken,
    ) -> Result<AsrOutcome, EngineError> {
        match &input {
            AsrInput::Bytes { data, .. } => {
                if !self.provider.accepts_bytes() {
                    return Err(EngineError::UnsupportedFormat {
                        provider: self.provider.name().to_string(),
                        reason: "provider only accepts publicly reachable URLs".into(),
                    });
                }
                // The cap is probed from the container header; non-WAV
                // uploads are bounded by the provider instead.
                if audio::is_wav(data) {
                    match audio::wav_duration_secs(data) {
                        Ok(duration) if duration > self.max_duration_secs => {
                            return Err(EngineError::DurationExceeded {
                                limit: self.max_duration_secs,
                                actual: duration,
                            });
                        }
                        Ok(duration) => {
                            debug!(duration, "audio duration within cap");
                        }
                        Err(e) => warn!(%e, "could not probe audio duration"),
                    }
                }
            }
            AsrInput::Url(_) => {
                if !self.provider.accepts_url() {
                    return Err(EngineError::UnsupportedFormat {
                        provider: self.provider.name().to_string(),
                        reason: "provider does not fetch remote URLs".into(),
                    });
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            result = self.provider.recognize(input, opts) => Ok(result?),
        }
    }
}
