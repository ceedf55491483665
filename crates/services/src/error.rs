use thiserror::Error;

use scribeflow_providers::error::ProviderError;
use scribeflow_transcription::engine::EngineError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Request-level error taxonomy surfaced to the API layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("audio runs {actual:.0}s, over the {limit:.0}s cap")]
    DurationExceeded { limit: f64, actual: f64 },

    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream authentication failed: {0}")]
    UpstreamAuth(String),

    #[error("prompt exceeds the context window: {0}")]
    ContextLength(String),

    #[error("embedding dimension {actual} does not match collection dimension {expected}")]
    VectorDimMismatch { expected: usize, actual: usize },

    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable error-kind string reported in API responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::BadInput(_) => "BAD_INPUT",
            ServiceError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ServiceError::DurationExceeded { .. } => "DURATION_EXCEEDED",
            ServiceError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            ServiceError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            ServiceError::UpstreamAuth(_) => "UPSTREAM_AUTH",
            ServiceError::ContextLength(_) => "CONTEXT_LENGTH",
            ServiceError::VectorDimMismatch { .. } => "VECTOR_DIM_MISMATCH",
            ServiceError::Cancelled => "CANCELLED",
            ServiceError::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ServiceError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<ProviderError> for ServiceError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout(m) => ServiceError::UpstreamTimeout(m),
            ProviderError::Unavailable { status, message } => {
                ServiceError::UpstreamUnavailable(format!("status {}: {}", status, message))
            }
            ProviderError::RateLimited(m) => ServiceError::UpstreamUnavailable(m),
            ProviderError::Auth(m) => ServiceError::UpstreamAuth(m),
            ProviderError::ContextLength(m) => ServiceError::ContextLength(m),
            ProviderError::DimensionMismatch { expected, actual } => {
                ServiceError::VectorDimMismatch { expected, actual }
            }
            ProviderError::UnsupportedInput(m) => ServiceError::UnsupportedFormat(m),
            ProviderError::Cancelled => ServiceError::Cancelled,
            ProviderError::BadRequest(m) => ServiceError::BadInput(m),
            ProviderError::Decode(m) | ProviderError::NotConfigured(m) => {
                ServiceError::Internal(m)
            }
        }
    }
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::DurationExceeded { limit, actual } => {
                ServiceError::DurationExceeded { limit, actual }
            }
            EngineError::UnsupportedFormat { provider, reason } => {
                ServiceError::UnsupportedFormat(format!("{}: {}", provider, reason))
            }
            EngineError::Cancelled => ServiceError::Cancelled,
            EngineError::Provider(inner) => inner.into(),
        }
    }
}
