use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors surfaced by external providers (ASR, LLM, embedding, vector store).
///
/// The transient kinds are eligible for retry; everything else surfaces
/// immediately.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("upstream timeout: {0}")]
    Timeout(String),

    #[error("upstream unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("prompt exceeds the model context window: {0}")]
    ContextLength(String),

    #[error("bad request to provider: {0}")]
    BadRequest(String),

    #[error("embedding dimension {actual} does not match collection dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("provider does not accept this input form: {0}")]
    UnsupportedInput(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("malformed provider response: {0}")]
    Decode(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether the retry wrapper may re-issue the call.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::Unavailable { .. }
                | ProviderError::RateLimited(_)
        )
    }

    /// Folds a reqwest transport error into the taxonomy.
    pub fn from_http(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_connect() {
            ProviderError::Unavailable {
                status: 0,
                message: err.to_string(),
            }
        } else {
            ProviderError::Decode(err.to_string())
        }
    }

    /// Maps an HTTP status + body into the taxonomy shared by all REST providers.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ProviderError::Auth(body),
            408 => ProviderError::Timeout(body),
            429 => ProviderError::RateLimited(body),
            400 | 413 if looks_like_context_overflow(&body) => ProviderError::ContextLength(body),
            400..=499 => ProviderError::BadRequest(body),
            _ => ProviderError::Unavailable {
                status,
                message: body,
            },
        }
    }
}

fn looks_like_context_overflow(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("context length")
        || lower.contains("context_length")
        || lower.contains("maximum context")
        || lower.contains("too many tokens")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Timeout("t".into()).is_transient());
        assert!(ProviderError::Unavailable {
            status: 503,
            message: "down".into()
        }
        .is_transient());
        assert!(ProviderError::RateLimited("slow down".into()).is_transient());
        assert!(!ProviderError::Auth("bad key".into()).is_transient());
        assert!(!ProviderError::ContextLength("too long".into()).is_transient());
        assert!(!ProviderError::Cancelled.is_transient());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ProviderError::from_status(401, "no".into()),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(429, "no".into()),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::from_status(500, "boom".into()),
            ProviderError::Unavailable { status: 500, .. }
        ));
        assert!(matches!(
            ProviderError::from_status(400, "maximum context length exceeded".into()),
            ProviderError::ContextLength(_)
        ));
        assert!(matches!(
            ProviderError::from_status(400, "missing field".into()),
            ProviderError::BadRequest(_)
        ));
    }
}
