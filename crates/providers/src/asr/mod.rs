pub mod funasr;
pub mod tencent;

use async_trait::async_trait;

use crate::error::ProviderResult;

/// Audio handed to an ASR provider: either raw bytes or a fetchable URL.
#[derive(Debug, Clone)]
pub enum AsrInput {
    Bytes { filename: String, data: Vec<u8> },
    Url(String),
}

impl AsrInput {
    pub fn is_bytes(&self) -> bool {
        matches!(self, AsrInput::Bytes { .. })
    }
}

/// Recognition options resolved by the engine before each call.
#[derive(Debug, Clone, Default)]
pub struct AsrOptions {
    pub enable_punctuation: bool,
    pub enable_diarization: bool,
    /// Space-separated biasing vocabulary rendered from the hotword table.
    pub hotword_blob: String,
    pub language_hint: Option<String>,
}

/// One recognized utterance. The raw speaker label is provider-specific
/// (may be sparse, non-integer, or absent) and is normalized downstream.
#[derive(Debug, Clone)]
pub struct AsrSegment {
    pub text: String,
    pub start_s: f64,
    pub end_s: f64,
    pub speaker_label: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AsrOutcome {
    pub full_text: String,
    pub segments: Vec<AsrSegment>,
}

/// Contract for pluggable speech recognizers.
#[async_trait]
pub trait AsrProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Whether the provider can consume raw audio bytes.
    fn accepts_bytes(&self) -> bool;

    /// Whether the provider can consume a remote URL.
    fn accepts_url(&self) -> bool;

    async fn recognize(&self, input: AsrInput, opts: &AsrOptions) -> ProviderResult<AsrOutcome>;

    /// Liveness probe used by the health endpoint.
    async fn ready(&self) -> bool;
}
