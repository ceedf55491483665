pub mod asr;
pub mod embedding;
pub mod error;
pub mod factory;
pub mod llm;
pub mod retry;
pub mod vector;
pub mod voiceprint;

pub use asr::{AsrInput, AsrOptions, AsrOutcome, AsrProvider, AsrSegment};
pub use embedding::EmbeddingProvider;
pub use error::{ProviderError, ProviderResult};
pub use factory::{AsrKind, LlmKind, ProviderHealth, Providers};
pub use llm::{ChatPrompt, Completion, LlmOptions, LlmProvider};
pub use retry::{with_retry, RetryPolicy};
pub use vector::{l2_similarity, ScoredPoint, StoredPoint, VectorStore, VectorRecord};
pub use voiceprint::{VoiceprintMatch, VoiceprintStore, VOICEPRINT_DIM};
