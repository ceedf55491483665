pub mod hash;
pub mod remote;

use async_trait::async_trait;

use crate::error::ProviderResult;

pub use hash::HashEmbeddingProvider;
pub use remote::RemoteEmbeddingProvider;

/// Contract for text-embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Embeds a batch of texts, one vector per input, all of `dimension()` length.
    async fn embed(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    async fn ready(&self) -> bool;
}
