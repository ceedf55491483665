use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::vector::{VectorRecord, VectorStore};

/// Cam++ speaker embeddings are 192-dimensional.
pub const VOICEPRINT_DIM: usize = 192;

/// Thin facade over the vector store bound to the voiceprint collection.
///
/// One logical record per employee: re-registering replaces the previous
/// embedding. The document field stores the display name.
pub struct VoiceprintStore {
    store: Arc<dyn VectorStore>,
    collection: String,
}

#[derive(Debug, Clone)]
pub struct VoiceprintMatch {
    pub employee_id: String,
    pub name: String,
    pub similarity: f64,
}

impl VoiceprintStore {
    pub fn new(store: Arc<dyn VectorStore>, collection: String) -> Self {
        Self { store, collection }
    }

    pub async fn ensure_ready(&self) -> ProviderResult<()> {
        self.store
            .ensure_collection(&self.collection, VOICEPRINT_DIM)
            .await
    }

    pub async fn register(
        &self,
        employee_id: &str,
        name: &str,
        embedding: Vec<f32>,
    ) -> ProviderResult<()> {
        if embedding.len() != VOICEPRINT_DIM {
            return Err(ProviderError::DimensionMismatch {
                expected: VOICEPRINT_DIM,
                actual: embedding.len(),
            });
        }

        self.ensure_ready().await?;
        self.store
            .delete_where(&self.collection, json!({ "employee_id": employee_id }))
            .await?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("employee_id".into(), json!(employee_id));
        metadata.insert("registered_at".into(), json!(Utc::now().to_rfc3339()));

        self.store
            .upsert(
                &self.collection,
                vec![VectorRecord {
                    id: employee_id.to_string(),
                    embedding,
                    document: name.to_string(),
                    metadata,
                }],
            )
            .await?;
        debug!(employee_id, name, "voiceprint registered");
        Ok(())
    }

    /// Top-1 nearest voiceprint; the caller applies the similarity threshold.
    pub async fn match_top1(&self, embedding: &[f32]) -> ProviderResult<Option<VoiceprintMatch>> {
        let hits = self
            .store
            .query(&self.collection, embedding, 1, None)
            .await?;

        Ok(hits.into_iter().next().map(|hit| VoiceprintMatch {
            employee_id: hit
                .metadata
                .get("employee_id")
                .and_then(|v| v.as_str())
                .unwrap_or(&hit.id)
                .to_string(),
            name: hit.document,
            similarity: hit.similarity,
        }))
    }

    pub async fn count(&self) -> ProviderResult<usize> {
        self.store.count(&self.collection).await
    }

    pub async fn ready(&self) -> bool {
        self.store.ready().await
    }
}
