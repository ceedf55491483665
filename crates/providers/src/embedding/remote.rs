use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::embedding::EmbeddingProvider;
use crate::error::{ProviderError, ProviderResult};

/// Client for an OpenAI-style `/embeddings` endpoint (BGE-M3 deployments and
/// hosted embedding APIs both expose this shape).
pub struct RemoteEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl RemoteEmbeddingProvider {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        dimension: usize,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::from_http)?;
        info!(%base_url, %model, dimension, "embedding provider configured");
        Ok(Self {
            client,
            base_url,
            api_key,
            model,
            dimension,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn name(&self) -> &str {
        "remote"
    }

    async fn embed(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(ProviderError::from_http)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        if body.data.len() != texts.len() {
            return Err(ProviderError::Decode(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        let mut items = body.data;
        items.sort_by_key(|item| item.index);

        for item in &items {
            if item.embedding.len() != self.dimension {
                return Err(ProviderError::DimensionMismatch {
                    expected: self.dimension,
                    actual: item.embedding.len(),
                });
            }
        }

        Ok(items.into_iter().map(|item| item.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn ready(&self) -> bool {
        !self.base_url.is_empty()
    }
}
