use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::vector::{l2_similarity, ScoredPoint, StoredPoint, VectorRecord, VectorStore};

/// REST client for a Chroma server.
///
/// Collections are resolved once and cached (`name -> id, dim`); documents
/// and embeddings are managed explicitly, the server only stores and
/// searches.
pub struct ChromaStore {
    client: reqwest::Client,
    base_url: String,
    collections: DashMap<String, CollectionHandle>,
}

#[derive(Clone)]
struct CollectionHandle {
    id: String,
    dim: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Vec<Vec<Option<serde_json::Map<String, Value>>>>,
    #[serde(default)]
    distances: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    documents: Vec<Option<String>>,
    #[serde(default)]
    metadatas: Vec<Option<serde_json::Map<String, Value>>>,
}

impl ChromaStore {
    pub fn new(host: &str, port: u16, timeout: Duration) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::from_http)?;
        let base_url = format!("http://{}:{}/api/v1", host, port);
        info!(%base_url, "chroma vector store configured");
        Ok(Self {
            client,
            base_url,
            collections: DashMap::new(),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ProviderResult<reqwest::Response> {
        let response = request.send().await.map_err(ProviderError::from_http)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }
        Ok(response)
    }

    async fn handle(&self, name: &str) -> ProviderResult<CollectionHandle> {
        if let Some(handle) = self.collections.get(name) {
            return Ok(handle.clone());
        }

        let response = self
            .send(
                self.client
                    .get(format!("{}/collections/{}", self.base_url, name)),
            )
            .await?;
        let info: CollectionInfo = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let handle = CollectionHandle {
            id: info.id,
            dim: info
                .metadata
                .as_ref()
                .and_then(|m| m.get("embedding_dimension"))
                .and_then(|v| v.as_u64())
                .map(|v| v as usize),
        };
        self.collections.insert(name.to_string(), handle.clone());
        Ok(handle)
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    fn name(&self) -> &str {
        "chroma"
    }

    async fn ensure_collection(&self, name: &str, dim: usize) -> ProviderResult<()> {
        let response = self
            .send(self.client.post(format!("{}/collections", self.base_url)).json(&json!({
                "name": name,
                "get_or_create": true,
                "metadata": {
                    "hnsw:space": "l2",
                    "embedding_dimension": dim,
                },
            })))
            .await?;

        let info: CollectionInfo = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let stored_dim = info
            .metadata
            .as_ref()
            .and_then(|m| m.get("embedding_dimension"))
            .and_then(|v| v.as_u64())
            .map(|v| v as usize);
        if let Some(stored) = stored_dim {
            if stored != dim {
                return Err(ProviderError::DimensionMismatch {
                    expected: stored,
                    actual: dim,
                });
            }
        }

        self.collections.insert(
            name.to_string(),
            CollectionHandle {
                id: info.id,
                dim: Some(stored_dim.unwrap_or(dim)),
            },
        );
        debug!(collection = name, dim, "collection ready");
        Ok(())
    }

    async fn upsert(&self, name: &str, records: Vec<VectorRecord>) -> ProviderResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let handle = self.handle(name).await?;

        if let Some(dim) = handle.dim {
            for record in &records {
                if record.embedding.len() != dim {
                    return Err(ProviderError::DimensionMismatch {
                        expected: dim,
                        actual: record.embedding.len(),
                    });
                }
            }
        }

        let ids: Vec<&String> = records.iter().map(|r| &r.id).collect();
        let embeddings: Vec<&Vec<f32>> = records.iter().map(|r| &r.embedding).collect();
        let documents: Vec<&String> = records.iter().map(|r| &r.document).collect();
        let metadatas: Vec<&serde_json::Map<String, Value>> =
            records.iter().map(|r| &r.metadata).collect();

        self.send(
            self.client
                .post(format!(
                    "{}/collections/{}/upsert",
                    self.base_url, handle.id
                ))
                .json(&json!({
                    "ids": ids,
                    "embeddings": embeddings,
                    "documents": documents,
                    "metadatas": metadatas,
                })),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<Value>,
    ) -> ProviderResult<Vec<ScoredPoint>> {
        let handle = self.handle(name).await?;

        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": top_k,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(filter) = filter {
            body["where"] = filter;
        }

        let response = self
            .send(
                self.client
                    .post(format!(
                        "{}/collections/{}/query",
                        self.base_url, handle.id
                    ))
                    .json(&body),
            )
            .await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let ids = parsed.ids.into_iter().next().unwrap_or_default();
        let documents = parsed.documents.into_iter().next().unwrap_or_default();
        let metadatas = parsed.metadatas.into_iter().next().unwrap_or_default();
        let distances = parsed.distances.into_iter().next().unwrap_or_default();

        let mut hits = Vec::with_capacity(ids.len());
        for (i, id) in ids.into_iter().enumerate() {
            hits.push(ScoredPoint {
                id,
                similarity: distances
                    .get(i)
                    .copied()
                    .map(l2_similarity)
                    .unwrap_or(0.0),
                document: documents
                    .get(i)
                    .cloned()
                    .flatten()
                    .unwrap_or_default(),
                metadata: metadatas.get(i).cloned().flatten().unwrap_or_default(),
            });
        }
        Ok(hits)
    }

    async fn fetch_where(
        &self,
        name: &str,
        filter: Value,
        limit: usize,
    ) -> ProviderResult<Vec<StoredPoint>> {
        let handle = self.handle(name).await?;

        let response = self
            .send(
                self.client
                    .post(format!("{}/collections/{}/get", self.base_url, handle.id))
                    .json(&json!({
                        "where": filter,
                        "limit": limit,
                        "include": ["documents", "metadatas"],
                    })),
            )
            .await?;
        let parsed: GetResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let mut points = Vec::with_capacity(parsed.ids.len());
        for (i, id) in parsed.ids.into_iter().enumerate() {
            points.push(StoredPoint {
                id,
                document: parsed
                    .documents
                    .get(i)
                    .cloned()
                    .flatten()
                    .unwrap_or_default(),
                metadata: parsed
                    .metadatas
                    .get(i)
                    .cloned()
                    .flatten()
                    .unwrap_or_default(),
            });
        }
        Ok(points)
    }

    async fn delete_where(&self, name: &str, filter: Value) -> ProviderResult<()> {
        let handle = self.handle(name).await?;
        self.send(
            self.client
                .post(format!(
                    "{}/collections/{}/delete",
                    self.base_url, handle.id
                ))
                .json(&json!({ "where": filter })),
        )
        .await?;
        Ok(())
    }

    async fn count(&self, name: &str) -> ProviderResult<usize> {
        let handle = self.handle(name).await?;
        let response = self
            .send(
                self.client
                    .get(format!("{}/collections/{}/count", self.base_url, handle.id)),
            )
            .await?;
        response
            .json::<usize>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn ready(&self) -> bool {
        self.client
            .get(format!("{}/heartbeat", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
