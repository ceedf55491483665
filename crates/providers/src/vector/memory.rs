use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::info;

use crate::error::{ProviderError, ProviderResult};
use crate::vector::{
    filter_matches, l2_similarity, ScoredPoint, StoredPoint, VectorRecord, VectorStore,
};

/// In-process vector store with exact L2 search.
///
/// Selected by `vector.kind = "memory"`; keeps the service usable without an
/// external store and backs the test suite.
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: DashMap<String, Collection>,
}

struct Collection {
    dim: usize,
    records: Vec<VectorRecord>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        info!("in-memory vector store active");
        Self::default()
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure_collection(&self, name: &str, dim: usize) -> ProviderResult<()> {
        if let Some(existing) = self.collections.get(name) {
            if existing.dim != dim {
                return Err(ProviderError::DimensionMismatch {
                    expected: existing.dim,
                    actual: dim,
                });
            }
            return Ok(());
        }
        self.collections.insert(
            name.to_string(),
            Collection {
                dim,
                records: Vec::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, name: &str, records: Vec<VectorRecord>) -> ProviderResult<()> {
        let mut collection = self
            .collections
            .get_mut(name)
            .ok_or_else(|| ProviderError::NotConfigured(format!("collection {} missing", name)))?;

        // Validate the whole batch before touching the collection, so a
        // mismatch mid-batch leaves no partial writes.
        for record in &records {
            if record.embedding.len() != collection.dim {
                return Err(ProviderError::DimensionMismatch {
                    expected: collection.dim,
                    actual: record.embedding.len(),
                });
            }
        }

        for record in records {
            collection.records.retain(|r| r.id != record.id);
            collection.records.push(record);
        }
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<Value>,
    ) -> ProviderResult<Vec<ScoredPoint>> {
        let collection = self
            .collections
            .get(name)
            .ok_or_else(|| ProviderError::NotConfigured(format!("collection {} missing", name)))?;

        let mut hits: Vec<ScoredPoint> = collection
            .records
            .iter()
            .filter(|r| {
                filter
                    .as_ref()
                    .map(|f| filter_matches(f, &r.metadata))
                    .unwrap_or(true)
            })
            .map(|r| ScoredPoint {
                id: r.id.clone(),
                similarity: l2_similarity(l2_distance(&r.embedding, embedding)),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn fetch_where(
        &self,
        name: &str,
        filter: Value,
        limit: usize,
    ) -> ProviderResult<Vec<StoredPoint>> {
        let collection = self
            .collections
            .get(name)
            .ok_or_else(|| ProviderError::NotConfigured(format!("collection {} missing", name)))?;

        Ok(collection
            .records
            .iter()
            .filter(|r| filter_matches(&filter, &r.metadata))
            .take(limit)
            .map(|r| StoredPoint {
                id: r.id.clone(),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
            })
            .collect())
    }

    async fn delete_where(&self, name: &str, filter: Value) -> ProviderResult<()> {
        let mut collection = self
            .collections
            .get_mut(name)
            .ok_or_else(|| ProviderError::NotConfigured(format!("collection {} missing", name)))?;
        collection
            .records
            .retain(|r| !filter_matches(&filter, &r.metadata));
        Ok(())
    }

    async fn count(&self, name: &str) -> ProviderResult<usize> {
        Ok(self
            .collections
            .get(name)
            .map(|c| c.records.len())
            .unwrap_or(0))
    }

    async fn ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, embedding: Vec<f32>, source_id: i64) -> VectorRecord {
        let mut metadata = serde_json::Map::new();
        metadata.insert("source_id".into(), json!(source_id));
        VectorRecord {
            id: id.into(),
            embedding,
            document: format!("doc {}", id),
            metadata,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = MemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert("c", vec![record("a", vec![0.0, 0.0], 1)])
            .await
            .unwrap();
        store
            .upsert("c", vec![record("a", vec![1.0, 1.0], 1)])
            .await
            .unwrap();
        assert_eq!(store.count("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_ranks_by_similarity_and_honors_filter() {
        let store = MemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    record("near", vec![0.1, 0.0], 1),
                    record("far", vec![5.0, 5.0], 1),
                    record("other", vec![0.0, 0.0], 2),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .query("c", &[0.0, 0.0], 2, Some(json!({"source_id": 1})))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "near");
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = MemoryVectorStore::new();
        store.ensure_collection("c", 3).await.unwrap();
        let err = store
            .upsert("c", vec![record("a", vec![0.0, 0.0], 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn mismatch_mid_batch_writes_nothing() {
        let store = MemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        let err = store
            .upsert(
                "c",
                vec![
                    record("ok", vec![0.0, 0.0], 1),
                    record("bad", vec![0.0, 0.0, 0.0], 1),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::DimensionMismatch { .. }));
        assert_eq!(store.count("c").await.unwrap(), 0);
    }
}
