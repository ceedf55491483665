pub mod chroma;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderResult;

pub use chroma::ChromaStore;
pub use memory::MemoryVectorStore;

/// Converts an L2 distance to a similarity score in (0, 1].
///
/// Stores report raw distances; all comparisons in the core happen in
/// similarity space.
pub fn l2_similarity(distance: f64) -> f64 {
    1.0 / (1.0 + distance.max(0.0))
}

/// A record to upsert.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: serde_json::Map<String, Value>,
}

/// A query hit, with the distance already converted to similarity.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub similarity: f64,
    pub document: String,
    pub metadata: serde_json::Map<String, Value>,
}

/// A record fetched by metadata filter (no scoring involved).
#[derive(Debug, Clone)]
pub struct StoredPoint {
    pub id: String,
    pub document: String,
    pub metadata: serde_json::Map<String, Value>,
}

/// Contract for vector stores.
///
/// `filter` values follow the Chroma `where` shape: `{"field": value}` for
/// equality and `{"field": {"$in": [..]}}` for membership.
#[async_trait]
pub trait VectorStore: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Creates the collection if missing; fails with a dimension mismatch
    /// when it already exists with a different dimension.
    async fn ensure_collection(&self, name: &str, dim: usize) -> ProviderResult<()>;

    async fn upsert(&self, name: &str, records: Vec<VectorRecord>) -> ProviderResult<()>;

    async fn query(
        &self,
        name: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<Value>,
    ) -> ProviderResult<Vec<ScoredPoint>>;

    async fn fetch_where(
        &self,
        name: &str,
        filter: Value,
        limit: usize,
    ) -> ProviderResult<Vec<StoredPoint>>;

    async fn delete_where(&self, name: &str, filter: Value) -> ProviderResult<()>;

    async fn count(&self, name: &str) -> ProviderResult<usize>;

    async fn ready(&self) -> bool;
}

/// Evaluates a Chroma-shaped equality/`$in` filter against a metadata map.
/// Shared by the in-memory store and tests.
pub fn filter_matches(filter: &Value, metadata: &serde_json::Map<String, Value>) -> bool {
    let Some(object) = filter.as_object() else {
        return true;
    };
    object.iter().all(|(field, expected)| {
        let actual = metadata.get(field);
        match expected {
            Value::Object(op) => match (op.get("$in"), actual) {
                (Some(Value::Array(candidates)), Some(actual)) => candidates.contains(actual),
                _ => false,
            },
            _ => actual == Some(expected),
        }
    })
}
