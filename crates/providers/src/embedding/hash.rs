use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::ProviderResult;

/// Deterministic hashed bag-of-words embeddings.
///
/// Keeps the pipeline functional when no embedding service is reachable
/// (dev, tests, offline): vectors are unit-norm and stable for identical
/// text, so ranking still behaves sensibly even if quality is low.
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0_f32; self.dimension];
        let mut seen = 0usize;

        for token in text.split_whitespace() {
            let token = token.trim().to_lowercase();
            if token.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();
            let idx = (hash as usize) % self.dimension;
            let sign = if (hash & 1) == 0 { 1.0 } else { -1.0 };
            vec[idx] += sign;
            seen += 1;
        }

        // CJK text rarely has whitespace token boundaries; fall back to chars.
        if seen == 0 {
            for ch in text.chars().filter(|c| !c.is_whitespace()) {
                let mut hasher = DefaultHasher::new();
                ch.hash(&mut hasher);
                let hash = hasher.finish();
                let idx = (hash as usize) % self.dimension;
                let sign = if (hash & 1) == 0 { 1.0 } else { -1.0 };
                vec[idx] += sign;
                seen += 1;
            }
        }

        if seen == 0 {
            return vec;
        }

        let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vec {
                *value /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_and_unit_norm() {
        let provider = HashEmbeddingProvider::new(256);
        let a = provider.embed(&["hello world".into()]).await.unwrap();
        let b = provider.embed(&["hello world".into()]).await.unwrap();
        assert_eq!(a, b);

        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn cjk_text_produces_nonzero_vectors() {
        let provider = HashEmbeddingProvider::new(256);
        let out = provider.embed(&["今天讨论了产品迭代".into()]).await.unwrap();
        assert!(out[0].iter().any(|v| *v != 0.0));
    }
}
