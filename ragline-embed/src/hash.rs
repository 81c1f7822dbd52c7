//! Deterministic hash-based embedder for tests and offline use.
//!
//! [`HashEmbedder`] produces pseudo-embeddings by feature-hashing tokens
//! into a fixed number of buckets and L2-normalizing the result. Texts
//! sharing tokens land in overlapping buckets, so cosine similarity grows
//! with vocabulary overlap. This is not a semantic model; it exists so the
//! retrieval stack can be exercised without downloading an ONNX model.

use crate::error::{EmbedError, Result};
use crate::provider::Embedder;
use async_trait::async_trait;
use fnv::FnvHasher;
use std::hash::Hasher;

/// Deterministic embedder producing stable vectors from token hashes.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashEmbedder {
    /// Create a hash embedder producing vectors of the given length.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("hash-embedder-{dimension}"),
        }
    }

    fn hash_token(token: &str) -> u64 {
        let mut hasher = FnvHasher::default();
        hasher.write(token.as_bytes());
        hasher.finish()
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut buckets = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = Self::hash_token(&token.to_lowercase());
            let bucket = (hash as usize) % self.dimension;
            // Sign bit from the hash keeps bucket collisions from always
            // reinforcing each other
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            buckets[bucket] += sign;
        }

        let norm: f32 = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut buckets {
                *value /= norm;
            }
        }
        buckets
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
