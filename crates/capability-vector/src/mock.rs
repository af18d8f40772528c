//! A deterministic, hash-based `EmbeddingProvider` (SPEC_FULL.md §0/§1.5): since the embedding
//! model itself is explicitly out of scope (spec §1), this stands in for it in tests and the
//! development CLI. `encode` is a pure function of its input text -- same text always yields the
//! same vector, satisfying spec §6's "deterministic, no state between calls" contract -- without
//! pulling in any real model.

use async_trait::async_trait;
use capability_core::error::Result;
use capability_core::traits::EmbeddingProvider;
use sha2::{Digest, Sha256};

/// Default embedding dimension for the mock provider. Arbitrary but fixed, so vectors produced
/// across calls and processes are comparable.
pub const DEFAULT_DIMENSION: usize = 64;

/// Hashes `text` with SHA-256, repeating the digest as needed to fill `dimension` floats in
/// `[-1.0, 1.0]`, then L2-normalizes the result so cosine similarity behaves sensibly.
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode_sync(&self, text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dimension);
        let mut counter: u32 = 0;
        while out.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for byte in digest.iter() {
                if out.len() >= self.dimension {
                    break;
                }
                // Map a byte in [0, 255] to a float in [-1.0, 1.0].
                out.push((*byte as f32 / 127.5) - 1.0);
            }
            counter += 1;
        }
        let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in out.iter_mut() {
                *v /= norm;
            }
        }
        out
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.encode_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encoding_is_deterministic() {
        let provider = HashEmbeddingProvider::default();
        let a = provider.encode("list open pull requests").await.unwrap();
        let b = provider.encode("list open pull requests").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn distinct_text_yields_distinct_vectors() {
        let provider = HashEmbeddingProvider::default();
        let a = provider.encode("list open pull requests").await.unwrap();
        let b = provider.encode("send a slack message").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn vectors_have_the_requested_dimension_and_unit_norm() {
        let provider = HashEmbeddingProvider::new(16);
        let v = provider.encode("anything").await.unwrap();
        assert_eq!(v.len(), 16);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
