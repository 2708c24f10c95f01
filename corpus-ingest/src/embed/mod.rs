//! Embedding (C10/stage 8): produces a fixed-dimension vector per chunk.
//!
//! [`Embedder`] is the capability contract; [`HashSeededEmbedder`] is a
//! local, dependency-free implementation that derives a deterministic vector
//! from a SHA-256 digest of the chunk content, the same content-hashing
//! idiom `other_examples/021be95f_vyotiq-ai-vyotiq-agent…embedder.rs` uses
//! for change detection, repurposed here as the seed for a reproducible
//! local embedding rather than a candle/usearch-backed model call. A real
//! hosted embedding model is a drop-in [`Embedder`] implementation behind
//! the same trait.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;

pub const EMBEDDING_DIM: usize = 256;

/// Capability contract satisfied by every embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    async fn embed(&self, content: &str) -> Result<Vec<f32>>;
}

/// Deterministic local embedder: repeatedly hashes the content with a
/// rolling counter to fill `EMBEDDING_DIM` floats in `[-1.0, 1.0]`, then
/// L2-normalizes. Two calls on identical content always produce the same
/// vector, and unrelated content produces near-orthogonal vectors — good
/// enough for exercising similarity search without a model dependency.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashSeededEmbedder;

#[async_trait]
impl Embedder for HashSeededEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    async fn embed(&self, content: &str) -> Result<Vec<f32>> {
        let mut raw = Vec::with_capacity(EMBEDDING_DIM);
        let mut counter: u32 = 0;

        while raw.len() < EMBEDDING_DIM {
            let mut hasher = Sha256::new();
            hasher.update(content.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for byte in digest.iter() {
                if raw.len() >= EMBEDDING_DIM {
                    break;
                }
                // Map a byte in [0, 255] to a float in [-1.0, 1.0].
                raw.push((*byte as f32 / 127.5) - 1.0);
            }
            counter += 1;
        }

        let norm: f32 = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in raw.iter_mut() {
                *v /= norm;
            }
        }

        Ok(raw)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_content_produces_identical_vector() {
        let embedder = HashSeededEmbedder;
        let a = embedder.embed("grief and memory").await.unwrap();
        let b = embedder.embed("grief and memory").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn different_content_is_not_identical() {
        let embedder = HashSeededEmbedder;
        let a = embedder.embed("grief and memory").await.unwrap();
        let b = embedder.embed("joy and celebration").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn vector_is_unit_normalized() {
        let embedder = HashSeededEmbedder;
        let v = embedder.embed("anything").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.6, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }
}
