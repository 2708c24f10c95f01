//! Semantic similarity engine (§4.6.1): cosine similarity over chunk
//! embeddings, optionally damped by the target chunk's importance score.

use async_trait::async_trait;

use crate::config::OrchestratorConfig;
use crate::engine::{ChunkView, Connection, ConnectionEngine, EngineType, Result};

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|v| *v as f64 * *v as f64).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|v| *v as f64 * *v as f64).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SemanticSimilarityEngine;

#[async_trait]
impl ConnectionEngine for SemanticSimilarityEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::SemanticSimilarity
    }

    async fn run(
        &self,
        source_chunks: &[ChunkView],
        candidate_pool: &[ChunkView],
        config: &OrchestratorConfig,
    ) -> Result<Vec<Connection>> {
        let cfg = &config.semantic_similarity;
        let mut connections = Vec::new();

        for source in source_chunks {
            let Some(source_embedding) = &source.embedding else {
                continue;
            };

            let mut candidates: Vec<(f64, &ChunkView)> = candidate_pool
                .iter()
                .filter(|c| c.chunk_id != source.chunk_id)
                .filter(|c| !cfg.cross_document_only || c.document_id != source.document_id)
                .filter_map(|c| {
                    let target_embedding = c.embedding.as_ref()?;
                    let similarity = cosine_similarity(source_embedding, target_embedding);
                    (similarity >= cfg.threshold).then_some((similarity, c))
                })
                .collect();

            candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            candidates.truncate(cfg.max_results_per_chunk);

            for (similarity, target) in candidates {
                let importance_damp = if cfg.importance_weight > 0.0 {
                    1.0 - cfg.importance_weight * (1.0 - target.importance_score.unwrap_or(1.0))
                } else {
                    1.0
                };
                let strength = (similarity * importance_damp).clamp(0.0, 1.0);

                connections.push(Connection {
                    source_chunk_id: source.chunk_id,
                    target_chunk_id: target.chunk_id,
                    engine_type: EngineType::SemanticSimilarity,
                    strength,
                    connection_type: "similar_content".to_string(),
                    evidence: format!("cosine similarity {similarity:.3}"),
                });
            }
        }

        Ok(connections)
    }
}
