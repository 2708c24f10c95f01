//! Contradiction detection engine (§4.6.2): flags chunk pairs whose
//! conceptual sets overlap but whose emotional polarity diverges —
//! evidence of two documents taking opposing stances on the same idea.
//!
//! The strength function is pinned (§4.6.5, resolving the open question on
//! how overlap count and polarity gap combine):
//!
//! ```text
//! strength = clamp(
//!     0.5 * (concept_overlap_count / max_expected_overlap)
//!   + 0.5 * ((|polarity_a - polarity_b| - polarity_threshold) / (2.0 - polarity_threshold)),
//!   0.0, 1.0,
//! )
//! ```

use async_trait::async_trait;
use std::collections::HashSet;

use crate::config::OrchestratorConfig;
use crate::engine::{ChunkView, Connection, ConnectionEngine, EngineType, Result};

pub fn contradiction_strength(
    concept_overlap_count: usize,
    max_expected_overlap: f64,
    polarity_a: f64,
    polarity_b: f64,
    polarity_threshold: f64,
) -> f64 {
    let overlap_term = 0.5 * (concept_overlap_count as f64 / max_expected_overlap.max(f64::EPSILON));
    let polarity_gap = (polarity_a - polarity_b).abs();
    let polarity_term = 0.5 * ((polarity_gap - polarity_threshold) / (2.0 - polarity_threshold).max(f64::EPSILON));
    (overlap_term + polarity_term).clamp(0.0, 1.0)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ContradictionEngine;

#[async_trait]
impl ConnectionEngine for ContradictionEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::ContradictionDetection
    }

    async fn run(
        &self,
        source_chunks: &[ChunkView],
        candidate_pool: &[ChunkView],
        config: &OrchestratorConfig,
    ) -> Result<Vec<Connection>> {
        let cfg = &config.contradiction;
        let mut connections = Vec::new();

        for source in source_chunks {
            let Some(source_polarity) = source.emotional_polarity else {
                continue;
            };
            if source.concepts.is_empty() {
                continue;
            }
            let source_concepts: HashSet<&str> = source.concepts.iter().map(String::as_str).collect();

            let mut candidates: Vec<(f64, usize, &ChunkView)> = candidate_pool
                .iter()
                .filter(|c| c.chunk_id != source.chunk_id && c.document_id != source.document_id)
                .filter_map(|c| {
                    let target_polarity = c.emotional_polarity?;
                    if c.concepts.is_empty() {
                        return None;
                    }
                    let target_concepts: HashSet<&str> = c.concepts.iter().map(String::as_str).collect();
                    let overlap = source_concepts.intersection(&target_concepts).count();
                    if overlap < cfg.min_concept_overlap {
                        return None;
                    }
                    if (source_polarity - target_polarity).abs() < cfg.polarity_threshold {
                        return None;
                    }
                    let strength = contradiction_strength(
                        overlap,
                        cfg.max_expected_overlap,
                        source_polarity,
                        target_polarity,
                        cfg.polarity_threshold,
                    );
                    Some((strength, overlap, c))
                })
                .collect();

            candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            candidates.truncate(cfg.max_results_per_chunk);

            for (strength, overlap, target) in candidates {
                connections.push(Connection {
                    source_chunk_id: source.chunk_id,
                    target_chunk_id: target.chunk_id,
                    engine_type: EngineType::ContradictionDetection,
                    strength,
                    connection_type: "contradicts".to_string(),
                    evidence: format!(
                        "{overlap} overlapping concepts, polarity gap {:.2}",
                        (source_polarity - target.emotional_polarity.unwrap()).abs()
                    ),
                });
            }
        }

        Ok(connections)
    }
}
