//! Thematic bridge engine (§4.6.3): the only engine that consults an LLM.
//! Selects the top-K highest-importance source chunks, pairs each with
//! same-side candidates from a *different* domain, and asks the model
//! whether a non-obvious thematic link exists between them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OrchestratorConfig;
use crate::engine::{ChunkView, Connection, ConnectionEngine, EngineError, EngineType, Result};

/// What the LLM returns for one candidate pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeJudgement {
    pub strength: f64,
    pub connection_type: String,
    pub evidence: String,
}

/// Capability contract for the model that judges thematic-bridge pairs —
/// local or hosted, batched the same way regardless of backend.
#[async_trait]
pub trait ThematicBridgeJudge: Send + Sync {
    async fn judge_pairs(
        &self,
        pairs: &[(ChunkView, ChunkView)],
    ) -> std::result::Result<Vec<BridgeJudgement>, String>;
}

pub struct ThematicBridgeEngine {
    judge: Box<dyn ThematicBridgeJudge>,
}

impl ThematicBridgeEngine {
    pub fn new(judge: Box<dyn ThematicBridgeJudge>) -> Self {
        Self { judge }
    }
}

#[async_trait]
impl ConnectionEngine for ThematicBridgeEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::ThematicBridge
    }

    async fn run(
        &self,
        source_chunks: &[ChunkView],
        candidate_pool: &[ChunkView],
        config: &OrchestratorConfig,
    ) -> Result<Vec<Connection>> {
        let cfg = &config.thematic_bridge;

        let mut ranked_sources: Vec<&ChunkView> = source_chunks
            .iter()
            .filter(|c| c.importance_score.unwrap_or(0.0) >= cfg.min_importance)
            .collect();
        ranked_sources.sort_by(|a, b| {
            b.importance_score
                .unwrap_or(0.0)
                .partial_cmp(&a.importance_score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked_sources.truncate(cfg.max_source_chunks);

        // target_document_ids filtering has already happened before this
        // call (orchestrator's candidate_pool is pre-filtered), so batching
        // here only needs to apply the domain and importance ordering rule.
        let mut pairs: Vec<(ChunkView, ChunkView)> = Vec::new();
        for source in &ranked_sources {
            let mut candidates: Vec<&ChunkView> = candidate_pool
                .iter()
                .filter(|c| c.document_id != source.document_id)
                .filter(|c| match (&c.primary_domain, &source.primary_domain) {
                    (Some(cd), Some(sd)) => cd != sd,
                    _ => true,
                })
                .collect();
            candidates.sort_by(|a, b| {
                b.importance_score
                    .unwrap_or(0.0)
                    .partial_cmp(&a.importance_score.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            candidates.truncate(cfg.max_results_per_chunk);

            for candidate in candidates {
                pairs.push(((*source).clone(), candidate.clone()));
            }
        }

        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let judgements = self
            .judge
            .judge_pairs(&pairs)
            .await
            .map_err(EngineError::LlmCall)?;

        let connections = pairs
            .into_iter()
            .zip(judgements)
            .filter(|(_, judgement)| judgement.strength >= cfg.min_strength)
            .map(|((source, target), judgement)| Connection {
                source_chunk_id: source.chunk_id,
                target_chunk_id: target.chunk_id,
                engine_type: EngineType::ThematicBridge,
                strength: judgement.strength.clamp(0.0, 1.0),
                connection_type: judgement.connection_type,
                evidence: judgement.evidence,
            })
            .collect();

        Ok(connections)
    }
}

/// Local, dependency-free judge: scores a pair by concept overlap between
/// two chunks already known to sit in different domains, so the "bridge"
/// it reports is a lexical coincidence rather than a reasoned judgment — a
/// drop-in default until a hosted judge is wired in.
pub struct LocalHeuristicBridgeJudge;

#[async_trait]
impl ThematicBridgeJudge for LocalHeuristicBridgeJudge {
    async fn judge_pairs(
        &self,
        pairs: &[(ChunkView, ChunkView)],
    ) -> std::result::Result<Vec<BridgeJudgement>, String> {
        use std::collections::HashSet;
        Ok(pairs
            .iter()
            .map(|(source, target)| {
                let source_concepts: HashSet<&str> = source.concepts.iter().map(String::as_str).collect();
                let target_concepts: HashSet<&str> = target.concepts.iter().map(String::as_str).collect();
                let overlap = source_concepts.intersection(&target_concepts).count();
                let strength = (overlap as f64 / 3.0).clamp(0.0, 1.0);
                BridgeJudgement {
                    strength,
                    connection_type: "thematic_bridge".to_string(),
                    evidence: format!(
                        "{overlap} shared concept(s) across domains '{}' / '{}'",
                        source.primary_domain.as_deref().unwrap_or("unknown"),
                        target.primary_domain.as_deref().unwrap_or("unknown"),
                    ),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThematicBridgeConfig;

    fn chunk(id: u8, doc: u8, importance: f64, domain: &str) -> ChunkView {
        ChunkView {
            chunk_id: uuid::Uuid::from_u128(id as u128),
            document_id: uuid::Uuid::from_u128(doc as u128),
            embedding: None,
            importance_score: Some(importance),
            concepts: Vec::new(),
            emotional_polarity: None,
            primary_domain: Some(domain.to_string()),
            summary: None,
        }
    }

    struct AlwaysBridge;

    #[async_trait]
    impl ThematicBridgeJudge for AlwaysBridge {
        async fn judge_pairs(
            &self,
            pairs: &[(ChunkView, ChunkView)],
        ) -> std::result::Result<Vec<BridgeJudgement>, String> {
            Ok(pairs
                .iter()
                .map(|_| BridgeJudgement {
                    strength: 0.9,
                    connection_type: "thematic_echo".to_string(),
                    evidence: "both describe letting go of control".to_string(),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn pairs_source_with_different_domain_candidates_only() {
        let engine = ThematicBridgeEngine::new(Box::new(AlwaysBridge));
        let source = chunk(1, 1, 0.9, "grief");
        let same_domain = chunk(2, 2, 0.8, "grief");
        let other_domain = chunk(3, 2, 0.8, "productivity");

        let mut config = OrchestratorConfig::default();
        config.thematic_bridge = ThematicBridgeConfig {
            max_source_chunks: 5,
            min_importance: 0.0,
            min_strength: 0.5,
            max_results_per_chunk: 5,
        };

        let connections = engine
            .run(&[source], &[same_domain, other_domain.clone()], &config)
            .await
            .unwrap();

        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].target_chunk_id, other_domain.chunk_id);
    }

    #[tokio::test]
    async fn below_min_strength_is_filtered_out() {
        struct AlwaysWeak;
        #[async_trait]
        impl ThematicBridgeJudge for AlwaysWeak {
            async fn judge_pairs(
                &self,
                pairs: &[(ChunkView, ChunkView)],
            ) -> std::result::Result<Vec<BridgeJudgement>, String> {
                Ok(pairs
                    .iter()
                    .map(|_| BridgeJudgement {
                        strength: 0.1,
                        connection_type: "thematic_echo".to_string(),
                        evidence: "weak".to_string(),
                    })
                    .collect())
            }
        }

        let engine = ThematicBridgeEngine::new(Box::new(AlwaysWeak));
        let source = chunk(1, 1, 0.9, "grief");
        let candidate = chunk(2, 2, 0.8, "productivity");

        let mut config = OrchestratorConfig::default();
        config.thematic_bridge.min_strength = 0.5;

        let connections = engine.run(&[source], &[candidate], &config).await.unwrap();
        assert!(connections.is_empty());
    }

    fn chunk_with_concepts(id: u8, doc: u8, domain: &str, concepts: &[&str]) -> ChunkView {
        ChunkView { concepts: concepts.iter().map(|c| c.to_string()).collect(), ..chunk(id, doc, 0.9, domain) }
    }

    #[tokio::test]
    async fn local_heuristic_judge_scores_by_concept_overlap() {
        let judge = LocalHeuristicBridgeJudge;
        let a = chunk_with_concepts(1, 1, "grief", &["loss", "time", "memory"]);
        let b = chunk_with_concepts(2, 2, "productivity", &["time", "discipline"]);

        let judgements = judge.judge_pairs(&[(a, b)]).await.unwrap();
        assert_eq!(judgements.len(), 1);
        assert!(judgements[0].strength > 0.0);
        assert!(judgements[0].evidence.contains("shared concept"));
    }

    #[tokio::test]
    async fn local_heuristic_judge_scores_zero_with_no_overlap() {
        let judge = LocalHeuristicBridgeJudge;
        let a = chunk_with_concepts(1, 1, "grief", &["loss"]);
        let b = chunk_with_concepts(2, 2, "productivity", &["discipline"]);

        let judgements = judge.judge_pairs(&[(a, b)]).await.unwrap();
        assert_eq!(judgements[0].strength, 0.0);
    }
}
