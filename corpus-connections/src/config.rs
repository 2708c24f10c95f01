//! Per-engine and orchestrator-level configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ensemble weight applied to each engine's contributed strength when the
/// orchestrator merges duplicate `(source, target, type)` connections.
pub const SEMANTIC_SIMILARITY_WEIGHT: f64 = 0.25;
pub const CONTRADICTION_WEIGHT: f64 = 0.40;
pub const THEMATIC_BRIDGE_WEIGHT: f64 = 0.35;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticSimilarityConfig {
    pub threshold: f64,
    pub cross_document_only: bool,
    pub importance_weight: f64,
    pub max_results_per_chunk: usize,
}

impl Default for SemanticSimilarityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            cross_document_only: true,
            importance_weight: 0.0,
            max_results_per_chunk: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContradictionConfig {
    pub min_concept_overlap: usize,
    pub polarity_threshold: f64,
    pub max_expected_overlap: f64,
    pub max_results_per_chunk: usize,
}

impl Default for ContradictionConfig {
    fn default() -> Self {
        Self {
            min_concept_overlap: 2,
            polarity_threshold: 0.5,
            max_expected_overlap: 5.0,
            max_results_per_chunk: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThematicBridgeConfig {
    pub max_source_chunks: usize,
    pub min_importance: f64,
    pub min_strength: f64,
    pub max_results_per_chunk: usize,
}

impl Default for ThematicBridgeConfig {
    fn default() -> Self {
        Self {
            max_source_chunks: 20,
            min_importance: 0.5,
            min_strength: 0.6,
            max_results_per_chunk: 5,
        }
    }
}

/// Top-level configuration passed to the orchestrator for one
/// `detect_connections` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub target_document_ids: Option<Vec<Uuid>>,
    pub semantic_similarity: SemanticSimilarityConfig,
    pub contradiction: ContradictionConfig,
    pub thematic_bridge: ThematicBridgeConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            target_document_ids: None,
            semantic_similarity: SemanticSimilarityConfig::default(),
            contradiction: ContradictionConfig::default(),
            thematic_bridge: ThematicBridgeConfig::default(),
        }
    }
}
