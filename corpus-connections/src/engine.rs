//! The [`ConnectionEngine`] capability contract and the [`Connection`]
//! value every engine produces.
//!
//! Grounded on `wg-bastion::pipeline::stage::GuardrailStage` — a single
//! `async fn` entry point, a `name()` identifier, and a context value (there
//! `SecurityContext`, here the source document id plus orchestrator
//! config) — renamed from a content-inspection stage to a chunk-pair
//! connection detector.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::OrchestratorConfig;

/// A lightweight, engine-facing view of a persisted semantic chunk. Decoupled
/// from `corpus_storage::db::models::ChunkRow` so engines don't need to know
/// how metadata is serialized in the database; `corpus-engine` is
/// responsible for the conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkView {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub embedding: Option<Vec<f32>>,
    pub importance_score: Option<f64>,
    pub concepts: Vec<String>,
    pub emotional_polarity: Option<f64>,
    pub primary_domain: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineType {
    SemanticSimilarity,
    ContradictionDetection,
    ThematicBridge,
}

impl EngineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineType::SemanticSimilarity => "semantic_similarity",
            EngineType::ContradictionDetection => "contradiction_detection",
            EngineType::ThematicBridge => "thematic_bridge",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "semantic_similarity" => Some(EngineType::SemanticSimilarity),
            "contradiction_detection" => Some(EngineType::ContradictionDetection),
            "thematic_bridge" => Some(EngineType::ThematicBridge),
            _ => None,
        }
    }
}

/// One discovered connection between two chunks, directed source → target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub source_chunk_id: Uuid,
    pub target_chunk_id: Uuid,
    pub engine_type: EngineType,
    pub strength: f64,
    pub connection_type: String,
    pub evidence: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("candidate lookup failed: {0}")]
    CandidateLookup(String),
    #[error("thematic bridge LLM call failed: {0}")]
    LlmCall(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Capability contract satisfied by every connection-detection engine.
/// Engines operate per chunk of the source document and emit at most
/// `maxResultsPerChunk` connections per source chunk.
#[async_trait]
pub trait ConnectionEngine: Send + Sync {
    fn engine_type(&self) -> EngineType;

    /// `source_chunks` belong to the document being processed;
    /// `candidate_pool` is every chunk eligible as a connection target
    /// (already filtered to `target_document_ids` and cross-document rules
    /// by the orchestrator).
    async fn run(
        &self,
        source_chunks: &[ChunkView],
        candidate_pool: &[ChunkView],
        config: &OrchestratorConfig,
    ) -> Result<Vec<Connection>>;
}
