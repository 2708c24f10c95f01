//! Orchestrator (§4.6.4): fans out one call per enabled engine in a fixed
//! serial order, collects connections, applies each engine's ensemble
//! weight, and dedupes by `(source_chunk_id, target_chunk_id, engine_type)`
//! — the same key the storage layer's unique constraint enforces.
//!
//! Grounded on `wg-bastion::pipeline::executor::PipelineExecutor`'s
//! sorted-stage-list-plus-metrics shape, simplified to a fixed engine order
//! with no short-circuiting (every engine always runs; connection engines
//! don't "block", they only contribute candidates).

use std::collections::HashMap;

use tracing::instrument;
use uuid::Uuid;

use crate::config::{
    OrchestratorConfig, CONTRADICTION_WEIGHT, SEMANTIC_SIMILARITY_WEIGHT, THEMATIC_BRIDGE_WEIGHT,
};
use crate::engine::{ChunkView, Connection, ConnectionEngine, EngineType, Result};

fn ensemble_weight(engine_type: EngineType) -> f64 {
    match engine_type {
        EngineType::SemanticSimilarity => SEMANTIC_SIMILARITY_WEIGHT,
        EngineType::ContradictionDetection => CONTRADICTION_WEIGHT,
        EngineType::ThematicBridge => THEMATIC_BRIDGE_WEIGHT,
    }
}

/// Progress callback invoked once per engine, before and after it runs.
/// The orchestrator never interleaves two engines' callbacks.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, engine_type: EngineType, percent: u8, result_count: Option<usize>);
}

#[derive(Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_progress(&self, _engine_type: EngineType, _percent: u8, _result_count: Option<usize>) {}
}

pub struct Orchestrator {
    engines: Vec<Box<dyn ConnectionEngine>>,
}

#[derive(Default)]
pub struct OrchestratorBuilder {
    engines: Vec<Box<dyn ConnectionEngine>>,
}

impl OrchestratorBuilder {
    pub fn add_engine(mut self, engine: Box<dyn ConnectionEngine>) -> Self {
        self.engines.push(engine);
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator { engines: self.engines }
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Restricts `candidate_pool` to `target_document_ids` when set, and
    /// never to the same document as `source_document_id` (engines enforce
    /// same-document exclusion again internally per their own rules, but
    /// filtering here saves every engine the trouble).
    fn filter_candidates<'a>(
        &self,
        candidate_pool: &'a [ChunkView],
        config: &OrchestratorConfig,
    ) -> Vec<ChunkView> {
        match &config.target_document_ids {
            Some(targets) => candidate_pool
                .iter()
                .filter(|c| targets.contains(&c.document_id))
                .cloned()
                .collect(),
            None => candidate_pool.to_vec(),
        }
    }

    #[instrument(skip(self, source_chunks, candidate_pool, config, progress))]
    pub async fn run(
        &self,
        source_document_id: Uuid,
        source_chunks: &[ChunkView],
        candidate_pool: &[ChunkView],
        config: &OrchestratorConfig,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Connection>> {
        self.run_selected(source_document_id, source_chunks, candidate_pool, config, None, progress)
            .await
    }

    /// Like [`Orchestrator::run`], but when `enabled_engines` is `Some`,
    /// engines whose [`EngineType`] isn't in it are skipped entirely (no
    /// progress callback, no AI spend) rather than merely filtered out of
    /// the results — this is what lets `reprocess_connections(mode=add_new)`
    /// cap ThematicBridge's AI-call budget per SPEC_FULL.md §8 property 7.
    #[instrument(skip(self, source_chunks, candidate_pool, config, progress))]
    pub async fn run_selected(
        &self,
        source_document_id: Uuid,
        source_chunks: &[ChunkView],
        candidate_pool: &[ChunkView],
        config: &OrchestratorConfig,
        enabled_engines: Option<&[EngineType]>,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Connection>> {
        let filtered_candidates = self.filter_candidates(candidate_pool, config);
        let mut all_connections = Vec::new();

        for engine in &self.engines {
            let engine_type = engine.engine_type();
            if let Some(enabled) = enabled_engines {
                if !enabled.contains(&engine_type) {
                    continue;
                }
            }
            progress.on_progress(engine_type, 0, None);

            let results = engine.run(source_chunks, &filtered_candidates, config).await?;
            tracing::info!(
                document_id = %source_document_id,
                engine = engine_type.as_str(),
                count = results.len(),
                "connection engine finished"
            );

            progress.on_progress(engine_type, 100, Some(results.len()));
            all_connections.extend(results);
        }

        Ok(merge_connections(all_connections))
    }
}

/// Dedupes by `(source_chunk_id, target_chunk_id, engine_type)`, combining
/// strengths via each engine's ensemble weight. A pair appearing more than
/// once for the same engine (which shouldn't happen given each engine's own
/// per-chunk result cap, but is defended against here) has its weighted
/// strengths summed and clamped to `[0, 1]`.
fn merge_connections(connections: Vec<Connection>) -> Vec<Connection> {
    let mut merged: HashMap<(Uuid, Uuid, &'static str), Connection> = HashMap::new();

    for conn in connections {
        let key = (conn.source_chunk_id, conn.target_chunk_id, conn.engine_type.as_str());
        let weight = ensemble_weight(conn.engine_type);
        let weighted_strength = (conn.strength * weight).clamp(0.0, 1.0);

        merged
            .entry(key)
            .and_modify(|existing| {
                existing.strength = (existing.strength + weighted_strength).clamp(0.0, 1.0);
            })
            .or_insert_with(|| Connection {
                strength: weighted_strength,
                ..conn
            });
    }

    merged.into_values().collect()
}
