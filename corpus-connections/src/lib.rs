//! Cross-document connection detection.
//!
//! Three engines — [`semantic`], [`contradiction`], and [`thematic_bridge`] —
//! each implement [`engine::ConnectionEngine`] and are run serially by
//! [`orchestrator::Orchestrator`], which merges their output into a single
//! deduplicated, weighted set of [`engine::Connection`]s ready for
//! persistence by `corpus-engine`.
//!
//! ## Modules
//!
//! - [`config`] – per-engine thresholds, ensemble weights, orchestrator config
//! - [`engine`] – the `ConnectionEngine` trait and shared `ChunkView`/`Connection` types
//! - [`semantic`] – cosine-similarity engine
//! - [`contradiction`] – concept-overlap + polarity-divergence engine
//! - [`thematic_bridge`] – LLM-judged cross-domain bridge engine
//! - [`orchestrator`] – fan-out, merge, and dedupe driver

pub mod config;
pub mod contradiction;
pub mod engine;
pub mod orchestrator;
pub mod semantic;
pub mod thematic_bridge;

pub use config::OrchestratorConfig;
pub use engine::{ChunkView, Connection, ConnectionEngine, EngineError, EngineType};
pub use orchestrator::{NoopProgressSink, Orchestrator, OrchestratorBuilder, ProgressSink};
