//! Document-processing pipeline (§4.4): stage bands, the
//! `process_document`/`continue_processing` handler, and connection
//! detection hand-off.

pub mod continue_processing;
pub mod handler;
pub mod stages;

pub use handler::{run_detect_connections, run_enrich_chunks, run_reprocess_connections, PipelineDeps};

/// Runs a fresh or resumed `process_document` job (§4.4, stages 1-11).
pub async fn process_document(
    deps: &PipelineDeps,
    job_id: uuid::Uuid,
    input: crate::jobs::model::ProcessDocumentInput,
) -> crate::error::Result<String> {
    handler::run(deps, job_id, input).await
}

