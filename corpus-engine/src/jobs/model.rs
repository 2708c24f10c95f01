//! Typed job payloads, one per `job_type` (§6's job-type table).
//!
//! `corpus_storage::db::jobs` stores `input_data`/`output_data` as opaque
//! JSON strings; this module is the typed boundary around that string so
//! the pipeline handler never hand-rolls field access into raw JSON.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineRuntimeError, Result};

/// The job types this worker dispatches on. New variants are added here
/// first, then given a handler in `pipeline::handler`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ProcessDocument,
    ContinueProcessing,
    DetectConnections,
    ReprocessConnections,
    EnrichChunks,
    EnrichAndConnect,
    ExportDocuments,
    ImportVault,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ProcessDocument => "process_document",
            JobType::ContinueProcessing => "continue_processing",
            JobType::DetectConnections => "detect_connections",
            JobType::ReprocessConnections => "reprocess_connections",
            JobType::EnrichChunks => "enrich_chunks",
            JobType::EnrichAndConnect => "enrich_and_connect",
            JobType::ExportDocuments => "export_documents",
            JobType::ImportVault => "import_vault",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "process_document" => Ok(JobType::ProcessDocument),
            "continue_processing" => Ok(JobType::ContinueProcessing),
            "detect_connections" => Ok(JobType::DetectConnections),
            "reprocess_connections" => Ok(JobType::ReprocessConnections),
            "enrich_chunks" => Ok(JobType::EnrichChunks),
            "enrich_and_connect" => Ok(JobType::EnrichAndConnect),
            "export_documents" => Ok(JobType::ExportDocuments),
            "import_vault" => Ok(JobType::ImportVault),
            other => Err(EngineRuntimeError::UnsupportedJobType(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessDocumentInput {
    pub document_id: Uuid,
    pub user_id: String,
    /// Resume hint from a previous pause/crash; `None` starts at extraction.
    pub resume_from_stage: Option<String>,
    #[serde(default)]
    pub review_workflow: bool,
    #[serde(default = "default_true")]
    pub enrich_chunks: bool,
    #[serde(default = "default_true")]
    pub detect_connections_after: bool,
    #[serde(default)]
    pub cleanup_strategy: CleanupStrategyChoice,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStrategyChoice {
    #[default]
    Regex,
    Ai,
    Noop,
}

/// A job that continues a document parked at `awaiting_manual_review`
/// (§4.4 stage 2) back into the pipeline at the cleanup stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContinueProcessingInput {
    pub document_id: Uuid,
    pub user_id: String,
    #[serde(default = "default_true")]
    pub enrich_chunks: bool,
    #[serde(default = "default_true")]
    pub detect_connections_after: bool,
    #[serde(default)]
    pub cleanup_strategy: CleanupStrategyChoice,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectConnectionsInput {
    pub document_id: Uuid,
    pub target_document_ids: Option<Vec<Uuid>>,
    pub enabled_engines: Option<Vec<String>>,
}

/// `reprocess_connections`'s reprocessing strategy (§4.6, §8 properties 7–8).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReprocessMode {
    /// Delete every connection sourced from this document and rerun all
    /// enabled engines against the full sibling pool.
    All,
    /// Like `All`, but rows with `user_validated=true` are preserved
    /// (optionally backed up first) rather than deleted and re-derived.
    Smart,
    /// Don't touch existing connections; only look for new ones against
    /// documents created after the source document, which both narrows the
    /// candidate pool and keeps the connection direction forward-only.
    AddNew,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReprocessConnectionsInput {
    pub document_id: Uuid,
    pub mode: ReprocessMode,
    pub engines: Option<Vec<String>>,
    #[serde(default)]
    pub preserve_validated: bool,
    #[serde(default)]
    pub backup: bool,
}

/// Shared payload for `enrich_chunks`/`enrich_and_connect` (§6): re-enriches
/// a specific chunk set on demand. `enrich_and_connect` is the same payload
/// under a different `job_type`; `decode_input` tells the two apart and the
/// handler chains a `detect_connections` job only for the latter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnrichChunksInput {
    pub document_id: Uuid,
    pub chunk_ids: Vec<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportDocumentsInput {
    pub document_ids: Vec<Uuid>,
    pub destination_path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ImportConflictMode {
    Skip,
    Replace,
    MergeSmart,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportVaultInput {
    pub archive_path: String,
    pub conflict_mode: ImportConflictMode,
}

fn malformed(err: serde_json::Error) -> EngineRuntimeError {
    EngineRuntimeError::MalformedPayload(err.to_string())
}

/// Decodes a raw `input_data` JSON string into the payload for `job_type`.
pub fn decode_input(job_type: &JobType, input_data: &str) -> Result<JobInput> {
    match job_type {
        JobType::ProcessDocument => {
            let payload: ProcessDocumentInput = serde_json::from_str(input_data).map_err(malformed)?;
            Ok(JobInput::ProcessDocument(payload))
        }
        JobType::ContinueProcessing => {
            let payload: ContinueProcessingInput =
                serde_json::from_str(input_data).map_err(malformed)?;
            Ok(JobInput::ContinueProcessing(payload))
        }
        JobType::DetectConnections => {
            let payload: DetectConnectionsInput =
                serde_json::from_str(input_data).map_err(malformed)?;
            Ok(JobInput::DetectConnections(payload))
        }
        JobType::ReprocessConnections => {
            let payload: ReprocessConnectionsInput =
                serde_json::from_str(input_data).map_err(malformed)?;
            Ok(JobInput::ReprocessConnections(payload))
        }
        JobType::EnrichChunks => {
            let payload: EnrichChunksInput = serde_json::from_str(input_data).map_err(malformed)?;
            Ok(JobInput::EnrichChunks(payload))
        }
        JobType::EnrichAndConnect => {
            let payload: EnrichChunksInput = serde_json::from_str(input_data).map_err(malformed)?;
            Ok(JobInput::EnrichAndConnect(payload))
        }
        JobType::ExportDocuments => {
            let payload: ExportDocumentsInput = serde_json::from_str(input_data).map_err(malformed)?;
            Ok(JobInput::ExportDocuments(payload))
        }
        JobType::ImportVault => {
            let payload: ImportVaultInput = serde_json::from_str(input_data).map_err(malformed)?;
            Ok(JobInput::ImportVault(payload))
        }
    }
}

#[derive(Clone, Debug)]
pub enum JobInput {
    ProcessDocument(ProcessDocumentInput),
    ContinueProcessing(ContinueProcessingInput),
    DetectConnections(DetectConnectionsInput),
    ReprocessConnections(ReprocessConnectionsInput),
    EnrichChunks(EnrichChunksInput),
    EnrichAndConnect(EnrichChunksInput),
    ExportDocuments(ExportDocumentsInput),
    ImportVault(ImportVaultInput),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_round_trips_through_its_string_form() {
        for job_type in [
            JobType::ProcessDocument,
            JobType::ContinueProcessing,
            JobType::DetectConnections,
            JobType::ReprocessConnections,
            JobType::EnrichChunks,
            JobType::EnrichAndConnect,
            JobType::ExportDocuments,
            JobType::ImportVault,
        ] {
            assert_eq!(JobType::parse(job_type.as_str()).unwrap(), job_type);
        }
    }

    #[test]
    fn unknown_job_type_is_invalid() {
        let err = JobType::parse("reticulate_splines").unwrap_err();
        assert!(matches!(err, EngineRuntimeError::UnsupportedJobType(_)));
    }

    #[test]
    fn decode_input_rejects_malformed_payload() {
        let err = decode_input(&JobType::ProcessDocument, "{not json").unwrap_err();
        assert!(matches!(err, EngineRuntimeError::MalformedPayload(_)));
    }
}
