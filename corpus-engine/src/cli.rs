//! Command-line surface (§6.1): a thin wrapper over the public operations
//! in [`crate::jobs::queue`], [`crate::worker`], [`crate::exporter`], and
//! [`crate::importer`] — every subcommand either runs the worker loop or
//! enqueues/inspects a job row, grounded on the pack's `context-harness`
//! crate's `clap`-derived `Cli`/`Commands` shape.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::error::Result;
use crate::jobs::model::{
    CleanupStrategyChoice, ContinueProcessingInput, DetectConnectionsInput, EnrichChunksInput,
    ExportDocumentsInput, ImportConflictMode, ImportVaultInput, JobType, ProcessDocumentInput,
    ReprocessConnectionsInput, ReprocessMode,
};
use crate::jobs::queue;

#[derive(Parser)]
#[command(
    name = "corpus-worker",
    about = "Background-job worker for the personal knowledge-processing pipeline",
    version
)]
pub struct Cli {
    /// Path to a config.toml file (defaults to ./config.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the database connection string
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the worker loop until interrupted
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// Manage individual jobs
    Job {
        #[command(subcommand)]
        action: JobAction,
    },

    /// Export one or more documents to a portable archive
    Export {
        /// Document IDs (UUIDs) to include
        document_ids: Vec<Uuid>,

        /// Destination path for the ZIP archive
        #[arg(long)]
        out: String,
    },

    /// Import a previously exported archive
    Import {
        /// Path to the archive
        path: String,

        /// Conflict resolution mode: skip, replace, or merge-smart
        #[arg(long, default_value = "merge-smart")]
        mode: String,
    },
}

#[derive(Subcommand)]
pub enum WorkerAction {
    /// Start claiming and processing jobs
    Run,
}

#[derive(Subcommand)]
pub enum JobAction {
    /// Enqueue a new job
    Enqueue {
        /// One of: process-document, continue-processing, detect-connections,
        /// reprocess-connections, enrich-chunks, enrich-and-connect,
        /// export-documents, import-vault
        job_type: String,

        /// Document ID (UUID) the job operates on, when applicable
        #[arg(long)]
        document_id: Option<Uuid>,

        /// Chunk IDs (UUIDs) to re-enrich (enrich-chunks/enrich-and-connect)
        #[arg(long, value_delimiter = ',')]
        chunk_ids: Option<Vec<Uuid>>,

        /// User ID the job is scoped to
        #[arg(long, default_value = "local-user")]
        user_id: String,

        /// Resume hint for process-document (e.g. "chunking")
        #[arg(long)]
        resume_from_stage: Option<String>,

        /// Cleanup strategy for process-document: regex, ai, or noop
        #[arg(long, default_value = "regex")]
        cleanup_strategy: String,

        /// Archive path for export-documents/import-vault
        #[arg(long)]
        archive_path: Option<String>,

        /// Conflict mode for import-vault: skip, replace, merge-smart
        #[arg(long, default_value = "merge-smart")]
        conflict_mode: String,

        /// Reprocess mode for reprocess-connections: all, smart, add-new
        #[arg(long, default_value = "all")]
        reprocess_mode: String,

        /// Comma-separated engine allowlist for detect-connections/
        /// reprocess-connections (semantic-similarity, contradiction-detection,
        /// thematic-bridge); omit to run every enabled engine
        #[arg(long, value_delimiter = ',')]
        engines: Option<Vec<String>>,

        /// Preserve user_validated=true connection rows (reprocess-connections,
        /// mode=smart)
        #[arg(long)]
        preserve_validated: bool,

        /// Back up preserved rows to a timestamped file before purging
        /// (reprocess-connections, mode=smart)
        #[arg(long)]
        backup: bool,
    },

    /// Show a job's current row
    Show { id: Uuid },

    /// Pause a running or pending job
    Pause { id: Uuid },

    /// Resume a paused job
    Resume { id: Uuid },

    /// Cancel a job
    Cancel { id: Uuid },
}

fn parse_cleanup_strategy(value: &str) -> Result<CleanupStrategyChoice> {
    match value {
        "regex" => Ok(CleanupStrategyChoice::Regex),
        "ai" => Ok(CleanupStrategyChoice::Ai),
        "noop" => Ok(CleanupStrategyChoice::Noop),
        other => Err(crate::error::EngineRuntimeError::MalformedPayload(format!(
            "unknown cleanup strategy '{other}'"
        ))),
    }
}

fn parse_conflict_mode(value: &str) -> Result<ImportConflictMode> {
    match value {
        "skip" => Ok(ImportConflictMode::Skip),
        "replace" => Ok(ImportConflictMode::Replace),
        "merge-smart" | "merge_smart" => Ok(ImportConflictMode::MergeSmart),
        other => Err(crate::error::EngineRuntimeError::MalformedPayload(format!(
            "unknown conflict mode '{other}'"
        ))),
    }
}

fn parse_reprocess_mode(value: &str) -> Result<ReprocessMode> {
    match value {
        "all" => Ok(ReprocessMode::All),
        "smart" => Ok(ReprocessMode::Smart),
        "add-new" | "add_new" => Ok(ReprocessMode::AddNew),
        other => Err(crate::error::EngineRuntimeError::MalformedPayload(format!(
            "unknown reprocess mode '{other}'"
        ))),
    }
}

/// Runs every `corpus-worker job`/`export`/`import` subcommand that doesn't
/// need the full worker loop. `Commands::Worker` is handled by the caller,
/// since starting the loop needs the assembled [`crate::worker::Worker`]
/// rather than just a pool.
pub async fn run_one_shot(pool: &corpus_storage::DbPool, command: Commands) -> Result<()> {
    match command {
        Commands::Worker { .. } => unreachable!("worker run is dispatched by main.rs directly"),
        Commands::Job { action } => run_job_action(pool, action).await,
        Commands::Export { document_ids, out } => {
            let job_id = queue::enqueue(
                pool,
                JobType::ExportDocuments,
                None,
                "local-user",
                serde_json::to_string(&ExportDocumentsInput { document_ids, destination_path: out })
                    .expect("ExportDocumentsInput always serializes"),
                3,
            )
            .await?;
            println!("enqueued export job {job_id}");
            Ok(())
        }
        Commands::Import { path, mode } => {
            let conflict_mode = parse_conflict_mode(&mode)?;
            let job_id = queue::enqueue(
                pool,
                JobType::ImportVault,
                None,
                "local-user",
                serde_json::to_string(&ImportVaultInput { archive_path: path, conflict_mode })
                    .expect("ImportVaultInput always serializes"),
                3,
            )
            .await?;
            println!("enqueued import job {job_id}");
            Ok(())
        }
    }
}

async fn run_job_action(pool: &corpus_storage::DbPool, action: JobAction) -> Result<()> {
    match action {
        JobAction::Enqueue {
            job_type,
            document_id,
            chunk_ids,
            user_id,
            resume_from_stage,
            cleanup_strategy,
            archive_path,
            conflict_mode,
            reprocess_mode,
            engines,
            preserve_validated,
            backup,
        } => {
            let cleanup_strategy = parse_cleanup_strategy(&cleanup_strategy)?;
            let (parsed_type, input_data) = match job_type.as_str() {
                "process-document" | "process_document" => {
                    let document_id = document_id.ok_or_else(|| {
                        crate::error::EngineRuntimeError::MalformedPayload(
                            "--document-id is required for process-document".to_string(),
                        )
                    })?;
                    let input = ProcessDocumentInput {
                        document_id,
                        user_id: user_id.clone(),
                        resume_from_stage,
                        review_workflow: false,
                        enrich_chunks: true,
                        detect_connections_after: true,
                        cleanup_strategy,
                    };
                    (JobType::ProcessDocument, serde_json::to_string(&input))
                }
                "continue-processing" | "continue_processing" => {
                    let document_id = document_id.ok_or_else(|| {
                        crate::error::EngineRuntimeError::MalformedPayload(
                            "--document-id is required for continue-processing".to_string(),
                        )
                    })?;
                    let input = ContinueProcessingInput {
                        document_id,
                        user_id: user_id.clone(),
                        enrich_chunks: true,
                        detect_connections_after: true,
                        cleanup_strategy,
                    };
                    (JobType::ContinueProcessing, serde_json::to_string(&input))
                }
                "detect-connections" | "detect_connections" => {
                    let document_id = document_id.ok_or_else(|| {
                        crate::error::EngineRuntimeError::MalformedPayload(
                            "--document-id is required for detect-connections".to_string(),
                        )
                    })?;
                    let input = DetectConnectionsInput {
                        document_id,
                        target_document_ids: None,
                        enabled_engines: engines.clone(),
                    };
                    (JobType::DetectConnections, serde_json::to_string(&input))
                }
                "reprocess-connections" | "reprocess_connections" => {
                    let document_id = document_id.ok_or_else(|| {
                        crate::error::EngineRuntimeError::MalformedPayload(
                            "--document-id is required for reprocess-connections".to_string(),
                        )
                    })?;
                    let input = ReprocessConnectionsInput {
                        document_id,
                        mode: parse_reprocess_mode(&reprocess_mode)?,
                        engines: engines.clone(),
                        preserve_validated,
                        backup,
                    };
                    (JobType::ReprocessConnections, serde_json::to_string(&input))
                }
                "enrich-chunks" | "enrich_chunks" => {
                    let document_id = document_id.ok_or_else(|| {
                        crate::error::EngineRuntimeError::MalformedPayload(
                            "--document-id is required for enrich-chunks".to_string(),
                        )
                    })?;
                    let input = EnrichChunksInput { document_id, chunk_ids: chunk_ids.clone().unwrap_or_default() };
                    (JobType::EnrichChunks, serde_json::to_string(&input))
                }
                "enrich-and-connect" | "enrich_and_connect" => {
                    let document_id = document_id.ok_or_else(|| {
                        crate::error::EngineRuntimeError::MalformedPayload(
                            "--document-id is required for enrich-and-connect".to_string(),
                        )
                    })?;
                    let input = EnrichChunksInput { document_id, chunk_ids: chunk_ids.clone().unwrap_or_default() };
                    (JobType::EnrichAndConnect, serde_json::to_string(&input))
                }
                "export-documents" | "export_documents" => {
                    let destination_path = archive_path.ok_or_else(|| {
                        crate::error::EngineRuntimeError::MalformedPayload(
                            "--archive-path is required for export-documents".to_string(),
                        )
                    })?;
                    let input = ExportDocumentsInput {
                        document_ids: document_id.into_iter().collect(),
                        destination_path,
                    };
                    (JobType::ExportDocuments, serde_json::to_string(&input))
                }
                "import-vault" | "import_vault" => {
                    let archive_path = archive_path.ok_or_else(|| {
                        crate::error::EngineRuntimeError::MalformedPayload(
                            "--archive-path is required for import-vault".to_string(),
                        )
                    })?;
                    let input = ImportVaultInput { archive_path, conflict_mode: parse_conflict_mode(&conflict_mode)? };
                    (JobType::ImportVault, serde_json::to_string(&input))
                }
                other => {
                    return Err(crate::error::EngineRuntimeError::UnsupportedJobType(other.to_string()));
                }
            };
            let input_data = input_data.expect("job payloads always serialize");
            let job_id = queue::enqueue(pool, parsed_type, document_id, &user_id, input_data, 3).await?;
            println!("enqueued job {job_id}");
            Ok(())
        }
        JobAction::Show { id } => {
            let row = queue::show(pool, id).await?;
            println!("{}", serde_json::to_string_pretty(&row).unwrap_or_default());
            Ok(())
        }
        JobAction::Pause { id } => {
            queue::pause(pool, id).await?;
            println!("paused job {id}");
            Ok(())
        }
        JobAction::Resume { id } => {
            queue::resume(pool, id).await?;
            println!("resumed job {id}");
            Ok(())
        }
        JobAction::Cancel { id } => {
            queue::cancel(pool, id).await?;
            println!("cancelled job {id}");
            Ok(())
        }
    }
}
