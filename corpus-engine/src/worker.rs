//! The worker loop (§4.1, §5.1): claims one job per tick, dispatches it to
//! the matching pipeline handler, heartbeats while it runs, and sweeps for
//! stalled/retryable jobs on a slower cadence. Shuts down cooperatively on
//! a [`CancellationToken`] rather than aborting an in-flight job.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use corpus_connections::Orchestrator;
use corpus_ingest::embed::Embedder;
use corpus_ingest::enrich::EnrichmentProvider;
use corpus_ingest::extract::{Extractor, SourceType};
use corpus_storage::{DbPool, ObjectStore};

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::event_bus::{EventBus, StageEvent};
use crate::jobs::model::{self, JobInput};
use crate::jobs::{queue, retry, JobType};
use crate::pipeline::{self, PipelineDeps};
use crate::url_signer::UrlSigner;

/// Everything `Worker::run` needs to build a [`PipelineDeps`] per job and
/// to run the connection orchestrator for `detect_connections` jobs.
pub struct WorkerDeps {
    pub pool: DbPool,
    pub store: Arc<dyn ObjectStore>,
    pub extractors: HashMap<SourceType, Arc<dyn Extractor>>,
    pub ai_cleanup: Option<Arc<corpus_ingest::cleanup::AiCleanup>>,
    pub enrichment_provider: Arc<dyn EnrichmentProvider>,
    pub embedder: Arc<dyn Embedder>,
    pub orchestrator: Orchestrator,
    pub orchestrator_config: corpus_connections::OrchestratorConfig,
    pub events: Arc<EventBus>,
    pub url_signer: Arc<dyn UrlSigner>,
}

/// A job whose `updated_at` is older than this is considered stale and
/// reclaimed (Testable Property/Invariant 6) — fixed rather than derived
/// from `heartbeat_interval_secs`, since the two are unrelated: the
/// heartbeat cadence can be tuned independently without changing when a
/// job is declared dead.
const STALLED_AFTER_SECS: i64 = 30;

pub struct Worker {
    config: WorkerConfig,
    deps: WorkerDeps,
    // Guards against the claim tick and the retry-sweep tick racing each
    // other onto the same connection pool; sqlx pools are already safe to
    // share, but this keeps the two passes from interleaving their logs.
    tick_lock: Mutex<()>,
}

impl Worker {
    pub fn new(config: WorkerConfig, deps: WorkerDeps) -> Self {
        Worker { config, deps, tick_lock: Mutex::new(()) }
    }

    fn pipeline_deps(&self) -> PipelineDeps {
        PipelineDeps {
            pool: self.deps.pool.clone(),
            store: self.deps.store.clone(),
            extractors: self.deps.extractors.clone(),
            ai_cleanup: self.deps.ai_cleanup.clone(),
            enrichment_provider: self.deps.enrichment_provider.clone(),
            embedder: self.deps.embedder.clone(),
            events: self.deps.events.clone(),
            max_enrichment_attempts: 3,
        }
    }

    /// Runs until `shutdown` is cancelled. Cancellation is observed only
    /// between ticks, not mid-job — an in-flight job always runs to its
    /// next checkpoint or completion (§5.1).
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            claim_interval_secs = self.config.claim_interval_secs,
            retry_pass_interval_secs = self.config.retry_pass_interval_secs,
            heartbeat_interval_secs = self.config.heartbeat_interval_secs,
            max_retries = self.config.max_retries,
            "worker starting"
        );

        let mut claim_tick = tokio::time::interval(self.config.claim_interval());
        let mut retry_tick = tokio::time::interval(self.config.retry_pass_interval());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("worker shutting down");
                    break;
                }
                _ = claim_tick.tick() => {
                    let _guard = self.tick_lock.lock().await;
                    if let Err(err) = self.claim_and_run_one(&shutdown).await {
                        error!(error = %err, "claim tick failed");
                    }
                }
                _ = retry_tick.tick() => {
                    let _guard = self.tick_lock.lock().await;
                    if let Err(err) = self.run_retry_pass().await {
                        error!(error = %err, "retry sweep failed");
                    }
                }
            }
        }
    }

    async fn claim_and_run_one(&self, shutdown: &CancellationToken) -> Result<()> {
        let Some(claimed) = queue::claim_next(&self.deps.pool).await? else {
            return Ok(());
        };

        info!(job_id = %claimed.id, job_type = claimed.job_type.as_str(), "job claimed");
        let _ = self.deps.events.publish(StageEvent::JobClaimed {
            job_id: claimed.id,
            job_type: claimed.job_type.as_str().to_string(),
        });

        let heartbeat_handle = self.spawn_heartbeat(claimed.id, shutdown.clone());
        let outcome = self
            .dispatch(claimed.id, &claimed.job_type, &claimed.input_data, claimed.last_checkpoint_stage.as_deref())
            .await;
        heartbeat_handle.abort();

        match outcome {
            Ok(output) => {
                queue::complete(&self.deps.pool, claimed.id, &output).await?;
                info!(job_id = %claimed.id, "job completed");
            }
            Err(err) => {
                let kind = retry::handle_failure(
                    &self.deps.pool,
                    claimed.id,
                    claimed.retry_count,
                    self.config.retry_backoff_cap_minutes as i64,
                    &err,
                )
                .await?;
                warn!(job_id = %claimed.id, error = %err, kind = ?kind, "job failed");
                let _ = self.deps.events.publish(StageEvent::Diagnostic {
                    job_id: Some(claimed.id),
                    scope: "worker".to_string(),
                    message: format!("job failed ({kind:?}): {err}"),
                });
            }
        }
        Ok(())
    }

    fn spawn_heartbeat(&self, job_id: Uuid, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let pool = self.deps.pool.clone();
        let interval = self.config.heartbeat_interval();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(err) = queue::heartbeat(&pool, job_id).await {
                            warn!(job_id = %job_id, error = %err, "heartbeat failed");
                        }
                    }
                }
            }
        })
    }

    #[instrument(skip(self, input_data))]
    async fn dispatch(
        &self,
        job_id: Uuid,
        job_type: &JobType,
        input_data: &str,
        last_checkpoint_stage: Option<&str>,
    ) -> Result<String> {
        match model::decode_input(job_type, input_data)? {
            JobInput::ProcessDocument(mut input) => {
                // A job resumed after a pause or a crash carries no memory
                // of where it left off in its own `input_data` — the job
                // row's checkpoint pointer is the only record of that, so a
                // fresh resume always takes precedence over whatever hint
                // (if any) the original enqueue call set.
                if let Some(stage) = last_checkpoint_stage {
                    input.resume_from_stage = Some(stage.to_string());
                }
                pipeline::process_document(&self.pipeline_deps(), job_id, input).await
            }
            JobInput::ContinueProcessing(input) => {
                pipeline::continue_processing::run(&self.pipeline_deps(), job_id, input).await
            }
            JobInput::DetectConnections(input) => {
                let count = pipeline::run_detect_connections(
                    &self.deps.pool,
                    &self.deps.orchestrator,
                    &self.deps.orchestrator_config,
                    input.document_id,
                )
                .await?;
                Ok(format!("{{\"connections_found\":{count}}}"))
            }
            JobInput::ReprocessConnections(input) => {
                let count = pipeline::run_reprocess_connections(
                    &self.deps.pool,
                    self.deps.store.as_ref(),
                    &self.deps.orchestrator,
                    &self.deps.orchestrator_config,
                    input,
                )
                .await?;
                Ok(format!("{{\"connections_found\":{count}}}"))
            }
            JobInput::EnrichChunks(input) => {
                let count = pipeline::run_enrich_chunks(
                    &self.pipeline_deps(),
                    input.document_id,
                    &input.chunk_ids,
                    false,
                )
                .await?;
                Ok(format!("{{\"chunks_enriched\":{count}}}"))
            }
            JobInput::EnrichAndConnect(input) => {
                let count = pipeline::run_enrich_chunks(
                    &self.pipeline_deps(),
                    input.document_id,
                    &input.chunk_ids,
                    true,
                )
                .await?;
                Ok(format!("{{\"chunks_enriched\":{count}}}"))
            }
            JobInput::ExportDocuments(input) => {
                let manifest = crate::exporter::export_documents(
                    &self.deps.pool,
                    self.deps.store.as_ref(),
                    &input.document_ids,
                    &input.destination_path,
                    self.deps.url_signer.as_ref(),
                    self.config.signed_url_ttl_secs as i64,
                )
                .await?;
                serde_json::to_string(&manifest).map_err(|e| crate::error::EngineRuntimeError::Portability(e.to_string()))
            }
            JobInput::ImportVault(input) => {
                let report = crate::importer::import_vault(
                    &self.deps.pool,
                    self.deps.store.as_ref(),
                    &input.archive_path,
                    input.conflict_mode,
                )
                .await?;
                serde_json::to_string(&report).map_err(|e| crate::error::EngineRuntimeError::Portability(e.to_string()))
            }
        }
    }

    async fn run_retry_pass(&self) -> Result<()> {
        let recovered = retry::recover_stalled(&self.deps.pool, STALLED_AFTER_SECS).await?;
        if recovered > 0 {
            info!(recovered, "recovered stalled jobs back to pending");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_connections::Orchestrator;
    use corpus_ingest::embed::HashSeededEmbedder;
    use corpus_ingest::enrich::LocalHeuristicEnrichmentProvider;
    use corpus_storage::object_store::LocalFsStore;
    use tempfile::tempdir;

    use crate::config::WorkerConfig;
    use crate::jobs::model::{DetectConnectionsInput, JobType as ModelJobType};
    use crate::jobs::queue;

    async fn test_worker(dir: &std::path::Path) -> Worker {
        let pool = DbPool::connect("sqlite::memory:").await.unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalFsStore::new(dir));
        let deps = WorkerDeps {
            pool,
            store,
            extractors: HashMap::new(),
            ai_cleanup: None,
            enrichment_provider: Arc::new(LocalHeuristicEnrichmentProvider),
            embedder: Arc::new(HashSeededEmbedder),
            orchestrator: Orchestrator::builder().build(),
            orchestrator_config: corpus_connections::OrchestratorConfig::default(),
            events: Arc::new(EventBus::default()),
            url_signer: Arc::new(crate::url_signer::HmacUrlSigner::new(b"test-secret".to_vec())),
        };
        Worker::new(WorkerConfig::default(), deps)
    }

    #[tokio::test]
    async fn an_empty_queue_completes_the_tick_without_error() {
        let dir = tempdir().unwrap();
        let worker = test_worker(dir.path()).await;
        let shutdown = CancellationToken::new();
        worker.claim_and_run_one(&shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn a_job_pointing_at_a_missing_document_is_routed_to_retry_or_failure() {
        let dir = tempdir().unwrap();
        let worker = test_worker(dir.path()).await;

        let input = DetectConnectionsInput {
            document_id: Uuid::new_v4(),
            target_document_ids: None,
            enabled_engines: None,
        };
        let job_id = queue::enqueue(
            &worker.deps.pool,
            ModelJobType::DetectConnections,
            Some(input.document_id),
            "local-user",
            serde_json::to_string(&input).unwrap(),
            3,
        )
        .await
        .unwrap();

        let shutdown = CancellationToken::new();
        worker.claim_and_run_one(&shutdown).await.unwrap();

        let row = queue::show(&worker.deps.pool, job_id).await.unwrap();
        assert_ne!(row.status, "running");
        assert_ne!(row.status, "completed");
    }
}
