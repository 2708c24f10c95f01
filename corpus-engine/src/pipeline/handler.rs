//! The `process_document` / `continue_processing` handler (§4.4, C13):
//! drives extraction through finalize, publishing progress and
//! checkpoints along the way.
//!
//! Execution order here follows the actual data dependency between
//! stages (chunking must produce drafts before the matcher can place
//! them) rather than the stage list's numbering, since
//! `corpus_ingest::matcher` already fuses bulletproof matching and
//! metadata transfer into one `match_all` call. Stage *events* and
//! progress percentages still use the documented bands; only the
//! in-process call order differs from the stage list's enumeration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use corpus_connections::{NoopProgressSink, Orchestrator, OrchestratorConfig};
use corpus_ingest::chunk::SemanticChunker;
use corpus_ingest::cleanup::{AiCleanup, CleanupOutput, CleanupStrategy, NoopCleanup, RegexCleanup};
use corpus_ingest::embed::Embedder;
use corpus_ingest::enrich::{ChunkEnricher, EnrichmentProvider, EnrichmentSkippedReason};
use corpus_ingest::extract::{ExtractionOutput, Extractor, SourceRef, SourceType};
use corpus_ingest::matcher::{BulletproofMatcher, MatchDocument, MatchedChunk, PositionConfidence};

use corpus_storage::db::chunks::{self, NewChunk};
use corpus_storage::db::documents;
use corpus_storage::{DbPool, ObjectStore};

use crate::checkpoint::{read_checkpoint, resume_stage_after, write_checkpoint};
use crate::error::{EngineRuntimeError, Result};
use crate::event_bus::{EventBus, StageEvent};
use crate::jobs::model::{CleanupStrategyChoice, ProcessDocumentInput};
use crate::jobs::queue;

use super::stages;

/// Everything the handler needs but doesn't own: the capability
/// implementations selected for this worker process, plugged in behind
/// the same traits `corpus-ingest` defines.
pub struct PipelineDeps {
    pub pool: DbPool,
    pub store: Arc<dyn ObjectStore>,
    pub extractors: HashMap<SourceType, Arc<dyn Extractor>>,
    pub ai_cleanup: Option<Arc<AiCleanup>>,
    pub enrichment_provider: Arc<dyn EnrichmentProvider>,
    pub embedder: Arc<dyn Embedder>,
    pub events: Arc<EventBus>,
    pub max_enrichment_attempts: u32,
}

fn source_type_from_str(value: &str) -> Result<SourceType> {
    match value {
        "plain_text" => Ok(SourceType::PlainText),
        "html" => Ok(SourceType::Html),
        "markdown" => Ok(SourceType::Markdown),
        "remote_docling" => Ok(SourceType::RemoteDocling),
        "remote_chonkie" => Ok(SourceType::RemoteChonkie),
        other => Err(EngineRuntimeError::MalformedPayload(format!(
            "unknown source_type '{other}'"
        ))),
    }
}

fn source_ref_for(source_type: SourceType, raw: String) -> SourceRef {
    match source_type {
        SourceType::PlainText => SourceRef::PlainText(raw),
        SourceType::Html => SourceRef::Html(raw),
        SourceType::Markdown => SourceRef::Markdown(raw),
        SourceType::RemoteDocling | SourceType::RemoteChonkie => SourceRef::Remote { url: raw },
    }
}

fn cleanup_strategy_for(choice: &CleanupStrategyChoice, ai: &Option<Arc<AiCleanup>>) -> Arc<dyn CleanupStrategy> {
    match choice {
        CleanupStrategyChoice::Regex => Arc::new(RegexCleanup::default()),
        CleanupStrategyChoice::Noop => Arc::new(NoopCleanup),
        CleanupStrategyChoice::Ai => ai
            .clone()
            .map(|a| a as Arc<dyn CleanupStrategy>)
            .unwrap_or_else(|| Arc::new(RegexCleanup::default())),
    }
}

fn publish(events: &EventBus, event: StageEvent) {
    let _ = events.publish(event);
}

/// Drives a `process_document` (or resumed `continue_processing`) job
/// from `job.input_data` through to completion. Returns the output
/// summary to record on the job row.
#[instrument(skip(deps, input), fields(document_id = %input.document_id))]
pub async fn run(deps: &PipelineDeps, job_id: Uuid, input: ProcessDocumentInput) -> Result<String> {
    let document_id = input.document_id;
    let user_id = input.user_id.clone();
    let started_at = Instant::now();

    publish(
        &deps.events,
        StageEvent::JobClaimed {
            job_id,
            job_type: "process_document".to_string(),
        },
    );

    let document = documents::get(&deps.pool, &document_id.to_string()).await?;
    documents::update_status(&deps.pool, &document.id, "extracting").await?;

    let resume_from = input.resume_from_stage.as_deref();
    if let Some(completed_stage) = resume_from {
        if let Some(next_stage) = resume_stage_after(completed_stage) {
            info!(completed_stage, next_stage, "resuming job from checkpoint");
        }
    }

    // --- Stage 1: Extraction (pause-safe) ---
    let extraction = if resume_from == Some("extraction")
        || resume_from == Some("cleanup")
        || resume_from == Some("chunking")
        || resume_from == Some("embedding")
    {
        load_checkpoint_or_refetch::<ExtractionOutput>(
            deps,
            job_id,
            &user_id,
            &document_id.to_string(),
            "extraction",
        )
        .await?
    } else {
        None
    };

    let extraction = match extraction {
        Some(existing) => existing,
        None => {
            emit_stage_started(deps, job_id, stages::EXTRACTION.0);
            let source_type = source_type_from_str(&document.source_type)?;
            let extractor = deps.extractors.get(&source_type).ok_or_else(|| {
                EngineRuntimeError::UnsupportedJobType(format!("no extractor registered for {:?}", source_type))
            })?;
            let raw = String::from_utf8(deps.store.read(&document.storage_path).await?)
                .map_err(|e| EngineRuntimeError::Portability(e.to_string()))?;

            let source_path = corpus_storage::object_store::document_path(
                &user_id,
                &document_id.to_string(),
                corpus_storage::object_store::source_file_name(&document.source_type),
            );
            deps.store.write(&source_path, raw.as_bytes()).await?;

            let source_ref = source_ref_for(source_type, raw);
            let output = extractor.extract(&source_ref).await?;

            checkpoint_stage(deps, job_id, &user_id, &document_id.to_string(), "extraction", output.clone())
                .await?;
            update_progress(deps, job_id, stages::EXTRACTION.1, stages::EXTRACTION.0).await?;
            output
        }
    };

    if input.review_workflow && resume_from.is_none() {
        documents::update_status(&deps.pool, &document.id, "awaiting_manual_review").await?;
        publish(
            &deps.events,
            StageEvent::Diagnostic {
                job_id: Some(job_id),
                scope: "pipeline".to_string(),
                message: "document parked at awaiting_manual_review; continue_processing required".to_string(),
            },
        );
        return Ok("awaiting_manual_review".to_string());
    }

    documents::update_status(&deps.pool, &document.id, "processing").await?;

    // --- Stage 3: Cleanup (pause-safe) ---
    let cleaned_markdown = if resume_from == Some("cleanup") || resume_from == Some("chunking") || resume_from == Some("embedding")
    {
        load_checkpoint_or_refetch::<CleanupOutput>(deps, job_id, &user_id, &document_id.to_string(), "cleanup")
            .await?
            .map(|c| c.markdown)
    } else {
        None
    };

    let cleaned_markdown = match cleaned_markdown {
        Some(markdown) => markdown,
        None => {
            emit_stage_started(deps, job_id, stages::CLEANUP.0);
            let strategy = cleanup_strategy_for(&input.cleanup_strategy, &deps.ai_cleanup);
            let cleanup_output = strategy.clean(&extraction.markdown).await?;
            checkpoint_stage(
                deps,
                job_id,
                &user_id,
                &document_id.to_string(),
                "cleanup",
                cleanup_output.clone(),
            )
            .await?;
            update_progress(deps, job_id, stages::CLEANUP.1, stages::CLEANUP.0).await?;
            cleanup_output.markdown
        }
    };

    // --- Stage 5: Semantic Chunking (pause-safe) ---
    let chunking_output = if resume_from == Some("chunking") || resume_from == Some("embedding") {
        load_checkpoint_or_refetch::<corpus_ingest::chunk::ChunkingOutput>(
            deps,
            job_id,
            &user_id,
            &document_id.to_string(),
            "chunking",
        )
        .await?
    } else {
        None
    };

    let chunking_output = match chunking_output {
        Some(existing) => existing,
        None => {
            emit_stage_started(deps, job_id, stages::CHUNKING.0);
            let chunker = SemanticChunker {
                target_tokens: 256,
                chunker_type: "semantic_v1".to_string(),
            };
            let output = chunker.chunk(&cleaned_markdown)?;
            if output.chunks.is_empty() {
                return Err(EngineRuntimeError::Ingest(corpus_ingest::IngestError::EmptyChunking));
            }
            checkpoint_stage(deps, job_id, &user_id, &document_id.to_string(), "chunking", output.clone())
                .await?;
            update_progress(deps, job_id, stages::CHUNKING.1, stages::CHUNKING.0).await?;
            output
        }
    };

    // --- Stage 4/6: Bulletproof Matching + Metadata Transfer (not pause-safe) ---
    emit_stage_started(deps, job_id, stages::MATCHING.0);
    let matcher = BulletproofMatcher::default();
    let match_doc = MatchDocument {
        markdown: &cleaned_markdown,
        extractor_chunks: &extraction.extractor_chunks,
    };
    let matched_chunks = matcher.match_all(&chunking_output.chunks, &match_doc);
    update_progress(deps, job_id, stages::METADATA_TRANSFER.1, stages::METADATA_TRANSFER.0).await?;

    // --- Stage 7: Metadata Enrichment ---
    let enricher = ChunkEnricher::new(dyn_enrichment_provider(deps), deps.max_enrichment_attempts);
    let mut enriched = Vec::with_capacity(matched_chunks.len());
    if input.enrich_chunks {
        emit_stage_started(deps, job_id, stages::ENRICHMENT.0);
        for matched in &matched_chunks {
            let response = enricher.enrich(&matched.draft.content).await;
            enriched.push(Some(response));
        }
        update_progress(deps, job_id, stages::ENRICHMENT.1, stages::ENRICHMENT.0).await?;
    } else {
        enriched.extend(std::iter::repeat(None).take(matched_chunks.len()));
    }

    // --- Stage 8: Embedding (pause-safe) ---
    let embeddings = if resume_from == Some("embedding") {
        load_checkpoint_or_refetch::<Vec<Vec<f32>>>(deps, job_id, &user_id, &document_id.to_string(), "embedding")
            .await?
    } else {
        None
    };
    let embeddings = match embeddings {
        Some(existing) => existing,
        None => {
            emit_stage_started(deps, job_id, stages::EMBEDDING.0);
            let mut vectors = Vec::with_capacity(matched_chunks.len());
            for matched in &matched_chunks {
                vectors.push(deps.embedder.embed(&matched.draft.content).await?);
            }
            checkpoint_stage(deps, job_id, &user_id, &document_id.to_string(), "embedding", vectors.clone())
                .await?;
            update_progress(deps, job_id, stages::EMBEDDING.1, stages::EMBEDDING.0).await?;
            vectors
        }
    };

    // --- Stage 9: Persistence ---
    emit_stage_started(deps, job_id, stages::PERSISTENCE.0);
    persist_chunks(deps, &document_id.to_string(), &matched_chunks, &enriched, &embeddings).await?;
    let persisted_rows = chunks::list_for_document(&deps.pool, &document_id.to_string()).await?;
    write_final_artifacts(
        deps,
        &user_id,
        &document_id.to_string(),
        &document,
        &persisted_rows,
        started_at.elapsed(),
    )
    .await?;
    update_progress(deps, job_id, stages::PERSISTENCE.1, stages::PERSISTENCE.0).await?;

    // --- Stage 10: Connection Detection Hand-off ---
    if input.detect_connections_after {
        emit_stage_started(deps, job_id, stages::CONNECTION_HANDOFF.0);
        let payload = serde_json::to_string(&crate::jobs::model::DetectConnectionsInput {
            document_id,
            target_document_ids: None,
            enabled_engines: None,
        })
        .map_err(|e| EngineRuntimeError::Portability(e.to_string()))?;
        queue::enqueue(
            &deps.pool,
            crate::jobs::JobType::DetectConnections,
            Some(document_id),
            &user_id,
            payload,
            3,
        )
        .await?;
        update_progress(deps, job_id, stages::CONNECTION_HANDOFF.1, stages::CONNECTION_HANDOFF.0).await?;
    }

    // --- Stage 11: Finalize ---
    emit_stage_started(deps, job_id, stages::FINALIZE.0);
    documents::update_status(&deps.pool, &document.id, "completed").await?;
    update_progress(deps, job_id, stages::FINALIZE.1, stages::FINALIZE.0).await?;

    info!(chunk_count = matched_chunks.len(), "document processing complete");
    Ok(format!("{{\"chunk_count\":{}}}", matched_chunks.len()))
}

fn dyn_enrichment_provider(deps: &PipelineDeps) -> Box<dyn EnrichmentProvider> {
    struct Forward(Arc<dyn EnrichmentProvider>);
    #[async_trait::async_trait]
    impl EnrichmentProvider for Forward {
        async fn enrich(&self, chunk_content: &str) -> corpus_ingest::Result<corpus_ingest::enrich::EnrichmentResponse> {
            self.0.enrich(chunk_content).await
        }
    }
    Box::new(Forward(deps.enrichment_provider.clone()))
}

fn emit_stage_started(deps: &PipelineDeps, job_id: Uuid, stage: &str) {
    publish(
        &deps.events,
        StageEvent::StageStarted {
            job_id,
            stage: stage.to_string(),
        },
    );
}

async fn update_progress(deps: &PipelineDeps, job_id: Uuid, percent: f64, stage: &str) -> Result<()> {
    queue::update_progress(&deps.pool, job_id, percent, stage, None).await?;
    publish(
        &deps.events,
        StageEvent::StageCompleted {
            job_id,
            stage: stage.to_string(),
        },
    );
    Ok(())
}

async fn checkpoint_stage<T>(
    deps: &PipelineDeps,
    job_id: Uuid,
    user_id: &str,
    document_id: &str,
    stage: &str,
    payload: T,
) -> Result<()>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Clone,
{
    let (envelope, path) = write_checkpoint(deps.store.as_ref(), user_id, document_id, stage, payload).await?;
    queue::save_checkpoint_pointer(&deps.pool, job_id, &path, stage, &envelope.hash).await?;
    Ok(())
}

/// Loads a checkpoint for `stage` if the job is resuming at or past it;
/// falls back to `None` (fresh execution) on a missing object or hash
/// mismatch, per §4.3's "local recovery, not fatal" rule.
async fn load_checkpoint_or_refetch<T>(
    deps: &PipelineDeps,
    job_id: Uuid,
    user_id: &str,
    document_id: &str,
    stage: &str,
) -> Result<Option<T>>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let path = corpus_storage::object_store::checkpoint_path(user_id, document_id, stage);
    match read_checkpoint::<T>(deps.store.as_ref(), &path).await {
        Ok(envelope) => Ok(Some(envelope.payload)),
        Err(EngineRuntimeError::Storage(corpus_storage::StorageError::ObjectNotFound(_))) => {
            info!(stage, "cache_miss_reextraction: no checkpoint object at this stage, re-executing");
            publish(
                &deps.events,
                StageEvent::Diagnostic {
                    job_id: Some(job_id),
                    scope: "pipeline".to_string(),
                    message: format!("cache_miss_reextraction: no checkpoint found for stage '{stage}'"),
                },
            );
            Ok(None)
        }
        Err(EngineRuntimeError::CheckpointMismatch { stage, expected, found }) => {
            warn!(stage, expected, found, "checkpoint hash mismatch, falling back to re-execution");
            Ok(None)
        }
        Err(other) => Err(other),
    }
}

fn metadata_confidence_str(confidence: corpus_ingest::matcher::MetadataConfidence) -> &'static str {
    use corpus_ingest::matcher::MetadataConfidence::*;
    match confidence {
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

fn position_confidence_str(confidence: PositionConfidence) -> &'static str {
    match confidence {
        PositionConfidence::Exact => "exact",
        PositionConfidence::High => "high",
        PositionConfidence::Medium => "medium",
        PositionConfidence::Synthetic => "synthetic",
    }
}

async fn persist_chunks(
    deps: &PipelineDeps,
    document_id: &str,
    matched_chunks: &[MatchedChunk],
    enriched: &[Option<corpus_ingest::enrich::EnrichmentResponse>],
    embeddings: &[Vec<f32>],
) -> Result<()> {
    for ((matched, enrichment), embedding) in matched_chunks.iter().zip(enriched.iter()).zip(embeddings.iter()) {
        let row = chunks::upsert(
            &deps.pool,
            NewChunk {
                document_id: document_id.to_string(),
                chunk_index: matched.draft.chunk_index,
                content: matched.draft.content.clone(),
                start_offset: matched.draft.start_offset,
                end_offset: matched.draft.end_offset,
                word_count: matched.draft.word_count,
                chunker_type: matched.draft.chunker_type.clone(),
                token_count: matched.draft.token_count,
                page_start: matched.metadata.page_start.map(i64::from),
                page_end: matched.metadata.page_end.map(i64::from),
                heading_path: serde_json::to_string(&matched.metadata.heading_path)
                    .map_err(|e| EngineRuntimeError::Portability(e.to_string()))?,
                heading_level: None,
                section_marker: matched.metadata.section_marker.clone(),
                bboxes: serde_json::to_string(&matched.metadata.bboxes)
                    .map_err(|e| EngineRuntimeError::Portability(e.to_string()))?,
                position_confidence: position_confidence_str(matched.position_confidence).to_string(),
                position_method: matched.position_method.clone(),
                position_validated: matched.position_validated,
            },
        )
        .await?;

        let embedding_json =
            serde_json::to_string(embedding).map_err(|e| EngineRuntimeError::Portability(e.to_string()))?;
        chunks::update_embedding(&deps.pool, &row.id, &embedding_json).await?;

        match enrichment {
            Some(response) => {
                chunks::update_enrichment(
                    &deps.pool,
                    &row.id,
                    &serde_json::to_string(&response.themes).map_err(|e| EngineRuntimeError::Portability(e.to_string()))?,
                    Some(response.importance_score),
                    Some(&response.summary),
                    Some(
                        &serde_json::to_string(&response.emotional_metadata)
                            .map_err(|e| EngineRuntimeError::Portability(e.to_string()))?,
                    ),
                    Some(
                        &serde_json::to_string(&response.conceptual_metadata)
                            .map_err(|e| EngineRuntimeError::Portability(e.to_string()))?,
                    ),
                    Some(
                        &serde_json::to_string(&response.domain_metadata)
                            .map_err(|e| EngineRuntimeError::Portability(e.to_string()))?,
                    ),
                    matched.metadata.overlap_count,
                    metadata_confidence_str(matched.metadata.confidence),
                    matched.metadata.interpolated,
                )
                .await?;
            }
            None => {
                let _: EnrichmentSkippedReason = EnrichmentSkippedReason::UserChoice;
                chunks::mark_enrichment_skipped(&deps.pool, &row.id, "user_choice").await?;
            }
        }
    }
    Ok(())
}

/// Writes the final artifact set for stage 9 — `chunks.json`,
/// `metadata.json`, `manifest.json` — from the rows `persist_chunks` just
/// upserted, so every chunk carries its real persisted `id` (the same
/// shape `exporter::chunk_row_to_json` produces for an export archive).
async fn write_final_artifacts(
    deps: &PipelineDeps,
    user_id: &str,
    document_id: &str,
    document: &corpus_storage::db::models::DocumentRow,
    rows: &[corpus_storage::db::models::ChunkRow],
    processing_time: std::time::Duration,
) -> Result<()> {
    let chunks_json = serde_json::json!({
        "version": "1.0",
        "document_id": document_id,
        "chunks": rows.iter().map(crate::exporter::chunk_row_to_json).collect::<Vec<_>>(),
    });
    let metadata_json = serde_json::json!({
        "version": "1.0",
        "document_id": document_id,
        "title": document.title,
        "created_at": document.created_at,
        "processing_mode": document.processing_status,
    });

    let chunks_bytes = serde_json::to_vec_pretty(&chunks_json).unwrap_or_default();
    let metadata_bytes = serde_json::to_vec_pretty(&metadata_json).unwrap_or_default();
    let word_count: i64 = rows.iter().map(|r| r.word_count).sum();

    let manifest_json = serde_json::json!({
        "version": "1.0",
        "files": {
            "chunks.json": { "size": chunks_bytes.len(), "type": "final" },
            "metadata.json": { "size": metadata_bytes.len(), "type": "final" },
        },
        "chunk_count": rows.len(),
        "word_count": word_count,
        "processing_time": processing_time.as_secs_f64(),
        "docling_version": serde_json::Value::Null,
    });

    let chunks_path = corpus_storage::object_store::document_path(user_id, document_id, "chunks.json");
    let metadata_path = corpus_storage::object_store::document_path(user_id, document_id, "metadata.json");
    let manifest_path = corpus_storage::object_store::document_path(user_id, document_id, "manifest.json");
    deps.store.write(&chunks_path, &chunks_bytes).await?;
    deps.store.write(&metadata_path, &metadata_bytes).await?;
    deps.store
        .write(&manifest_path, serde_json::to_vec_pretty(&manifest_json).unwrap_or_default().as_slice())
        .await?;
    Ok(())
}

/// Converts a persisted chunk row into the narrow view `corpus-connections`
/// engines see, decoding whichever enrichment JSON blobs are present.
fn chunk_row_to_view(row: &corpus_storage::db::models::ChunkRow) -> Result<corpus_connections::ChunkView> {
    let concepts = row
        .conceptual_metadata
        .as_deref()
        .and_then(|raw| serde_json::from_str::<corpus_ingest::enrich::ConceptualMetadata>(raw).ok())
        .map(|m| m.concepts.into_iter().map(|c| c.name).collect())
        .unwrap_or_default();
    let emotional_polarity = row
        .emotional_metadata
        .as_deref()
        .and_then(|raw| serde_json::from_str::<corpus_ingest::enrich::EmotionalMetadata>(raw).ok())
        .map(|m| m.polarity);
    let primary_domain = row
        .domain_metadata
        .as_deref()
        .and_then(|raw| serde_json::from_str::<corpus_ingest::enrich::DomainMetadata>(raw).ok())
        .map(|m| m.primary_domain);

    Ok(corpus_connections::ChunkView {
        chunk_id: Uuid::parse_str(&row.id)
            .map_err(|_| EngineRuntimeError::MalformedPayload(format!("bad chunk id {}", row.id)))?,
        document_id: Uuid::parse_str(&row.document_id)
            .map_err(|_| EngineRuntimeError::MalformedPayload(format!("bad document id {}", row.document_id)))?,
        embedding: row.embedding.as_deref().and_then(|e| serde_json::from_str::<Vec<f32>>(e).ok()),
        importance_score: row.importance_score,
        concepts,
        emotional_polarity,
        primary_domain,
        summary: row.summary.clone(),
    })
}

/// Runs the orchestrator for a `detect_connections` job, restricting the
/// candidate pool to chunks outside the source document (§4.6).
#[instrument(skip(pool, orchestrator_config))]
pub async fn run_detect_connections(
    pool: &DbPool,
    orchestrator: &Orchestrator,
    orchestrator_config: &OrchestratorConfig,
    document_id: Uuid,
) -> Result<usize> {
    let source_document = documents::get(pool, &document_id.to_string()).await?;
    let source_rows = chunks::list_for_document(pool, &document_id.to_string()).await?;
    let sibling_documents = documents::list_by_user(pool, &source_document.user_id).await?;

    let mut candidate_rows = Vec::new();
    for doc in sibling_documents.iter().filter(|d| d.id != document_id.to_string()) {
        candidate_rows.extend(chunks::list_for_document(pool, &doc.id).await?);
    }

    let source_chunks = source_rows.iter().map(chunk_row_to_view).collect::<Result<Vec<_>>>()?;
    let candidate_pool = candidate_rows.iter().map(chunk_row_to_view).collect::<Result<Vec<_>>>()?;

    let connections = orchestrator
        .run(document_id, &source_chunks, &candidate_pool, orchestrator_config, &NoopProgressSink)
        .await
        .map_err(EngineRuntimeError::Connection)?;

    let count = connections.len();
    for conn in connections {
        persist_connection(pool, conn).await?;
    }
    Ok(count)
}

async fn persist_connection(pool: &DbPool, conn: corpus_connections::Connection) -> Result<()> {
    corpus_storage::db::connections::upsert(
        pool,
        corpus_storage::db::connections::NewConnection {
            source_chunk_id: conn.source_chunk_id.to_string(),
            target_chunk_id: conn.target_chunk_id.to_string(),
            engine_type: conn.engine_type.as_str().to_string(),
            strength: conn.strength,
            connection_type: conn.connection_type,
            evidence: conn.evidence,
        },
    )
    .await?;
    Ok(())
}

/// Runs `reprocess_connections` (§4.6, §8 properties 7–8): `all`/`smart`
/// rerun every enabled engine against the full sibling pool, with `smart`
/// sparing (and optionally backing up) `user_validated` rows; `add_new`
/// leaves existing connections untouched and only looks for new ones
/// against documents created after the source document, which both caps
/// the candidate pool and enforces the forward-only targeting §8 property 7
/// requires.
#[instrument(skip(pool, store, orchestrator_config))]
pub async fn run_reprocess_connections(
    pool: &DbPool,
    store: &dyn ObjectStore,
    orchestrator: &Orchestrator,
    orchestrator_config: &OrchestratorConfig,
    input: crate::jobs::model::ReprocessConnectionsInput,
) -> Result<usize> {
    use crate::jobs::model::ReprocessMode;

    let document_id = input.document_id;
    let source_document = documents::get(pool, &document_id.to_string()).await?;
    let source_rows = chunks::list_for_document(pool, &document_id.to_string()).await?;
    let sibling_documents = documents::list_by_user(pool, &source_document.user_id).await?;

    let enabled_engines: Option<Vec<corpus_connections::EngineType>> = input
        .engines
        .as_ref()
        .map(|names| names.iter().filter_map(|n| corpus_connections::EngineType::parse(n)).collect());

    let candidate_docs: Vec<_> = match input.mode {
        ReprocessMode::All | ReprocessMode::Smart => sibling_documents
            .iter()
            .filter(|d| d.id != document_id.to_string())
            .collect(),
        ReprocessMode::AddNew => sibling_documents
            .iter()
            .filter(|d| d.id != document_id.to_string() && d.created_at > source_document.created_at)
            .collect(),
    };

    let mut candidate_rows = Vec::new();
    for doc in &candidate_docs {
        candidate_rows.extend(chunks::list_for_document(pool, &doc.id).await?);
    }

    if let ReprocessMode::Smart = input.mode {
        if input.preserve_validated {
            if input.backup {
                let validated =
                    corpus_storage::db::connections::list_validated_for_source_document(pool, &document_id.to_string())
                        .await?;
                if !validated.is_empty() {
                    let backup_json = serde_json::json!({
                        "version": "1.0",
                        "connections": validated.iter().map(|c| serde_json::json!({
                            "id": c.id,
                            "source_chunk_id": c.source_chunk_id,
                            "target_chunk_id": c.target_chunk_id,
                            "engine_type": c.engine_type,
                            "strength": c.strength,
                            "connection_type": c.connection_type,
                            "evidence": c.evidence,
                            "user_validated": true,
                        })).collect::<Vec<_>>(),
                    });
                    let backup_path = corpus_storage::object_store::document_path(
                        &source_document.user_id,
                        &document_id.to_string(),
                        &format!("validated-connections-{}.json", chrono::Utc::now().timestamp()),
                    );
                    store
                        .write(&backup_path, serde_json::to_vec_pretty(&backup_json).unwrap_or_default().as_slice())
                        .await?;
                }
            }
            corpus_storage::db::connections::delete_for_source_document(pool, &document_id.to_string(), true).await?;
        } else {
            corpus_storage::db::connections::delete_for_source_document(pool, &document_id.to_string(), false)
                .await?;
        }
    } else if let ReprocessMode::All = input.mode {
        corpus_storage::db::connections::delete_for_source_document(pool, &document_id.to_string(), false).await?;
    }

    let source_chunks = source_rows.iter().map(chunk_row_to_view).collect::<Result<Vec<_>>>()?;
    let candidate_pool = candidate_rows.iter().map(chunk_row_to_view).collect::<Result<Vec<_>>>()?;

    let connections = orchestrator
        .run_selected(
            document_id,
            &source_chunks,
            &candidate_pool,
            orchestrator_config,
            enabled_engines.as_deref(),
            &NoopProgressSink,
        )
        .await
        .map_err(EngineRuntimeError::Connection)?;

    let count = connections.len();
    for conn in connections {
        persist_connection(pool, conn).await?;
    }
    Ok(count)
}

/// Runs `enrich_chunks`/`enrich_and_connect` (§6): re-enriches a specific
/// set of chunks on demand rather than as part of a full `process_document`
/// run, optionally chaining a `detect_connections` job afterward the same
/// way stage 10 of `run` does. Chunks are re-enriched even if they already
/// carry enrichment data — this is an explicit refresh, not a skip-if-done.
#[instrument(skip(deps))]
pub async fn run_enrich_chunks(
    deps: &PipelineDeps,
    document_id: Uuid,
    chunk_ids: &[Uuid],
    chain_connections: bool,
) -> Result<usize> {
    let pool = &deps.pool;
    let source_document = documents::get(pool, &document_id.to_string()).await?;
    let enricher = ChunkEnricher::new(forward_enrichment_provider(deps.enrichment_provider.clone()), deps.max_enrichment_attempts);

    let mut enriched_count = 0;
    for chunk_id in chunk_ids {
        let row = chunks::get_by_id(pool, &chunk_id.to_string()).await?;
        let response = enricher.enrich(&row.content).await;
        chunks::update_enrichment(
            pool,
            &row.id,
            &serde_json::to_string(&response.themes).map_err(|e| EngineRuntimeError::Portability(e.to_string()))?,
            Some(response.importance_score),
            Some(&response.summary),
            Some(
                &serde_json::to_string(&response.emotional_metadata)
                    .map_err(|e| EngineRuntimeError::Portability(e.to_string()))?,
            ),
            Some(
                &serde_json::to_string(&response.conceptual_metadata)
                    .map_err(|e| EngineRuntimeError::Portability(e.to_string()))?,
            ),
            Some(
                &serde_json::to_string(&response.domain_metadata)
                    .map_err(|e| EngineRuntimeError::Portability(e.to_string()))?,
            ),
            row.metadata_overlap_count,
            row.metadata_confidence.as_deref().unwrap_or("low"),
            row.metadata_interpolated != 0,
        )
        .await?;
        enriched_count += 1;
    }

    publish(
        &deps.events,
        StageEvent::Diagnostic {
            job_id: None,
            scope: "enrich_chunks".to_string(),
            message: format!("re-enriched {enriched_count} chunk(s) for document {document_id}"),
        },
    );

    if chain_connections {
        let payload = serde_json::to_string(&crate::jobs::model::DetectConnectionsInput {
            document_id,
            target_document_ids: None,
            enabled_engines: None,
        })
        .map_err(|e| EngineRuntimeError::Portability(e.to_string()))?;
        queue::enqueue(
            pool,
            crate::jobs::JobType::DetectConnections,
            Some(document_id),
            &source_document.user_id,
            payload,
            3,
        )
        .await?;
    }

    Ok(enriched_count)
}

/// Wraps an `Arc<dyn EnrichmentProvider>` behind the owned
/// `Box<dyn EnrichmentProvider>` [`ChunkEnricher::new`] expects — the same
/// forwarding shape [`dyn_enrichment_provider`] uses for [`PipelineDeps`].
fn forward_enrichment_provider(provider: Arc<dyn EnrichmentProvider>) -> Box<dyn EnrichmentProvider> {
    struct Forward(Arc<dyn EnrichmentProvider>);
    #[async_trait::async_trait]
    impl EnrichmentProvider for Forward {
        async fn enrich(&self, chunk_content: &str) -> corpus_ingest::Result<corpus_ingest::enrich::EnrichmentResponse> {
            self.0.enrich(chunk_content).await
        }
    }
    Box::new(Forward(provider))
}
