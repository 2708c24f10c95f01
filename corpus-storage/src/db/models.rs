//! Row DTOs shared by the repository modules.
//!
//! Kept as plain structs with `sqlx::FromRow` rather than the richer
//! in-memory types `corpus-ingest`/`corpus-engine` work with — mirrors
//! `weavegraph::runtimes::persistence`'s split between a serde-friendly
//! persisted shape and the domain type callers actually use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct DocumentRow {
    pub id: String,
    pub user_id: String,
    pub source_type: String,
    pub title: String,
    pub storage_path: String,
    pub processing_status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CachedChunkRow {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub heading_path: String,
    pub heading_level: Option<i64>,
    pub section_marker: Option<String>,
    pub page_start: Option<i64>,
    pub page_end: Option<i64>,
    pub bboxes: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ChunkRow {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub word_count: i64,
    pub chunker_type: String,
    pub token_count: i64,
    pub page_start: Option<i64>,
    pub page_end: Option<i64>,
    pub heading_path: String,
    pub heading_level: Option<i64>,
    pub section_marker: Option<String>,
    pub bboxes: String,
    pub position_confidence: String,
    pub position_method: String,
    pub position_validated: i64,
    pub themes: String,
    pub importance_score: Option<f64>,
    pub summary: Option<String>,
    pub emotional_metadata: Option<String>,
    pub conceptual_metadata: Option<String>,
    pub domain_metadata: Option<String>,
    pub metadata_extracted_at: Option<String>,
    pub metadata_overlap_count: i64,
    pub metadata_confidence: Option<String>,
    pub metadata_interpolated: i64,
    pub embedding: Option<String>,
    pub enrichments_detected: i64,
    pub enrichment_skipped_reason: Option<String>,
    pub connections_detected: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ConnectionRow {
    pub id: String,
    pub source_chunk_id: String,
    pub target_chunk_id: String,
    pub engine_type: String,
    pub strength: f64,
    pub connection_type: String,
    pub evidence: String,
    pub user_validated: i64,
    pub discovered_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct JobRow {
    pub id: String,
    pub job_type: String,
    pub status: String,
    pub document_id: Option<String>,
    pub user_id: String,
    pub input_data: String,
    pub output_data: Option<String>,
    pub progress_percent: f64,
    pub progress_stage: Option<String>,
    pub progress_details: Option<String>,
    pub checkpoint_can_resume: i64,
    pub retry_count: i64,
    pub max_retries: i64,
    pub next_retry_at: Option<String>,
    pub error_message: Option<String>,
    pub paused_at: Option<String>,
    pub resumed_at: Option<String>,
    pub resume_count: i64,
    pub last_checkpoint_path: Option<String>,
    pub last_checkpoint_stage: Option<String>,
    pub checkpoint_hash: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AnnotationRow {
    pub id: String,
    pub user_id: String,
    pub document_id: String,
    pub chunk_id: Option<String>,
    pub annotation_type: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub original_text: String,
    pub content: String,
    pub style: String,
    pub sync_status: String,
    pub sync_confidence: Option<f64>,
    pub sync_method: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub fn now_rfc3339(now: DateTime<Utc>) -> String {
    now.to_rfc3339()
}
