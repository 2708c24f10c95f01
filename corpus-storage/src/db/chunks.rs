//! `chunks` table repository (the semantic, position-reconciled chunks).
//!
//! Writes are idempotent overwrites keyed on `(document_id, chunk_index)` —
//! re-running the chunking or matching stage after a crash must replace the
//! row rather than duplicate it (SPEC_FULL.md §4.8).

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use super::models::ChunkRow;
use super::DbPool;
use crate::error::Result;

/// Fields produced by chunking + bulletproof matching, before enrichment
/// or embedding have run.
#[derive(Debug, Clone)]
pub struct NewChunk {
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
    pub position_validated: bool,
}

#[instrument(skip(pool, chunk))]
pub async fn upsert(pool: &DbPool, chunk: NewChunk) -> Result<ChunkRow> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                r#"INSERT INTO chunks
                   (id, document_id, chunk_index, content, start_offset, end_offset, word_count,
                    chunker_type, token_count, page_start, page_end, heading_path, heading_level,
                    section_marker, bboxes, position_confidence, position_method, position_validated,
                    created_at)
                   VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)
                   ON CONFLICT (document_id, chunk_index) DO UPDATE SET
                     content = excluded.content,
                     start_offset = excluded.start_offset,
                     end_offset = excluded.end_offset,
                     word_count = excluded.word_count,
                     chunker_type = excluded.chunker_type,
                     token_count = excluded.token_count,
                     page_start = excluded.page_start,
                     page_end = excluded.page_end,
                     heading_path = excluded.heading_path,
                     heading_level = excluded.heading_level,
                     section_marker = excluded.section_marker,
                     bboxes = excluded.bboxes,
                     position_confidence = excluded.position_confidence,
                     position_method = excluded.position_method,
                     position_validated = excluded.position_validated"#,
            )
            .bind(&id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.start_offset)
            .bind(chunk.end_offset)
            .bind(chunk.word_count)
            .bind(&chunk.chunker_type)
            .bind(chunk.token_count)
            .bind(chunk.page_start)
            .bind(chunk.page_end)
            .bind(&chunk.heading_path)
            .bind(chunk.heading_level)
            .bind(&chunk.section_marker)
            .bind(&chunk.bboxes)
            .bind(&chunk.position_confidence)
            .bind(&chunk.position_method)
            .bind(chunk.position_validated as i64)
            .bind(&now)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                r#"INSERT INTO chunks
                   (id, document_id, chunk_index, content, start_offset, end_offset, word_count,
                    chunker_type, token_count, page_start, page_end, heading_path, heading_level,
                    section_marker, bboxes, position_confidence, position_method, position_validated,
                    created_at)
                   VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
                   ON CONFLICT (document_id, chunk_index) DO UPDATE SET
                     content = excluded.content,
                     start_offset = excluded.start_offset,
                     end_offset = excluded.end_offset,
                     word_count = excluded.word_count,
                     chunker_type = excluded.chunker_type,
                     token_count = excluded.token_count,
                     page_start = excluded.page_start,
                     page_end = excluded.page_end,
                     heading_path = excluded.heading_path,
                     heading_level = excluded.heading_level,
                     section_marker = excluded.section_marker,
                     bboxes = excluded.bboxes,
                     position_confidence = excluded.position_confidence,
                     position_method = excluded.position_method,
                     position_validated = excluded.position_validated"#,
            )
            .bind(&id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.start_offset)
            .bind(chunk.end_offset)
            .bind(chunk.word_count)
            .bind(&chunk.chunker_type)
            .bind(chunk.token_count)
            .bind(chunk.page_start)
            .bind(chunk.page_end)
            .bind(&chunk.heading_path)
            .bind(chunk.heading_level)
            .bind(&chunk.section_marker)
            .bind(&chunk.bboxes)
            .bind(&chunk.position_confidence)
            .bind(&chunk.position_method)
            .bind(chunk.position_validated as i64)
            .bind(&now)
            .execute(p)
            .await?;
        }
    }
    get_by_document_and_index(pool, &chunk.document_id, chunk.chunk_index).await
}

#[instrument(skip(pool))]
pub async fn get_by_document_and_index(
    pool: &DbPool,
    document_id: &str,
    chunk_index: i64,
) -> Result<ChunkRow> {
    let row = match pool {
        DbPool::Sqlite(p) => {
            sqlx::query_as::<_, ChunkRow>(
                "SELECT * FROM chunks WHERE document_id = ?1 AND chunk_index = ?2",
            )
            .bind(document_id)
            .bind(chunk_index)
            .fetch_one(p)
            .await?
        }
        DbPool::Postgres(p) => {
            sqlx::query_as::<_, ChunkRow>(
                "SELECT * FROM chunks WHERE document_id = $1 AND chunk_index = $2",
            )
            .bind(document_id)
            .bind(chunk_index)
            .fetch_one(p)
            .await?
        }
    };
    Ok(row)
}

#[instrument(skip(pool))]
pub async fn list_for_document(pool: &DbPool, document_id: &str) -> Result<Vec<ChunkRow>> {
    match pool {
        DbPool::Sqlite(p) => Ok(sqlx::query_as::<_, ChunkRow>(
            "SELECT * FROM chunks WHERE document_id = ?1 ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .fetch_all(p)
        .await?),
        DbPool::Postgres(p) => Ok(sqlx::query_as::<_, ChunkRow>(
            "SELECT * FROM chunks WHERE document_id = $1 ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .fetch_all(p)
        .await?),
    }
}

/// Deletes every chunk for a document (import `replace` mode's teardown
/// before re-inserting from `chunks.json`).
#[instrument(skip(pool))]
pub async fn delete_for_document(pool: &DbPool, document_id: &str) -> Result<u64> {
    let affected = match pool {
        DbPool::Sqlite(p) => {
            sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
                .bind(document_id)
                .execute(p)
                .await?
                .rows_affected()
        }
        DbPool::Postgres(p) => {
            sqlx::query("DELETE FROM chunks WHERE document_id = $1")
                .bind(document_id)
                .execute(p)
                .await?
                .rows_affected()
        }
    };
    Ok(affected)
}

/// Deletes one chunk by id (import `merge_smart` mode removing chunks no
/// longer present in the incoming `chunks.json`).
#[instrument(skip(pool))]
pub async fn delete_by_id(pool: &DbPool, chunk_id: &str) -> Result<()> {
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query("DELETE FROM chunks WHERE id = ?1").bind(chunk_id).execute(p).await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query("DELETE FROM chunks WHERE id = $1").bind(chunk_id).execute(p).await?;
        }
    }
    Ok(())
}

/// Inserts or replaces a chunk with a caller-supplied id, preserving it
/// verbatim (import's UUID-preservation rule, SPEC_FULL.md §4.7).
#[instrument(skip(pool, chunk))]
pub async fn upsert_with_id(pool: &DbPool, id: &str, chunk: NewChunk) -> Result<ChunkRow> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                r#"INSERT INTO chunks
                   (id, document_id, chunk_index, content, start_offset, end_offset, word_count,
                    chunker_type, token_count, page_start, page_end, heading_path, heading_level,
                    section_marker, bboxes, position_confidence, position_method, position_validated,
                    created_at)
                   VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)
                   ON CONFLICT (id) DO UPDATE SET
                     chunk_index = excluded.chunk_index, content = excluded.content,
                     start_offset = excluded.start_offset, end_offset = excluded.end_offset,
                     word_count = excluded.word_count, chunker_type = excluded.chunker_type,
                     token_count = excluded.token_count, page_start = excluded.page_start,
                     page_end = excluded.page_end, heading_path = excluded.heading_path,
                     heading_level = excluded.heading_level, section_marker = excluded.section_marker,
                     bboxes = excluded.bboxes, position_confidence = excluded.position_confidence,
                     position_method = excluded.position_method, position_validated = excluded.position_validated"#,
            )
            .bind(id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.start_offset)
            .bind(chunk.end_offset)
            .bind(chunk.word_count)
            .bind(&chunk.chunker_type)
            .bind(chunk.token_count)
            .bind(chunk.page_start)
            .bind(chunk.page_end)
            .bind(&chunk.heading_path)
            .bind(chunk.heading_level)
            .bind(&chunk.section_marker)
            .bind(&chunk.bboxes)
            .bind(&chunk.position_confidence)
            .bind(&chunk.position_method)
            .bind(chunk.position_validated as i64)
            .bind(&now)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                r#"INSERT INTO chunks
                   (id, document_id, chunk_index, content, start_offset, end_offset, word_count,
                    chunker_type, token_count, page_start, page_end, heading_path, heading_level,
                    section_marker, bboxes, position_confidence, position_method, position_validated,
                    created_at)
                   VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
                   ON CONFLICT (id) DO UPDATE SET
                     chunk_index = excluded.chunk_index, content = excluded.content,
                     start_offset = excluded.start_offset, end_offset = excluded.end_offset,
                     word_count = excluded.word_count, chunker_type = excluded.chunker_type,
                     token_count = excluded.token_count, page_start = excluded.page_start,
                     page_end = excluded.page_end, heading_path = excluded.heading_path,
                     heading_level = excluded.heading_level, section_marker = excluded.section_marker,
                     bboxes = excluded.bboxes, position_confidence = excluded.position_confidence,
                     position_method = excluded.position_method, position_validated = excluded.position_validated"#,
            )
            .bind(id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.start_offset)
            .bind(chunk.end_offset)
            .bind(chunk.word_count)
            .bind(&chunk.chunker_type)
            .bind(chunk.token_count)
            .bind(chunk.page_start)
            .bind(chunk.page_end)
            .bind(&chunk.heading_path)
            .bind(chunk.heading_level)
            .bind(&chunk.section_marker)
            .bind(&chunk.bboxes)
            .bind(&chunk.position_confidence)
            .bind(&chunk.position_method)
            .bind(chunk.position_validated as i64)
            .bind(&now)
            .execute(p)
            .await?;
        }
    }
    get_by_id(pool, id).await
}

#[instrument(skip(pool))]
pub async fn get_by_id(pool: &DbPool, id: &str) -> Result<ChunkRow> {
    let row = match pool {
        DbPool::Sqlite(p) => {
            sqlx::query_as::<_, ChunkRow>("SELECT * FROM chunks WHERE id = ?1")
                .bind(id)
                .fetch_one(p)
                .await?
        }
        DbPool::Postgres(p) => {
            sqlx::query_as::<_, ChunkRow>("SELECT * FROM chunks WHERE id = $1")
                .bind(id)
                .fetch_one(p)
                .await?
        }
    };
    Ok(row)
}

/// Updates the embedding vector for a chunk (JSON-encoded float array).
#[instrument(skip(pool, embedding_json))]
pub async fn update_embedding(pool: &DbPool, chunk_id: &str, embedding_json: &str) -> Result<()> {
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query("UPDATE chunks SET embedding = ?1 WHERE id = ?2")
                .bind(embedding_json)
                .bind(chunk_id)
                .execute(p)
                .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query("UPDATE chunks SET embedding = $1 WHERE id = $2")
                .bind(embedding_json)
                .bind(chunk_id)
                .execute(p)
                .await?;
        }
    }
    Ok(())
}

/// Updates the metadata-enrichment columns for a chunk.
#[allow(clippy::too_many_arguments)]
#[instrument(skip(pool))]
pub async fn update_enrichment(
    pool: &DbPool,
    chunk_id: &str,
    themes: &str,
    importance_score: Option<f64>,
    summary: Option<&str>,
    emotional_metadata: Option<&str>,
    conceptual_metadata: Option<&str>,
    domain_metadata: Option<&str>,
    overlap_count: i64,
    confidence: &str,
    interpolated: bool,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                r#"UPDATE chunks SET
                     themes = ?1, importance_score = ?2, summary = ?3,
                     emotional_metadata = ?4, conceptual_metadata = ?5, domain_metadata = ?6,
                     metadata_extracted_at = ?7, metadata_overlap_count = ?8,
                     metadata_confidence = ?9, metadata_interpolated = ?10,
                     enrichments_detected = 1
                   WHERE id = ?11"#,
            )
            .bind(themes)
            .bind(importance_score)
            .bind(summary)
            .bind(emotional_metadata)
            .bind(conceptual_metadata)
            .bind(domain_metadata)
            .bind(&now)
            .bind(overlap_count)
            .bind(confidence)
            .bind(interpolated as i64)
            .bind(chunk_id)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                r#"UPDATE chunks SET
                     themes = $1, importance_score = $2, summary = $3,
                     emotional_metadata = $4, conceptual_metadata = $5, domain_metadata = $6,
                     metadata_extracted_at = $7, metadata_overlap_count = $8,
                     metadata_confidence = $9, metadata_interpolated = $10,
                     enrichments_detected = 1
                   WHERE id = $11"#,
            )
            .bind(themes)
            .bind(importance_score)
            .bind(summary)
            .bind(emotional_metadata)
            .bind(conceptual_metadata)
            .bind(domain_metadata)
            .bind(&now)
            .bind(overlap_count)
            .bind(confidence)
            .bind(interpolated as i64)
            .bind(chunk_id)
            .execute(p)
            .await?;
        }
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn mark_enrichment_skipped(pool: &DbPool, chunk_id: &str, reason: &str) -> Result<()> {
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query("UPDATE chunks SET enrichment_skipped_reason = ?1 WHERE id = ?2")
                .bind(reason)
                .bind(chunk_id)
                .execute(p)
                .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query("UPDATE chunks SET enrichment_skipped_reason = $1 WHERE id = $2")
                .bind(reason)
                .bind(chunk_id)
                .execute(p)
                .await?;
        }
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn mark_connections_detected(pool: &DbPool, chunk_id: &str) -> Result<()> {
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query("UPDATE chunks SET connections_detected = 1 WHERE id = ?1")
                .bind(chunk_id)
                .execute(p)
                .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query("UPDATE chunks SET connections_detected = 1 WHERE id = $1")
                .bind(chunk_id)
                .execute(p)
                .await?;
        }
    }
    Ok(())
}
