//! `annotations` table repository (C16): the Position-component slice of
//! the read side's entity-component records. Only what import/export
//! round-trips and what annotation recovery needs to read/write lives here
//! — content/style payloads are carried as opaque JSON, never interpreted.

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use super::models::AnnotationRow;
use super::DbPool;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub user_id: String,
    pub document_id: String,
    pub chunk_id: Option<String>,
    pub annotation_type: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub original_text: String,
    pub content: String,
    pub style: String,
}

#[instrument(skip(pool, annotation))]
pub async fn insert(pool: &DbPool, annotation: NewAnnotation) -> Result<AnnotationRow> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                r#"INSERT INTO annotations
                   (id, user_id, document_id, chunk_id, annotation_type, start_offset, end_offset,
                    original_text, content, style, sync_status, created_at, updated_at)
                   VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,'anchored',?11,?11)"#,
            )
            .bind(&id)
            .bind(&annotation.user_id)
            .bind(&annotation.document_id)
            .bind(&annotation.chunk_id)
            .bind(&annotation.annotation_type)
            .bind(annotation.start_offset)
            .bind(annotation.end_offset)
            .bind(&annotation.original_text)
            .bind(&annotation.content)
            .bind(&annotation.style)
            .bind(&now)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                r#"INSERT INTO annotations
                   (id, user_id, document_id, chunk_id, annotation_type, start_offset, end_offset,
                    original_text, content, style, sync_status, created_at, updated_at)
                   VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,'anchored',$11,$11)"#,
            )
            .bind(&id)
            .bind(&annotation.user_id)
            .bind(&annotation.document_id)
            .bind(&annotation.chunk_id)
            .bind(&annotation.annotation_type)
            .bind(annotation.start_offset)
            .bind(annotation.end_offset)
            .bind(&annotation.original_text)
            .bind(&annotation.content)
            .bind(&annotation.style)
            .bind(&now)
            .execute(p)
            .await?;
        }
    }
    get(pool, &id).await
}

#[instrument(skip(pool))]
pub async fn get(pool: &DbPool, id: &str) -> Result<AnnotationRow> {
    let row = match pool {
        DbPool::Sqlite(p) => {
            sqlx::query_as::<_, AnnotationRow>("SELECT * FROM annotations WHERE id = ?1")
                .bind(id)
                .fetch_one(p)
                .await?
        }
        DbPool::Postgres(p) => {
            sqlx::query_as::<_, AnnotationRow>("SELECT * FROM annotations WHERE id = $1")
                .bind(id)
                .fetch_one(p)
                .await?
        }
    };
    Ok(row)
}

#[instrument(skip(pool))]
pub async fn list_for_document(pool: &DbPool, document_id: &str) -> Result<Vec<AnnotationRow>> {
    match pool {
        DbPool::Sqlite(p) => Ok(sqlx::query_as::<_, AnnotationRow>(
            "SELECT * FROM annotations WHERE document_id = ?1 ORDER BY start_offset ASC",
        )
        .bind(document_id)
        .fetch_all(p)
        .await?),
        DbPool::Postgres(p) => Ok(sqlx::query_as::<_, AnnotationRow>(
            "SELECT * FROM annotations WHERE document_id = $1 ORDER BY start_offset ASC",
        )
        .bind(document_id)
        .fetch_all(p)
        .await?),
    }
}

/// Reanchors an annotation after recovery: new `chunk_id`/offsets, sync
/// bookkeeping reflecting which cascade tier found it (SPEC_FULL.md §4.7).
#[instrument(skip(pool))]
pub async fn reanchor(
    pool: &DbPool,
    id: &str,
    chunk_id: Option<&str>,
    start_offset: i64,
    end_offset: i64,
    sync_status: &str,
    sync_confidence: f64,
    sync_method: &str,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                r#"UPDATE annotations SET
                     chunk_id = ?1, start_offset = ?2, end_offset = ?3,
                     sync_status = ?4, sync_confidence = ?5, sync_method = ?6, updated_at = ?7
                   WHERE id = ?8"#,
            )
            .bind(chunk_id)
            .bind(start_offset)
            .bind(end_offset)
            .bind(sync_status)
            .bind(sync_confidence)
            .bind(sync_method)
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                r#"UPDATE annotations SET
                     chunk_id = $1, start_offset = $2, end_offset = $3,
                     sync_status = $4, sync_confidence = $5, sync_method = $6, updated_at = $7
                   WHERE id = $8"#,
            )
            .bind(chunk_id)
            .bind(start_offset)
            .bind(end_offset)
            .bind(sync_status)
            .bind(sync_confidence)
            .bind(sync_method)
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
    }
    Ok(())
}
