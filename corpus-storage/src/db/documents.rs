//! `documents` table repository.

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use super::models::DocumentRow;
use super::DbPool;
use crate::error::{Result, StorageError};

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub user_id: String,
    pub source_type: String,
    pub title: String,
    pub storage_path: String,
}

#[instrument(skip(pool))]
pub async fn insert(pool: &DbPool, doc: NewDocument) -> Result<DocumentRow> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let row = DocumentRow {
        id,
        user_id: doc.user_id,
        source_type: doc.source_type,
        title: doc.title,
        storage_path: doc.storage_path,
        processing_status: "pending".to_string(),
        created_at: now.clone(),
        updated_at: now,
    };
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                r#"INSERT INTO documents
                   (id, user_id, source_type, title, storage_path, processing_status, created_at, updated_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            )
            .bind(&row.id)
            .bind(&row.user_id)
            .bind(&row.source_type)
            .bind(&row.title)
            .bind(&row.storage_path)
            .bind(&row.processing_status)
            .bind(&row.created_at)
            .bind(&row.updated_at)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                r#"INSERT INTO documents
                   (id, user_id, source_type, title, storage_path, processing_status, created_at, updated_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
            )
            .bind(&row.id)
            .bind(&row.user_id)
            .bind(&row.source_type)
            .bind(&row.title)
            .bind(&row.storage_path)
            .bind(&row.processing_status)
            .bind(&row.created_at)
            .bind(&row.updated_at)
            .execute(p)
            .await?;
        }
    }
    Ok(row)
}

#[instrument(skip(pool))]
pub async fn get(pool: &DbPool, id: &str) -> Result<DocumentRow> {
    let row = match pool {
        DbPool::Sqlite(p) => {
            sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = ?1")
                .bind(id)
                .fetch_optional(p)
                .await?
        }
        DbPool::Postgres(p) => {
            sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = $1")
                .bind(id)
                .fetch_optional(p)
                .await?
        }
    };
    row.ok_or_else(|| StorageError::ObjectNotFound(format!("document {id}")))
}

#[instrument(skip(pool))]
pub async fn list_by_user(pool: &DbPool, user_id: &str) -> Result<Vec<DocumentRow>> {
    match pool {
        DbPool::Sqlite(p) => {
            Ok(sqlx::query_as::<_, DocumentRow>(
                "SELECT * FROM documents WHERE user_id = ?1 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(p)
            .await?)
        }
        DbPool::Postgres(p) => {
            Ok(sqlx::query_as::<_, DocumentRow>(
                "SELECT * FROM documents WHERE user_id = $1 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(p)
            .await?)
        }
    }
}

/// Reinstates a document record with a caller-supplied id (import's
/// UUID-preservation rule, SPEC_FULL.md §4.7): inserts if absent,
/// otherwise leaves the existing row's `processing_status` untouched so a
/// completed document doesn't regress to `pending` on re-import.
#[instrument(skip(pool))]
pub async fn upsert_with_id(pool: &DbPool, id: &str, doc: NewDocument) -> Result<DocumentRow> {
    if exists(pool, id).await? {
        return get(pool, id).await;
    }
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                r#"INSERT INTO documents
                   (id, user_id, source_type, title, storage_path, processing_status, created_at, updated_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, 'completed', ?6, ?6)"#,
            )
            .bind(id)
            .bind(&doc.user_id)
            .bind(&doc.source_type)
            .bind(&doc.title)
            .bind(&doc.storage_path)
            .bind(&now)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                r#"INSERT INTO documents
                   (id, user_id, source_type, title, storage_path, processing_status, created_at, updated_at)
                   VALUES ($1, $2, $3, $4, $5, 'completed', $6, $6)"#,
            )
            .bind(id)
            .bind(&doc.user_id)
            .bind(&doc.source_type)
            .bind(&doc.title)
            .bind(&doc.storage_path)
            .bind(&now)
            .execute(p)
            .await?;
        }
    }
    get(pool, id).await
}

#[instrument(skip(pool))]
pub async fn exists(pool: &DbPool, id: &str) -> Result<bool> {
    let row: Option<(i64,)> = match pool {
        DbPool::Sqlite(p) => {
            sqlx::query_as("SELECT 1 FROM documents WHERE id = ?1")
                .bind(id)
                .fetch_optional(p)
                .await?
        }
        DbPool::Postgres(p) => {
            sqlx::query_as("SELECT 1 FROM documents WHERE id = $1")
                .bind(id)
                .fetch_optional(p)
                .await?
        }
    };
    Ok(row.is_some())
}

#[instrument(skip(pool))]
pub async fn update_status(pool: &DbPool, id: &str, status: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query("UPDATE documents SET processing_status = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(status)
                .bind(&now)
                .bind(id)
                .execute(p)
                .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query("UPDATE documents SET processing_status = $1, updated_at = $2 WHERE id = $3")
                .bind(status)
                .bind(&now)
                .bind(id)
                .execute(p)
                .await?;
        }
    }
    Ok(())
}
