//! `connections` table repository.
//!
//! `(source_chunk_id, target_chunk_id, engine_type)` is unique — inserting a
//! connection the orchestrator already recorded is a no-op overwrite rather
//! than a duplicate row, matching the dedupe-by-`(source, target, type)`
//! rule in SPEC_FULL.md §4.6.

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use super::models::ConnectionRow;
use super::DbPool;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct NewConnection {
    pub source_chunk_id: String,
    pub target_chunk_id: String,
    pub engine_type: String,
    pub strength: f64,
    pub connection_type: String,
    pub evidence: String,
}

#[instrument(skip(pool, conn))]
pub async fn upsert(pool: &DbPool, conn: NewConnection) -> Result<ConnectionRow> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                r#"INSERT INTO connections
                   (id, source_chunk_id, target_chunk_id, engine_type, strength, connection_type, evidence, discovered_at)
                   VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
                   ON CONFLICT (source_chunk_id, target_chunk_id, engine_type) DO UPDATE SET
                     strength = excluded.strength,
                     connection_type = excluded.connection_type,
                     evidence = excluded.evidence"#,
            )
            .bind(&id)
            .bind(&conn.source_chunk_id)
            .bind(&conn.target_chunk_id)
            .bind(&conn.engine_type)
            .bind(conn.strength)
            .bind(&conn.connection_type)
            .bind(&conn.evidence)
            .bind(&now)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                r#"INSERT INTO connections
                   (id, source_chunk_id, target_chunk_id, engine_type, strength, connection_type, evidence, discovered_at)
                   VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
                   ON CONFLICT (source_chunk_id, target_chunk_id, engine_type) DO UPDATE SET
                     strength = excluded.strength,
                     connection_type = excluded.connection_type,
                     evidence = excluded.evidence"#,
            )
            .bind(&id)
            .bind(&conn.source_chunk_id)
            .bind(&conn.target_chunk_id)
            .bind(&conn.engine_type)
            .bind(conn.strength)
            .bind(&conn.connection_type)
            .bind(&conn.evidence)
            .bind(&now)
            .execute(p)
            .await?;
        }
    }
    match pool {
        DbPool::Sqlite(p) => Ok(sqlx::query_as::<_, ConnectionRow>(
            "SELECT * FROM connections WHERE source_chunk_id = ?1 AND target_chunk_id = ?2 AND engine_type = ?3",
        )
        .bind(&conn.source_chunk_id)
        .bind(&conn.target_chunk_id)
        .bind(&conn.engine_type)
        .fetch_one(p)
        .await?),
        DbPool::Postgres(p) => Ok(sqlx::query_as::<_, ConnectionRow>(
            "SELECT * FROM connections WHERE source_chunk_id = $1 AND target_chunk_id = $2 AND engine_type = $3",
        )
        .bind(&conn.source_chunk_id)
        .bind(&conn.target_chunk_id)
        .bind(&conn.engine_type)
        .fetch_one(p)
        .await?),
    }
}

#[instrument(skip(pool))]
pub async fn list_for_chunk(pool: &DbPool, chunk_id: &str) -> Result<Vec<ConnectionRow>> {
    match pool {
        DbPool::Sqlite(p) => Ok(sqlx::query_as::<_, ConnectionRow>(
            "SELECT * FROM connections WHERE source_chunk_id = ?1 OR target_chunk_id = ?1 ORDER BY strength DESC",
        )
        .bind(chunk_id)
        .fetch_all(p)
        .await?),
        DbPool::Postgres(p) => Ok(sqlx::query_as::<_, ConnectionRow>(
            "SELECT * FROM connections WHERE source_chunk_id = $1 OR target_chunk_id = $1 ORDER BY strength DESC",
        )
        .bind(chunk_id)
        .fetch_all(p)
        .await?),
    }
}

/// Every connection touching a chunk of `document_id`, for export
/// (SPEC_FULL.md §4.7's `connections.json`).
#[instrument(skip(pool))]
pub async fn list_for_document(pool: &DbPool, document_id: &str) -> Result<Vec<ConnectionRow>> {
    match pool {
        DbPool::Sqlite(p) => Ok(sqlx::query_as::<_, ConnectionRow>(
            r#"SELECT c.* FROM connections c
               WHERE c.source_chunk_id IN (SELECT id FROM chunks WHERE document_id = ?1)
                  OR c.target_chunk_id IN (SELECT id FROM chunks WHERE document_id = ?1)
               ORDER BY c.strength DESC"#,
        )
        .bind(document_id)
        .fetch_all(p)
        .await?),
        DbPool::Postgres(p) => Ok(sqlx::query_as::<_, ConnectionRow>(
            r#"SELECT c.* FROM connections c
               WHERE c.source_chunk_id IN (SELECT id FROM chunks WHERE document_id = $1)
                  OR c.target_chunk_id IN (SELECT id FROM chunks WHERE document_id = $1)
               ORDER BY c.strength DESC"#,
        )
        .bind(document_id)
        .fetch_all(p)
        .await?),
    }
}

/// Connections whose source chunk belongs to `document_id` and are flagged
/// `user_validated` — the set `reprocess_connections(mode=smart,
/// preserveValidated=true)` backs up before deleting the rest.
#[instrument(skip(pool))]
pub async fn list_validated_for_source_document(pool: &DbPool, document_id: &str) -> Result<Vec<ConnectionRow>> {
    match pool {
        DbPool::Sqlite(p) => Ok(sqlx::query_as::<_, ConnectionRow>(
            r#"SELECT * FROM connections
               WHERE source_chunk_id IN (SELECT id FROM chunks WHERE document_id = ?1)
                 AND user_validated != 0
               ORDER BY strength DESC"#,
        )
        .bind(document_id)
        .fetch_all(p)
        .await?),
        DbPool::Postgres(p) => Ok(sqlx::query_as::<_, ConnectionRow>(
            r#"SELECT * FROM connections
               WHERE source_chunk_id IN (SELECT id FROM chunks WHERE document_id = $1)
                 AND user_validated != 0
               ORDER BY strength DESC"#,
        )
        .bind(document_id)
        .fetch_all(p)
        .await?),
    }
}

/// Deletes connections whose source chunk belongs to `document_id`.
/// `reprocess_connections` uses this before re-running engines; when
/// `keep_validated` is set, `user_validated` rows survive the purge.
#[instrument(skip(pool))]
pub async fn delete_for_source_document(pool: &DbPool, document_id: &str, keep_validated: bool) -> Result<()> {
    match pool {
        DbPool::Sqlite(p) => {
            if keep_validated {
                sqlx::query(
                    r#"DELETE FROM connections
                       WHERE source_chunk_id IN (SELECT id FROM chunks WHERE document_id = ?1)
                         AND user_validated = 0"#,
                )
                .bind(document_id)
                .execute(p)
                .await?;
            } else {
                sqlx::query(
                    "DELETE FROM connections WHERE source_chunk_id IN (SELECT id FROM chunks WHERE document_id = ?1)",
                )
                .bind(document_id)
                .execute(p)
                .await?;
            }
        }
        DbPool::Postgres(p) => {
            if keep_validated {
                sqlx::query(
                    r#"DELETE FROM connections
                       WHERE source_chunk_id IN (SELECT id FROM chunks WHERE document_id = $1)
                         AND user_validated = 0"#,
                )
                .bind(document_id)
                .execute(p)
                .await?;
            } else {
                sqlx::query(
                    "DELETE FROM connections WHERE source_chunk_id IN (SELECT id FROM chunks WHERE document_id = $1)",
                )
                .bind(document_id)
                .execute(p)
                .await?;
            }
        }
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn set_validated(pool: &DbPool, connection_id: &str, validated: bool) -> Result<()> {
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query("UPDATE connections SET user_validated = ?1 WHERE id = ?2")
                .bind(validated as i64)
                .bind(connection_id)
                .execute(p)
                .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query("UPDATE connections SET user_validated = $1 WHERE id = $2")
                .bind(validated as i64)
                .bind(connection_id)
                .execute(p)
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::chunks::{self, NewChunk};
    use crate::db::documents::{self, NewDocument};

    async fn two_chunks(pool: &DbPool) -> (String, String) {
        let document = documents::insert(
            pool,
            NewDocument {
                user_id: "alice".to_string(),
                source_type: "markdown".to_string(),
                title: "Notes".to_string(),
                storage_path: "alice/doc/content.md".to_string(),
            },
        )
        .await
        .unwrap();
        let new_chunk = |index: i64, content: &str| NewChunk {
            document_id: document.id.clone(),
            chunk_index: index,
            content: content.to_string(),
            start_offset: 0,
            end_offset: content.len() as i64,
            word_count: 2,
            chunker_type: "docling".to_string(),
            token_count: 3,
            page_start: Some(1),
            page_end: Some(1),
            heading_path: "[]".to_string(),
            heading_level: None,
            section_marker: None,
            bboxes: "[]".to_string(),
            position_confidence: "exact".to_string(),
            position_method: "direct".to_string(),
            position_validated: true,
        };
        let a = chunks::upsert(pool, new_chunk(0, "alpha")).await.unwrap();
        let b = chunks::upsert(pool, new_chunk(1, "beta")).await.unwrap();
        (a.id, b.id)
    }

    /// Property 6: re-discovering the same (source, target, engine_type)
    /// tuple overwrites the row in place rather than inserting a duplicate.
    #[tokio::test]
    async fn repeated_upsert_of_the_same_pair_never_duplicates_a_row() {
        let pool = DbPool::connect("sqlite::memory:").await.unwrap();
        let (source_id, target_id) = two_chunks(&pool).await;

        upsert(
            &pool,
            NewConnection {
                source_chunk_id: source_id.clone(),
                target_chunk_id: target_id.clone(),
                engine_type: "semantic_similarity".to_string(),
                strength: 0.4,
                connection_type: "similar".to_string(),
                evidence: "first pass".to_string(),
            },
        )
        .await
        .unwrap();
        upsert(
            &pool,
            NewConnection {
                source_chunk_id: source_id.clone(),
                target_chunk_id: target_id.clone(),
                engine_type: "semantic_similarity".to_string(),
                strength: 0.9,
                connection_type: "similar".to_string(),
                evidence: "rerun with a stronger match".to_string(),
            },
        )
        .await
        .unwrap();

        let rows = list_for_chunk(&pool, &source_id).await.unwrap();
        assert_eq!(rows.len(), 1, "duplicate (source, target, engine_type) tuples must collapse into one row");
        assert_eq!(rows[0].strength, 0.9);
    }

    #[tokio::test]
    async fn distinct_engine_types_for_the_same_pair_coexist() {
        let pool = DbPool::connect("sqlite::memory:").await.unwrap();
        let (source_id, target_id) = two_chunks(&pool).await;

        for engine_type in ["semantic_similarity", "contradiction_detection"] {
            upsert(
                &pool,
                NewConnection {
                    source_chunk_id: source_id.clone(),
                    target_chunk_id: target_id.clone(),
                    engine_type: engine_type.to_string(),
                    strength: 0.5,
                    connection_type: "similar".to_string(),
                    evidence: "evidence".to_string(),
                },
            )
            .await
            .unwrap();
        }

        let rows = list_for_chunk(&pool, &source_id).await.unwrap();
        assert_eq!(rows.len(), 2, "distinct engine_type values are not deduped against each other");
    }
}
