//! Metadata database (C2): documents, chunks, connections, background jobs.
//!
//! Grounded on `weavegraph::runtimes::checkpointer_sqlite` /
//! `checkpointer_postgres`: a pool wrapper connected with embedded
//! migrations (`sqlx::migrate!("./migrations")`), repository functions that
//! bind by hand rather than reaching for an ORM, and a dual SQLite/Postgres
//! backend selected at connect time by URL scheme.
//!
//! Unlike the teacher's checkpointer (one big `Checkpoint` struct per
//! backend module), each table here gets its own repository module
//! ([`documents`], [`chunks`], [`connections`], [`jobs`]) dispatching on
//! [`DbPool`] internally, since SPEC_FULL.md's data model has several
//! independent entities rather than one append-only step log.

pub mod annotations;
pub mod chunks;
pub mod connections;
pub mod documents;
pub mod jobs;
pub mod models;

use sqlx::{PgPool, SqlitePool};
use tracing::instrument;

use crate::error::{Result, StorageError};

/// Connected database pool, either backend.
///
/// Repository functions match on this enum rather than boxing a trait
/// object, since the bind-parameter syntax (`?1` vs `$1`) differs enough
/// between backends that a single trait method body can't serve both.
#[derive(Clone, Debug)]
pub enum DbPool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

impl DbPool {
    /// Connects to `database_url`, dispatching on URL scheme, and applies
    /// embedded migrations.
    ///
    /// `sqlite://...` and `sqlite::memory:` select the SQLite backend;
    /// anything starting with `postgres://` or `postgresql://` selects
    /// Postgres.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
            let pool = PgPool::connect(database_url).await?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| StorageError::Invariant(format!("postgres migration failed: {e}")))?;
            Ok(DbPool::Postgres(pool))
        } else {
            let pool = SqlitePool::connect(database_url).await?;
            sqlx::query("PRAGMA journal_mode = WAL")
                .execute(&pool)
                .await?;
            sqlx::query("PRAGMA foreign_keys = ON")
                .execute(&pool)
                .await?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| StorageError::Invariant(format!("sqlite migration failed: {e}")))?;
            Ok(DbPool::Sqlite(pool))
        }
    }

    pub fn is_postgres(&self) -> bool {
        matches!(self, DbPool::Postgres(_))
    }
}
