//! `background_jobs` table repository — the durable job queue.
//!
//! [`claim_next`] is the one method that must be atomic under concurrent
//! workers: two workers racing to claim the same pending job must not both
//! win. SQLite gets there with a `BEGIN IMMEDIATE` write-lock (mirroring
//! `weavegraph::runtimes::checkpointer_sqlite`'s transaction-per-save
//! idiom); Postgres gets there with `SELECT ... FOR UPDATE SKIP LOCKED`
//! feeding an `UPDATE ... RETURNING`, which lets multiple workers claim
//! distinct jobs in parallel without blocking on each other.

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use super::models::JobRow;
use super::DbPool;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: String,
    pub document_id: Option<String>,
    pub user_id: String,
    pub input_data: String,
    pub max_retries: i64,
}

#[instrument(skip(pool, job))]
pub async fn enqueue(pool: &DbPool, job: NewJob) -> Result<JobRow> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                r#"INSERT INTO background_jobs
                   (id, job_type, status, document_id, user_id, input_data, max_retries, created_at, updated_at)
                   VALUES (?1,?2,'pending',?3,?4,?5,?6,?7,?7)"#,
            )
            .bind(&id)
            .bind(&job.job_type)
            .bind(&job.document_id)
            .bind(&job.user_id)
            .bind(&job.input_data)
            .bind(job.max_retries)
            .bind(&now)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                r#"INSERT INTO background_jobs
                   (id, job_type, status, document_id, user_id, input_data, max_retries, created_at, updated_at)
                   VALUES ($1,$2,'pending',$3,$4,$5,$6,$7,$7)"#,
            )
            .bind(&id)
            .bind(&job.job_type)
            .bind(&job.document_id)
            .bind(&job.user_id)
            .bind(&job.input_data)
            .bind(job.max_retries)
            .bind(&now)
            .execute(p)
            .await?;
        }
    }
    get(pool, &id).await
}

#[instrument(skip(pool))]
pub async fn get(pool: &DbPool, id: &str) -> Result<JobRow> {
    let row = match pool {
        DbPool::Sqlite(p) => {
            sqlx::query_as::<_, JobRow>("SELECT * FROM background_jobs WHERE id = ?1")
                .bind(id)
                .fetch_one(p)
                .await?
        }
        DbPool::Postgres(p) => {
            sqlx::query_as::<_, JobRow>("SELECT * FROM background_jobs WHERE id = $1")
                .bind(id)
                .fetch_one(p)
                .await?
        }
    };
    Ok(row)
}

/// Atomically claims the oldest eligible pending job and marks it
/// `processing`. Returns `None` if the queue is empty.
#[instrument(skip(pool))]
pub async fn claim_next(pool: &DbPool, job_type: Option<&str>) -> Result<Option<JobRow>> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            let mut tx = p.begin().await?;
            sqlx::query("BEGIN IMMEDIATE").execute(&mut *tx).await.ok();

            let candidate: Option<JobRow> = if let Some(jt) = job_type {
                sqlx::query_as::<_, JobRow>(
                    r#"SELECT * FROM background_jobs
                       WHERE status = 'pending' AND job_type = ?1
                         AND (next_retry_at IS NULL OR next_retry_at <= ?2)
                       ORDER BY created_at ASC LIMIT 1"#,
                )
                .bind(jt)
                .bind(&now)
                .fetch_optional(&mut *tx)
                .await?
            } else {
                sqlx::query_as::<_, JobRow>(
                    r#"SELECT * FROM background_jobs
                       WHERE status = 'pending'
                         AND (next_retry_at IS NULL OR next_retry_at <= ?1)
                       ORDER BY created_at ASC LIMIT 1"#,
                )
                .bind(&now)
                .fetch_optional(&mut *tx)
                .await?
            };

            let Some(job) = candidate else {
                tx.commit().await?;
                return Ok(None);
            };

            sqlx::query(
                "UPDATE background_jobs SET status = 'processing', started_at = ?1, updated_at = ?1 WHERE id = ?2",
            )
            .bind(&now)
            .bind(&job.id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(Some(get(pool, &job.id).await?))
        }
        DbPool::Postgres(p) => {
            let row = if let Some(jt) = job_type {
                sqlx::query_as::<_, JobRow>(
                    r#"UPDATE background_jobs SET status = 'processing', started_at = $1, updated_at = $1
                       WHERE id = (
                         SELECT id FROM background_jobs
                         WHERE status = 'pending' AND job_type = $2
                           AND (next_retry_at IS NULL OR next_retry_at <= $1)
                         ORDER BY created_at ASC
                         FOR UPDATE SKIP LOCKED
                         LIMIT 1
                       )
                       RETURNING *"#,
                )
                .bind(&now)
                .bind(jt)
                .fetch_optional(p)
                .await?
            } else {
                sqlx::query_as::<_, JobRow>(
                    r#"UPDATE background_jobs SET status = 'processing', started_at = $1, updated_at = $1
                       WHERE id = (
                         SELECT id FROM background_jobs
                         WHERE status = 'pending'
                           AND (next_retry_at IS NULL OR next_retry_at <= $1)
                         ORDER BY created_at ASC
                         FOR UPDATE SKIP LOCKED
                         LIMIT 1
                       )
                       RETURNING *"#,
                )
                .bind(&now)
                .fetch_optional(p)
                .await?
            };
            Ok(row)
        }
    }
}

/// Worker heartbeat — bumps `updated_at` so a stalled worker (no heartbeat
/// within the timeout window) can be detected by `list_stalled`.
#[instrument(skip(pool))]
pub async fn heartbeat(pool: &DbPool, id: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query("UPDATE background_jobs SET updated_at = ?1 WHERE id = ?2")
                .bind(&now)
                .bind(id)
                .execute(p)
                .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query("UPDATE background_jobs SET updated_at = $1 WHERE id = $2")
                .bind(&now)
                .bind(id)
                .execute(p)
                .await?;
        }
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn update_progress(
    pool: &DbPool,
    id: &str,
    percent: f64,
    stage: &str,
    details: Option<&str>,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                "UPDATE background_jobs SET progress_percent = ?1, progress_stage = ?2, progress_details = ?3, updated_at = ?4 WHERE id = ?5",
            )
            .bind(percent)
            .bind(stage)
            .bind(details)
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                "UPDATE background_jobs SET progress_percent = $1, progress_stage = $2, progress_details = $3, updated_at = $4 WHERE id = $5",
            )
            .bind(percent)
            .bind(stage)
            .bind(details)
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
    }
    Ok(())
}

/// Records a pause-safe checkpoint location for resume.
#[instrument(skip(pool))]
pub async fn save_checkpoint_pointer(
    pool: &DbPool,
    id: &str,
    path: &str,
    stage: &str,
    hash: &str,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                r#"UPDATE background_jobs SET
                     last_checkpoint_path = ?1, last_checkpoint_stage = ?2, checkpoint_hash = ?3,
                     checkpoint_can_resume = 1, updated_at = ?4
                   WHERE id = ?5"#,
            )
            .bind(path)
            .bind(stage)
            .bind(hash)
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                r#"UPDATE background_jobs SET
                     last_checkpoint_path = $1, last_checkpoint_stage = $2, checkpoint_hash = $3,
                     checkpoint_can_resume = 1, updated_at = $4
                   WHERE id = $5"#,
            )
            .bind(path)
            .bind(stage)
            .bind(hash)
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn mark_completed(pool: &DbPool, id: &str, output_data: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                "UPDATE background_jobs SET status = 'completed', output_data = ?1, progress_percent = 100.0, updated_at = ?2 WHERE id = ?3",
            )
            .bind(output_data)
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                "UPDATE background_jobs SET status = 'completed', output_data = $1, progress_percent = 100.0, updated_at = $2 WHERE id = $3",
            )
            .bind(output_data)
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
    }
    Ok(())
}

/// Schedules a retry: increments `retry_count`, sets `next_retry_at` and
/// returns to `pending`, or flips to `failed` once `max_retries` is
/// exhausted.
#[instrument(skip(pool))]
pub async fn schedule_retry_or_fail(
    pool: &DbPool,
    id: &str,
    error_message: &str,
    delay_minutes: i64,
) -> Result<()> {
    let job = get(pool, id).await?;
    let now = Utc::now();
    let retry_count = job.retry_count + 1;
    let (status, next_retry_at) = if retry_count > job.max_retries {
        ("failed".to_string(), None)
    } else {
        (
            "pending".to_string(),
            Some((now + chrono::Duration::minutes(delay_minutes)).to_rfc3339()),
        )
    };
    let now_str = now.to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                r#"UPDATE background_jobs SET
                     status = ?1, retry_count = ?2, next_retry_at = ?3, error_message = ?4, updated_at = ?5
                   WHERE id = ?6"#,
            )
            .bind(&status)
            .bind(retry_count)
            .bind(&next_retry_at)
            .bind(error_message)
            .bind(&now_str)
            .bind(id)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                r#"UPDATE background_jobs SET
                     status = $1, retry_count = $2, next_retry_at = $3, error_message = $4, updated_at = $5
                   WHERE id = $6"#,
            )
            .bind(&status)
            .bind(retry_count)
            .bind(&next_retry_at)
            .bind(error_message)
            .bind(&now_str)
            .bind(id)
            .execute(p)
            .await?;
        }
    }
    Ok(())
}

/// Marks a job `failed` immediately, bypassing retry (permanent errors).
#[instrument(skip(pool))]
pub async fn mark_failed_permanent(pool: &DbPool, id: &str, error_message: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                "UPDATE background_jobs SET status = 'failed', error_message = ?1, updated_at = ?2 WHERE id = ?3",
            )
            .bind(error_message)
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                "UPDATE background_jobs SET status = 'failed', error_message = $1, updated_at = $2 WHERE id = $3",
            )
            .bind(error_message)
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn pause(pool: &DbPool, id: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                "UPDATE background_jobs SET status = 'paused', paused_at = ?1, updated_at = ?1 WHERE id = ?2",
            )
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                "UPDATE background_jobs SET status = 'paused', paused_at = $1, updated_at = $1 WHERE id = $2",
            )
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn resume(pool: &DbPool, id: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query(
                "UPDATE background_jobs SET status = 'pending', resumed_at = ?1, resume_count = resume_count + 1, updated_at = ?1 WHERE id = ?2",
            )
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query(
                "UPDATE background_jobs SET status = 'pending', resumed_at = $1, resume_count = resume_count + 1, updated_at = $1 WHERE id = $2",
            )
            .bind(&now)
            .bind(id)
            .execute(p)
            .await?;
        }
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn cancel(pool: &DbPool, id: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query("UPDATE background_jobs SET status = 'cancelled', updated_at = ?1 WHERE id = ?2")
                .bind(&now)
                .bind(id)
                .execute(p)
                .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query("UPDATE background_jobs SET status = 'cancelled', updated_at = $1 WHERE id = $2")
                .bind(&now)
                .bind(id)
                .execute(p)
                .await?;
        }
    }
    Ok(())
}

/// Returns a stalled job to `pending` without counting it against
/// `retry_count` — a crashed worker isn't the job's fault.
#[instrument(skip(pool))]
pub async fn reset_stalled_to_pending(pool: &DbPool, id: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => {
            sqlx::query("UPDATE background_jobs SET status = 'pending', updated_at = ?1 WHERE id = ?2")
                .bind(&now)
                .bind(id)
                .execute(p)
                .await?;
        }
        DbPool::Postgres(p) => {
            sqlx::query("UPDATE background_jobs SET status = 'pending', updated_at = $1 WHERE id = $2")
                .bind(&now)
                .bind(id)
                .execute(p)
                .await?;
        }
    }
    Ok(())
}

/// Jobs whose last heartbeat is older than `stalled_after_seconds` and are
/// still marked `processing` — candidates for the crash-recovery sweep.
#[instrument(skip(pool))]
pub async fn list_stalled(pool: &DbPool, stalled_after_seconds: i64) -> Result<Vec<JobRow>> {
    let cutoff = (Utc::now() - chrono::Duration::seconds(stalled_after_seconds)).to_rfc3339();
    match pool {
        DbPool::Sqlite(p) => Ok(sqlx::query_as::<_, JobRow>(
            "SELECT * FROM background_jobs WHERE status = 'processing' AND updated_at < ?1",
        )
        .bind(&cutoff)
        .fetch_all(p)
        .await?),
        DbPool::Postgres(p) => Ok(sqlx::query_as::<_, JobRow>(
            "SELECT * FROM background_jobs WHERE status = 'processing' AND updated_at < $1",
        )
        .bind(&cutoff)
        .fetch_all(p)
        .await?),
    }
}
