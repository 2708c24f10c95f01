//! Public job-queue operations (§4.1): a typed, `JobType`-aware layer
//! atop `corpus_storage::db::jobs`, which already owns the atomic
//! claim/heartbeat/checkpoint SQL. Nothing here touches SQL directly.

use tracing::instrument;
use uuid::Uuid;

use corpus_storage::db::jobs::{self, NewJob};
use corpus_storage::db::models::JobRow;
use corpus_storage::DbPool;

use crate::error::{EngineRuntimeError, Result};
use crate::jobs::model::JobType;

/// A claimed job with its `job_type` already validated, ready for
/// dispatch to a handler.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub job_type: JobType,
    pub document_id: Option<Uuid>,
    pub input_data: String,
    pub retry_count: i64,
    pub max_retries: i64,
    /// The last pause-safe stage this job checkpointed through, if any — a
    /// job resumed after a pause or a crash carries this forward so the
    /// handler can pick up after that stage instead of redoing it (§4.3).
    pub last_checkpoint_stage: Option<String>,
}

fn parse_uuid(raw: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| {
        EngineRuntimeError::MalformedPayload(format!("'{field}' is not a valid UUID: {raw}"))
    })
}

impl TryFrom<JobRow> for ClaimedJob {
    type Error = EngineRuntimeError;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(ClaimedJob {
            id: parse_uuid(&row.id, "id")?,
            job_type: JobType::parse(&row.job_type)?,
            document_id: row.document_id.as_deref().map(|d| parse_uuid(d, "document_id")).transpose()?,
            input_data: row.input_data,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            last_checkpoint_stage: row.last_checkpoint_stage,
        })
    }
}

#[instrument(skip(pool, input_data))]
pub async fn enqueue(
    pool: &DbPool,
    job_type: JobType,
    document_id: Option<Uuid>,
    user_id: &str,
    input_data: String,
    max_retries: i64,
) -> Result<Uuid> {
    let row = jobs::enqueue(
        pool,
        NewJob {
            job_type: job_type.as_str().to_string(),
            document_id: document_id.map(|id| id.to_string()),
            user_id: user_id.to_string(),
            input_data,
            max_retries,
        },
    )
    .await?;
    parse_uuid(&row.id, "id")
}

/// Claims the next eligible pending job across all `job_type`s, in
/// created_at order, as the worker loop's single-threaded poll does
/// (§4.1: one claim per 5 s tick).
#[instrument(skip(pool))]
pub async fn claim_next(pool: &DbPool) -> Result<Option<ClaimedJob>> {
    match jobs::claim_next(pool, None).await? {
        Some(row) => Ok(Some(ClaimedJob::try_from(row)?)),
        None => Ok(None),
    }
}

#[instrument(skip(pool))]
pub async fn heartbeat(pool: &DbPool, id: Uuid) -> Result<()> {
    jobs::heartbeat(pool, &id.to_string()).await.map_err(Into::into)
}

#[instrument(skip(pool, details))]
pub async fn update_progress(
    pool: &DbPool,
    id: Uuid,
    percent: f64,
    stage: &str,
    details: Option<&str>,
) -> Result<()> {
    jobs::update_progress(pool, &id.to_string(), percent, stage, details)
        .await
        .map_err(Into::into)
}

#[instrument(skip(pool))]
pub async fn save_checkpoint_pointer(
    pool: &DbPool,
    id: Uuid,
    path: &str,
    stage: &str,
    hash: &str,
) -> Result<()> {
    jobs::save_checkpoint_pointer(pool, &id.to_string(), path, stage, hash)
        .await
        .map_err(Into::into)
}

#[instrument(skip(pool, output_data))]
pub async fn complete(pool: &DbPool, id: Uuid, output_data: &str) -> Result<()> {
    jobs::mark_completed(pool, &id.to_string(), output_data)
        .await
        .map_err(Into::into)
}

#[instrument(skip(pool))]
pub async fn pause(pool: &DbPool, id: Uuid) -> Result<()> {
    jobs::pause(pool, &id.to_string()).await.map_err(Into::into)
}

#[instrument(skip(pool))]
pub async fn resume(pool: &DbPool, id: Uuid) -> Result<()> {
    jobs::resume(pool, &id.to_string()).await.map_err(Into::into)
}

#[instrument(skip(pool))]
pub async fn cancel(pool: &DbPool, id: Uuid) -> Result<()> {
    jobs::cancel(pool, &id.to_string()).await.map_err(Into::into)
}

#[instrument(skip(pool))]
pub async fn show(pool: &DbPool, id: Uuid) -> Result<JobRow> {
    jobs::get(pool, &id.to_string())
        .await
        .map_err(|_| EngineRuntimeError::JobNotFound(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_storage::db::models::JobRow;

    fn sample_row() -> JobRow {
        JobRow {
            id: Uuid::new_v4().to_string(),
            job_type: "process_document".to_string(),
            status: "pending".to_string(),
            document_id: Some(Uuid::new_v4().to_string()),
            user_id: "local-user".to_string(),
            input_data: "{}".to_string(),
            output_data: None,
            progress_percent: 0.0,
            progress_stage: None,
            progress_details: None,
            checkpoint_can_resume: 0,
            retry_count: 0,
            max_retries: 3,
            next_retry_at: None,
            error_message: None,
            paused_at: None,
            resumed_at: None,
            resume_count: 0,
            last_checkpoint_path: None,
            last_checkpoint_stage: None,
            checkpoint_hash: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            started_at: None,
        }
    }

    #[test]
    fn claimed_job_converts_from_a_valid_row() {
        let claimed = ClaimedJob::try_from(sample_row()).unwrap();
        assert_eq!(claimed.job_type, JobType::ProcessDocument);
        assert!(claimed.document_id.is_some());
    }

    #[test]
    fn claimed_job_rejects_unknown_job_type() {
        let mut row = sample_row();
        row.job_type = "unknown_type".to_string();
        assert!(ClaimedJob::try_from(row).is_err());
    }

    #[test]
    fn claimed_job_carries_the_checkpoint_pointer_forward() {
        let mut row = sample_row();
        row.last_checkpoint_stage = Some("chunking".to_string());
        let claimed = ClaimedJob::try_from(row).unwrap();
        assert_eq!(claimed.last_checkpoint_stage.as_deref(), Some("chunking"));
    }
}
