//! Retry manager (§4.2, C12): classifies a handler failure and schedules
//! backoff, or marks the job permanently failed.

use tracing::instrument;
use uuid::Uuid;

use corpus_storage::db::jobs;
use corpus_storage::DbPool;

use crate::error::{Classify, EngineRuntimeError, ErrorKind, Result};

/// `delay_minutes = min(2^retry_count, 30)` (§4.2) — exponential backoff
/// capped so a flaky provider never pushes a retry more than half an hour
/// out.
pub fn backoff_minutes(retry_count: i64, cap_minutes: i64) -> i64 {
    let doubled = 1i64.checked_shl(retry_count.clamp(0, 62) as u32).unwrap_or(i64::MAX);
    doubled.min(cap_minutes)
}

/// Routes a failed job to auto-retry or permanent failure depending on
/// [`ErrorKind`] (§4.2, §7): only `Transient` errors are retried; every
/// other kind surfaces immediately with no `next_retry_at`.
#[instrument(skip(pool, error))]
pub async fn handle_failure(
    pool: &DbPool,
    job_id: Uuid,
    retry_count: i64,
    cap_minutes: i64,
    error: &EngineRuntimeError,
) -> Result<ErrorKind> {
    let kind = error.classify();
    let message = error.to_string();
    match kind {
        ErrorKind::Transient => {
            let delay = backoff_minutes(retry_count, cap_minutes);
            jobs::schedule_retry_or_fail(pool, &job_id.to_string(), &message, delay).await?;
        }
        ErrorKind::Paywall | ErrorKind::Invalid | ErrorKind::Permanent => {
            jobs::mark_failed_permanent(pool, &job_id.to_string(), &message).await?;
        }
    }
    Ok(kind)
}

/// Resets jobs stalled past `stalled_after_seconds` (a worker that
/// crashed mid-heartbeat) back to `pending`, without charging them a
/// retry attempt — the job wasn't at fault.
#[instrument(skip(pool))]
pub async fn recover_stalled(pool: &DbPool, stalled_after_seconds: i64) -> Result<usize> {
    let stalled = jobs::list_stalled(pool, stalled_after_seconds).await?;
    for row in &stalled {
        jobs::reset_stalled_to_pending(pool, &row.id).await?;
    }
    Ok(stalled.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        assert_eq!(backoff_minutes(0, 30), 1);
        assert_eq!(backoff_minutes(1, 30), 2);
        assert_eq!(backoff_minutes(4, 30), 16);
        assert_eq!(backoff_minutes(5, 30), 30);
        assert_eq!(backoff_minutes(10, 30), 30);
    }
}
