//! The observability event a worker publishes at every stage transition.
//!
//! Purely an in-process channel (§3.1's ambient `StageEvent log`): nothing
//! here is persisted, and the pipeline's correctness never depends on a
//! subscriber being attached. A CLI or future UI subscribes to watch a job
//! live; the job row in `corpus-storage` remains the durable source of
//! truth for progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum StageEvent {
    JobClaimed {
        job_id: Uuid,
        job_type: String,
    },
    StageStarted {
        job_id: Uuid,
        stage: String,
    },
    StageProgress {
        job_id: Uuid,
        stage: String,
        percent: f64,
    },
    StageCompleted {
        job_id: Uuid,
        stage: String,
    },
    EngineStarted {
        job_id: Uuid,
        engine: String,
    },
    EngineCompleted {
        job_id: Uuid,
        engine: String,
        connection_count: usize,
    },
    Diagnostic {
        job_id: Option<Uuid>,
        scope: String,
        message: String,
    },
}

impl StageEvent {
    pub fn scope_label(&self) -> &str {
        match self {
            StageEvent::JobClaimed { .. } => "job_claimed",
            StageEvent::StageStarted { .. } => "stage_started",
            StageEvent::StageProgress { .. } => "stage_progress",
            StageEvent::StageCompleted { .. } => "stage_completed",
            StageEvent::EngineStarted { .. } => "engine_started",
            StageEvent::EngineCompleted { .. } => "engine_completed",
            StageEvent::Diagnostic { .. } => "diagnostic",
        }
    }

    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            StageEvent::JobClaimed { job_id, .. }
            | StageEvent::StageStarted { job_id, .. }
            | StageEvent::StageProgress { job_id, .. }
            | StageEvent::StageCompleted { job_id, .. }
            | StageEvent::EngineStarted { job_id, .. }
            | StageEvent::EngineCompleted { job_id, .. } => Some(*job_id),
            StageEvent::Diagnostic { job_id, .. } => *job_id,
        }
    }

    pub fn to_json_value(&self) -> Value {
        serde_json::json!({
            "type": self.scope_label(),
            "job_id": self.job_id(),
            "timestamp": Utc::now().to_rfc3339(),
            "detail": self,
        })
    }
}

/// Helper to stamp an emitted diagnostic with the current time for logs
/// that want it inline rather than re-deriving from `Utc::now()` at print
/// time.
pub fn timestamped(event: StageEvent) -> (DateTime<Utc>, StageEvent) {
    (Utc::now(), event)
}
