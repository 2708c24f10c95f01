//! Stage names and their progress bands (§4.4) — kept as plain constants
//! rather than an enum with associated data, since every caller only ever
//! needs the name (for `StageEvent`/checkpoint paths) and a percent range
//! (for `updateProgress`), not anything richer.

/// `(name, percent_at_start, percent_at_end)`, in pipeline order.
pub const EXTRACTION: (&str, f64, f64) = ("extraction", 0.0, 20.0);
pub const CLEANUP: (&str, f64, f64) = ("cleanup", 20.0, 30.0);
pub const MATCHING: (&str, f64, f64) = ("matching", 30.0, 40.0);
pub const CHUNKING: (&str, f64, f64) = ("chunking", 40.0, 60.0);
pub const METADATA_TRANSFER: (&str, f64, f64) = ("metadata_transfer", 60.0, 65.0);
pub const ENRICHMENT: (&str, f64, f64) = ("enrichment", 65.0, 70.0);
pub const EMBEDDING: (&str, f64, f64) = ("embedding", 70.0, 80.0);
pub const PERSISTENCE: (&str, f64, f64) = ("persistence", 80.0, 90.0);
pub const CONNECTION_HANDOFF: (&str, f64, f64) = ("connection_handoff", 90.0, 95.0);
pub const FINALIZE: (&str, f64, f64) = ("finalize", 95.0, 100.0);

/// The four pause-safe stages (§4.3) eligible for a checkpoint envelope.
pub const PAUSE_SAFE_STAGES: [&str; 4] = ["extraction", "cleanup", "chunking", "embedding"];

pub fn is_pause_safe(stage: &str) -> bool {
    PAUSE_SAFE_STAGES.contains(&stage)
}
