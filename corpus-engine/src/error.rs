//! The worker's top-level error type and the [`ErrorKind`] classifier
//! (§4.2) that decides whether a failure is retried.
//!
//! Grounded on `channels::errors::{ErrorEvent, LadderError}`'s scoped error
//! taxonomy, reshaped: the teacher tags errors with a *scope* (node,
//! scheduler, runner, app); here every error instead classifies itself
//! into an [`ErrorKind`] the retry manager consumes directly, with a
//! substring-matching fallback (§4.2.1) for errors crossing an HTTP/FFI
//! boundary where only prose is available.

use thiserror::Error;

use corpus_connections::engine::EngineError;
use corpus_ingest::error::IngestError;
use corpus_storage::StorageError;

/// How the retry manager should treat a failed job (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network/timeout/5xx/429 — eligible for auto-retry with backoff.
    Transient,
    /// Quota/credit/billing — surfaced, never auto-retried.
    Paywall,
    /// Malformed input, not found, parse error — surfaced, never retried.
    Invalid,
    /// Everything else — surfaced, never retried.
    Permanent,
}

/// Implemented by every crate-boundary error so the classifier never has
/// to fall back to prose-matching for errors this workspace produces
/// itself.
pub trait Classify {
    fn classify(&self) -> ErrorKind;
}

#[derive(Debug, Error)]
pub enum EngineRuntimeError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("ingest pipeline error: {0}")]
    Ingest(#[from] IngestError),

    #[error("connection engine error: {0}")]
    Connection(#[from] EngineError),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("checkpoint hash mismatch for stage '{stage}': expected {expected}, found {found}")]
    CheckpointMismatch {
        stage: String,
        expected: String,
        found: String,
    },

    #[error("unsupported job type '{0}'")]
    UnsupportedJobType(String),

    #[error("malformed job payload: {0}")]
    MalformedPayload(String),

    #[error("import/export error: {0}")]
    Portability(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("external provider error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, EngineRuntimeError>;

impl Classify for EngineRuntimeError {
    fn classify(&self) -> ErrorKind {
        match self {
            EngineRuntimeError::Storage(StorageError::Io { .. })
            | EngineRuntimeError::Storage(StorageError::Database(_)) => ErrorKind::Transient,
            EngineRuntimeError::Storage(StorageError::ObjectNotFound(_))
            | EngineRuntimeError::Storage(StorageError::Invariant(_))
            | EngineRuntimeError::Storage(StorageError::Serde(_)) => ErrorKind::Invalid,
            EngineRuntimeError::Ingest(err) => ingest_error_kind(err),
            EngineRuntimeError::Connection(EngineError::LlmCall(msg)) => classify_prose(msg),
            EngineRuntimeError::Connection(EngineError::CandidateLookup(_)) => ErrorKind::Transient,
            EngineRuntimeError::JobNotFound(_) | EngineRuntimeError::DocumentNotFound(_) => {
                ErrorKind::Invalid
            }
            EngineRuntimeError::CheckpointMismatch { .. } => ErrorKind::Transient,
            EngineRuntimeError::UnsupportedJobType(_)
            | EngineRuntimeError::MalformedPayload(_)
            | EngineRuntimeError::Config(_) => ErrorKind::Invalid,
            EngineRuntimeError::Portability(msg) => classify_prose(msg),
            EngineRuntimeError::Provider(msg) => classify_prose(msg),
        }
    }
}

fn ingest_error_kind(err: &IngestError) -> ErrorKind {
    use corpus_ingest::ErrorKind as IngestKind;
    match err.classify() {
        IngestKind::Transient => ErrorKind::Transient,
        IngestKind::Paywall => ErrorKind::Paywall,
        IngestKind::Invalid => ErrorKind::Invalid,
        IngestKind::Permanent => ErrorKind::Permanent,
    }
}

/// §4.2.1's fallback: substring matching on prose for errors that cross a
/// boundary where only an error message is available (a raw HTTP response
/// body, a provider's error string). Internal errors are classified via
/// [`Classify`] instead and never reach here.
pub fn classify_prose(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    let transient_markers = [
        "timeout", "timed out", "connection reset", "socket hang up", "502", "503", "504", "429",
        "temporarily unavailable", "network",
    ];
    let paywall_markers = ["quota", "credit", "billing", "insufficient funds", "payment required"];
    let invalid_markers = ["not found", "invalid", "malformed", "parse error", "unprocessable"];

    if paywall_markers.iter().any(|m| lower.contains(m)) {
        ErrorKind::Paywall
    } else if transient_markers.iter().any(|m| lower.contains(m)) {
        ErrorKind::Transient
    } else if invalid_markers.iter().any(|m| lower.contains(m)) {
        ErrorKind::Invalid
    } else {
        ErrorKind::Permanent
    }
}
