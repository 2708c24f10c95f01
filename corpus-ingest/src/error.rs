use thiserror::Error;

/// Errors from extraction, cleanup, chunking, matching, enrichment, or
/// embedding. Each stage's failure mode (transient/invalid/permanent) is
/// exposed via [`IngestError::classify`] so the worker's retry manager can
/// decide whether to back off or give up without knowing stage internals.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch failed for source '{source}': {detail}")]
    Fetch { source: String, detail: String },

    #[error("parser error on source '{source}': {detail}")]
    Parse { source: String, detail: String },

    #[error("remote extractor returned an unexpected response: {0}")]
    RemoteExtractor(String),

    #[error("cleanup provider error: {0}")]
    Cleanup(String),

    #[error("chunking produced no chunks for a non-empty document")]
    EmptyChunking,

    #[error("matcher could not place chunk {chunk_index} in the source document")]
    UnplaceableChunk { chunk_index: usize },

    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("enrichment response failed schema validation: {0}")]
    EnrichmentSchema(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Broad classification used by the retry manager (SPEC_FULL.md §4.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Paywall,
    Invalid,
    Permanent,
}

impl IngestError {
    pub fn classify(&self) -> ErrorKind {
        match self {
            IngestError::Fetch { .. } => ErrorKind::Transient,
            IngestError::RemoteExtractor(_) => ErrorKind::Transient,
            IngestError::Cleanup(msg) => cleanup_error_kind(msg),
            IngestError::Embedding(_) => ErrorKind::Transient,
            IngestError::Parse { .. } => ErrorKind::Invalid,
            IngestError::EmptyChunking => ErrorKind::Invalid,
            IngestError::UnplaceableChunk { .. } => ErrorKind::Invalid,
            IngestError::EnrichmentSchema(_) => ErrorKind::Invalid,
            IngestError::Io(_) => ErrorKind::Permanent,
            IngestError::Serde(_) => ErrorKind::Permanent,
        }
    }
}

/// A cleanup provider's error string crosses an HTTP/FFI boundary the same
/// way `corpus-engine`'s `classify_prose` fallback handles — a quota/credit
/// message means the caller is paywalled, not that the provider hiccuped,
/// so it must not fall into the default transient/auto-retry bucket.
fn cleanup_error_kind(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    let paywall_markers = ["quota", "credit", "billing", "insufficient funds", "payment required"];
    if paywall_markers.iter().any(|m| lower.contains(m)) {
        ErrorKind::Paywall
    } else {
        ErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_quota_errors_classify_paywall_not_transient() {
        let err = IngestError::Cleanup("AI quota exhausted for this billing period".to_string());
        assert_eq!(err.classify(), ErrorKind::Paywall);
    }

    #[test]
    fn cleanup_generic_errors_still_classify_transient() {
        let err = IngestError::Cleanup("provider unavailable".to_string());
        assert_eq!(err.classify(), ErrorKind::Transient);
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
