//! Markdown cleanup (C6): optional normalization applied after extraction
//! and before chunking. Deterministic regex cleanup, AI-assisted cleanup
//! (behind a pluggable [`TextCompletionProvider`] capability), or a no-op
//! passthrough when cleanup is disabled for a job.

mod ai_cleanup;
mod regex_cleanup;

pub use ai_cleanup::{AiCleanup, TextCompletionProvider};
pub use regex_cleanup::RegexCleanup;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Output of a cleanup pass — normalized markdown plus a flag telling
/// downstream stages whether anything actually changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupOutput {
    pub markdown: String,
    pub changed: bool,
}

/// Capability contract satisfied by every cleanup strategy.
#[async_trait]
pub trait CleanupStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn clean(&self, markdown: &str) -> Result<CleanupOutput>;
}

/// Used when a job's config disables cleanup outright.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCleanup;

#[async_trait]
impl CleanupStrategy for NoopCleanup {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn clean(&self, markdown: &str) -> Result<CleanupOutput> {
        Ok(CleanupOutput {
            markdown: markdown.to_string(),
            changed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_cleanup_passes_markdown_through_unchanged() {
        let cleanup = NoopCleanup;
        let out = cleanup.clean("some *markdown*").await.unwrap();
        assert_eq!(out.markdown, "some *markdown*");
        assert!(!out.changed);
    }
}
