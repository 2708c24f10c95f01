use async_trait::async_trait;

use super::{CleanupOutput, CleanupStrategy};
use crate::error::{IngestError, Result};

/// Capability contract for whatever text-completion backend is configured
/// for AI cleanup. Kept separate from [`AiCleanup`] so the prompt and
/// response-shape concerns stay independent of the transport.
#[async_trait]
pub trait TextCompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

const CLEANUP_PROMPT_PREFIX: &str = "Clean the following markdown, fixing extraction artifacts and normalizing structure, without changing meaning:\n\n";

/// AI-assisted cleanup: delegates to a pluggable [`TextCompletionProvider`].
/// Provider errors are classified by [`IngestError::classify`] — a
/// quota/billing message surfaces as `Paywall` rather than being retried
/// forever, everything else falls back to `Transient` so the caller can
/// retry or fall back to [`super::RegexCleanup`].
pub struct AiCleanup {
    provider: Box<dyn TextCompletionProvider>,
}

impl AiCleanup {
    pub fn new(provider: Box<dyn TextCompletionProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl CleanupStrategy for AiCleanup {
    fn name(&self) -> &'static str {
        "ai"
    }

    async fn clean(&self, markdown: &str) -> Result<CleanupOutput> {
        let prompt = format!("{CLEANUP_PROMPT_PREFIX}{markdown}");
        let cleaned = self
            .provider
            .complete(&prompt)
            .await
            .map_err(|e| IngestError::Cleanup(e.to_string()))?;

        Ok(CleanupOutput {
            changed: cleaned != markdown,
            markdown: cleaned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider;

    #[async_trait]
    impl TextCompletionProvider for EchoProvider {
        async fn complete(&self, prompt: &str) -> Result<String> {
            Ok(prompt.trim_start_matches(CLEANUP_PROMPT_PREFIX).to_string())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl TextCompletionProvider for FailingProvider {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(IngestError::Cleanup("provider unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn delegates_to_provider_and_reports_change() {
        let cleanup = AiCleanup::new(Box::new(EchoProvider));
        let out = cleanup.clean("raw markdown").await.unwrap();
        assert_eq!(out.markdown, "raw markdown");
        assert!(!out.changed);
    }

    #[tokio::test]
    async fn provider_error_is_classified_transient() {
        let cleanup = AiCleanup::new(Box::new(FailingProvider));
        let err = cleanup.clean("raw markdown").await.unwrap_err();
        assert_eq!(err.classify(), crate::error::ErrorKind::Transient);
    }
}
