use async_trait::async_trait;
use regex::Regex;

use super::{CleanupOutput, CleanupStrategy};
use crate::error::Result;

/// Deterministic whitespace and artifact normalization: collapses runs of
/// blank lines, strips trailing whitespace, and removes common PDF-extraction
/// artifacts (page-number-only lines, form-feed characters).
pub struct RegexCleanup {
    blank_run: Regex,
    trailing_ws: Regex,
    page_number_line: Regex,
}

impl Default for RegexCleanup {
    fn default() -> Self {
        Self {
            blank_run: Regex::new(r"\n{3,}").expect("static pattern"),
            trailing_ws: Regex::new(r"[ \t]+\n").expect("static pattern"),
            page_number_line: Regex::new(r"(?m)^\s*\d{1,4}\s*$\n?").expect("static pattern"),
        }
    }
}

#[async_trait]
impl CleanupStrategy for RegexCleanup {
    fn name(&self) -> &'static str {
        "regex"
    }

    async fn clean(&self, markdown: &str) -> Result<CleanupOutput> {
        let without_form_feed = markdown.replace('\u{c}', "\n");
        let without_page_numbers = self.page_number_line.replace_all(&without_form_feed, "");
        let without_trailing_ws = self.trailing_ws.replace_all(&without_page_numbers, "\n");
        let collapsed = self.blank_run.replace_all(&without_trailing_ws, "\n\n");
        let cleaned = collapsed.trim().to_string();

        Ok(CleanupOutput {
            changed: cleaned != markdown,
            markdown: cleaned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collapses_excess_blank_lines() {
        let cleanup = RegexCleanup::default();
        let out = cleanup.clean("para one\n\n\n\n\npara two").await.unwrap();
        assert_eq!(out.markdown, "para one\n\npara two");
        assert!(out.changed);
    }

    #[tokio::test]
    async fn strips_bare_page_number_lines() {
        let cleanup = RegexCleanup::default();
        let out = cleanup.clean("Heading\n\n42\n\nBody text.").await.unwrap();
        assert!(!out.markdown.contains("42"));
    }

    #[tokio::test]
    async fn already_clean_input_reports_unchanged() {
        let cleanup = RegexCleanup::default();
        let out = cleanup.clean("clean paragraph.").await.unwrap();
        assert!(!out.changed);
    }
}
