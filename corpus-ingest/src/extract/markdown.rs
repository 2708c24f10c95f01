use async_trait::async_trait;

use super::{BBox, ExtractionOutput, Extractor, ExtractorChunk, SourceRef, SourceType};
use crate::error::{IngestError, Result};

fn heading_level(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = trimmed[hashes..].trim_start();
    if rest.is_empty() && trimmed.len() == hashes {
        return None;
    }
    Some((hashes as u8, rest.to_string()))
}

fn is_horizontal_rule(line: &str) -> bool {
    let t = line.trim();
    (t.len() >= 3)
        && (t.chars().all(|c| c == '-') || t.chars().all(|c| c == '*') || t.chars().all(|c| c == '_'))
}

/// Markdown is already the canonical form, so extraction is a passthrough:
/// the source text becomes the output markdown verbatim, chunked at heading
/// and horizontal-rule boundaries with the heading path tracked via a stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownPassthroughExtractor;

#[async_trait]
impl Extractor for MarkdownPassthroughExtractor {
    fn source_type(&self) -> SourceType {
        SourceType::Markdown
    }

    async fn extract(&self, source: &SourceRef) -> Result<ExtractionOutput> {
        let SourceRef::Markdown(markdown) = source else {
            return Err(IngestError::Parse {
                source: "markdown".to_string(),
                detail: "expected SourceRef::Markdown".to_string(),
            });
        };

        let mut extractor_chunks = Vec::new();
        let mut heading_stack: Vec<(u8, String)> = Vec::new();
        let mut current_block: Vec<&str> = Vec::new();
        let mut current_heading_level: Option<u8> = None;

        let flush = |block: &mut Vec<&str>,
                     heading_level: Option<u8>,
                     heading_stack: &[(u8, String)],
                     chunks: &mut Vec<ExtractorChunk>| {
            let content = block.join("\n").trim().to_string();
            block.clear();
            if content.is_empty() {
                return;
            }
            chunks.push(ExtractorChunk {
                content,
                heading_path: heading_stack.iter().map(|(_, t)| t.clone()).collect(),
                heading_level,
                section_marker: None,
                page_start: None,
                page_end: None,
                bboxes: Vec::<BBox>::new(),
            });
        };

        for line in markdown.lines() {
            if let Some((level, text)) = heading_level(line) {
                flush(
                    &mut current_block,
                    current_heading_level,
                    &heading_stack,
                    &mut extractor_chunks,
                );
                heading_stack.retain(|(l, _)| *l < level);
                heading_stack.push((level, text));
                current_heading_level = Some(level);
                continue;
            }
            if is_horizontal_rule(line) {
                flush(
                    &mut current_block,
                    current_heading_level,
                    &heading_stack,
                    &mut extractor_chunks,
                );
                continue;
            }
            current_block.push(line);
        }
        flush(
            &mut current_block,
            current_heading_level,
            &heading_stack,
            &mut extractor_chunks,
        );

        Ok(ExtractionOutput {
            markdown: markdown.clone(),
            extractor_chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chunks_at_headings_and_tracks_path() {
        let extractor = MarkdownPassthroughExtractor;
        let md = "# Grief\n\nIntro text.\n\n## Stages\n\nDenial comes first.\n";
        let out = extractor
            .extract(&SourceRef::Markdown(md.to_string()))
            .await
            .unwrap();

        assert_eq!(out.markdown, md);
        assert_eq!(out.extractor_chunks.len(), 2);
        assert_eq!(out.extractor_chunks[0].heading_path, vec!["Grief".to_string()]);
        assert_eq!(
            out.extractor_chunks[1].heading_path,
            vec!["Grief".to_string(), "Stages".to_string()]
        );
    }

    #[tokio::test]
    async fn horizontal_rule_splits_block_without_heading() {
        let extractor = MarkdownPassthroughExtractor;
        let md = "First block.\n\n---\n\nSecond block.";
        let out = extractor
            .extract(&SourceRef::Markdown(md.to_string()))
            .await
            .unwrap();
        assert_eq!(out.extractor_chunks.len(), 2);
        assert_eq!(out.extractor_chunks[1].content, "Second block.");
    }
}
