use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{BBox, ExtractionOutput, Extractor, ExtractorChunk, SourceRef, SourceType};
use crate::error::{IngestError, Result};

/// Strips HTML to markdown-ish text: headings become `#`/`##`/…, one
/// extractor chunk per top-level block, heading path tracked via a stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExtractor;

fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

#[async_trait]
impl Extractor for HtmlExtractor {
    fn source_type(&self) -> SourceType {
        SourceType::Html
    }

    async fn extract(&self, source: &SourceRef) -> Result<ExtractionOutput> {
        let SourceRef::Html(html) = source else {
            return Err(IngestError::Parse {
                source: "html".to_string(),
                detail: "expected SourceRef::Html".to_string(),
            });
        };

        let document = Html::parse_document(html);
        let body_selector = Selector::parse("h1, h2, h3, h4, h5, h6, p, li").map_err(|e| {
            IngestError::Parse {
                source: "html".to_string(),
                detail: format!("selector build failed: {e:?}"),
            }
        })?;

        let mut markdown = String::new();
        let mut extractor_chunks = Vec::new();
        let mut heading_stack: Vec<(u8, String)> = Vec::new();

        for element in document.select(&body_selector) {
            let text: String = element.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                continue;
            }

            let tag = element.value().name();
            if let Some(level) = heading_level(tag) {
                heading_stack.retain(|(l, _)| *l < level);
                heading_stack.push((level, text.clone()));

                let marker = "#".repeat(level as usize);
                markdown.push_str(&format!("{marker} {text}\n\n"));

                extractor_chunks.push(ExtractorChunk {
                    content: text,
                    heading_path: heading_stack.iter().map(|(_, t)| t.clone()).collect(),
                    heading_level: Some(level),
                    section_marker: None,
                    page_start: None,
                    page_end: None,
                    bboxes: Vec::<BBox>::new(),
                });
            } else {
                markdown.push_str(&text);
                markdown.push_str("\n\n");

                extractor_chunks.push(ExtractorChunk {
                    content: text,
                    heading_path: heading_stack.iter().map(|(_, t)| t.clone()).collect(),
                    heading_level: None,
                    section_marker: None,
                    page_start: None,
                    page_end: None,
                    bboxes: Vec::<BBox>::new(),
                });
            }
        }

        Ok(ExtractionOutput {
            markdown: markdown.trim_end().to_string(),
            extractor_chunks,
        })
    }
}
