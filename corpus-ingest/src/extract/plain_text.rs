use async_trait::async_trait;

use super::{BBox, ExtractionOutput, Extractor, ExtractorChunk, SourceRef, SourceType};
use crate::error::{IngestError, Result};

/// Identity passthrough: one extractor chunk per blank-line-delimited
/// paragraph, no page/bbox metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

#[async_trait]
impl Extractor for PlainTextExtractor {
    fn source_type(&self) -> SourceType {
        SourceType::PlainText
    }

    async fn extract(&self, source: &SourceRef) -> Result<ExtractionOutput> {
        let SourceRef::PlainText(text) = source else {
            return Err(IngestError::Parse {
                source: "plain_text".to_string(),
                detail: "expected SourceRef::PlainText".to_string(),
            });
        };

        let extractor_chunks = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|paragraph| ExtractorChunk {
                content: paragraph.to_string(),
                heading_path: Vec::new(),
                heading_level: None,
                section_marker: None,
                page_start: None,
                page_end: None,
                bboxes: Vec::<BBox>::new(),
            })
            .collect();

        Ok(ExtractionOutput {
            markdown: text.clone(),
            extractor_chunks,
        })
    }
}
