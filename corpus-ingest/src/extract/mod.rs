//! Source extraction (C5): turns a raw source into canonical markdown plus
//! structural "extractor chunks" carrying page/bbox metadata when available.
//!
//! Modeled as one capability trait ([`Extractor`]) the way
//! `wg-ragsmith::nodes::chunking` wraps `SemanticChunkingService` behind a
//! `Node` boundary — callers depend on the trait, not a concrete service.
//! Docling/Chonkie stay capability contracts ([`RemoteDoclingExtractor`],
//! [`RemoteChonkieExtractor`]); the extractors actually exercised end to end
//! are the local, dependency-free fallbacks.

mod html;
mod markdown;
mod plain_text;
mod remote;

pub use html::HtmlExtractor;
pub use markdown::MarkdownPassthroughExtractor;
pub use plain_text::PlainTextExtractor;
pub use remote::{RemoteChonkieExtractor, RemoteDoclingExtractor};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    PlainText,
    Html,
    Markdown,
    RemoteDocling,
    RemoteChonkie,
}

/// A reference to the raw material an extractor consumes.
#[derive(Debug, Clone)]
pub enum SourceRef {
    PlainText(String),
    Html(String),
    Markdown(String),
    Remote { url: String },
}

/// A single bounding box on a page, carried through from extractors that
/// report layout (PDFs via Docling); local extractors never populate this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub page: u32,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

/// One structural unit produced by an extractor — the "extractor chunk"
/// coordinate system the bulletproof matcher reconciles against semantic
/// chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorChunk {
    pub content: String,
    pub heading_path: Vec<String>,
    pub heading_level: Option<u8>,
    pub section_marker: Option<String>,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub bboxes: Vec<BBox>,
}

/// The output of running one [`Extractor`] over a [`SourceRef`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub markdown: String,
    pub extractor_chunks: Vec<ExtractorChunk>,
}

/// Capability contract satisfied by every source extractor.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn source_type(&self) -> SourceType;
    async fn extract(&self, source: &SourceRef) -> Result<ExtractionOutput>;
}
