//! Bulletproof matcher (C8): reconciles the two chunker coordinate systems —
//! extractor chunks (rich structural metadata, variable size) and semantic
//! chunks (uniform size) — by recovering each semantic chunk's character
//! offsets in the canonical markdown, then transferring structural metadata
//! across via interval overlap.
//!
//! Each layer is a [`MatchLayer`]; [`BulletproofMatcher`] runs them as a
//! fixed cascade, mirroring the `GuardrailStage`-over-`PipelineExecutor`
//! first-acceptable-result-wins idiom already present in this workspace
//! (`wg-bastion::pipeline`) rather than running every stage unconditionally.

mod layers;
mod metadata_transfer;

pub use layers::{
    AnchorTriangulationLayer, ExactSubstringLayer, LengthProratedInterpolationLayer,
    NormalizedWhitespaceLayer, SyntheticGapFillLayer,
};
pub use metadata_transfer::{transfer_metadata, MetadataConfidence, TransferredMetadata};

use serde::{Deserialize, Serialize};

use crate::chunk::SemanticChunkDraft;
use crate::extract::ExtractorChunk;

/// How a semantic chunk's offsets were recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionConfidence {
    Exact,
    High,
    Medium,
    Synthetic,
}

/// The document a matcher runs against: canonical markdown plus its
/// extractor chunks, each carrying its own offset range once located.
#[derive(Debug, Clone)]
pub struct MatchDocument<'a> {
    pub markdown: &'a str,
    pub extractor_chunks: &'a [ExtractorChunk],
}

/// Result of one layer successfully placing a semantic chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub start_offset: i64,
    pub end_offset: i64,
    pub position_confidence: PositionConfidence,
    pub position_method: String,
}

/// One layer of the matcher cascade.
pub trait MatchLayer: Send + Sync {
    fn name(&self) -> &'static str;
    fn try_match(&self, chunk: &SemanticChunkDraft, doc: &MatchDocument<'_>) -> Option<MatchResult>;
}

/// A semantic chunk with its recovered position plus transferred metadata,
/// ready for persistence.
#[derive(Debug, Clone)]
pub struct MatchedChunk {
    pub draft: SemanticChunkDraft,
    pub position_confidence: PositionConfidence,
    pub position_method: String,
    pub position_validated: bool,
    pub metadata: TransferredMetadata,
}

/// Runs the fixed five-layer cascade over every semantic chunk, then
/// computes metadata transfer for each placed chunk.
pub struct BulletproofMatcher {
    layers: Vec<Box<dyn MatchLayer>>,
}

impl Default for BulletproofMatcher {
    fn default() -> Self {
        Self {
            layers: vec![
                Box::new(ExactSubstringLayer),
                Box::new(NormalizedWhitespaceLayer),
                Box::new(AnchorTriangulationLayer),
                Box::new(LengthProratedInterpolationLayer),
                Box::new(SyntheticGapFillLayer),
            ],
        }
    }
}

impl BulletproofMatcher {
    pub fn match_all(&self, drafts: &[SemanticChunkDraft], doc: &MatchDocument<'_>) -> Vec<MatchedChunk> {
        let mut matched = Vec::with_capacity(drafts.len());
        let mut last_end = -1i64;

        for draft in drafts {
            let result = self
                .layers
                .iter()
                .find_map(|layer| layer.try_match(draft, doc))
                .unwrap_or_else(|| {
                    // Every chunk must land somewhere; the synthetic layer's
                    // own fallback covers layer exhaustion too, but guard
                    // here in case a caller constructs a custom layer set.
                    MatchResult {
                        start_offset: draft.start_offset,
                        end_offset: draft.end_offset,
                        position_confidence: PositionConfidence::Synthetic,
                        position_method: "fallback_draft_offsets".to_string(),
                    }
                });

            // Small whitespace overlap is tolerated; anything beyond the
            // epsilon means monotonic ordering failed and the chunk is
            // flagged unvalidated for operator review rather than rejected.
            const OVERLAP_EPSILON: i64 = 2;
            let monotonic = result.start_offset >= last_end - OVERLAP_EPSILON;
            let ordered = result.end_offset >= result.start_offset;
            let position_validated = monotonic && ordered;
            last_end = result.end_offset;

            let overlapping: Vec<&ExtractorChunk> = doc
                .extractor_chunks
                .iter()
                .filter(|ec| {
                    extractor_chunk_offsets(ec, doc.markdown)
                        .map(|(s, e)| ranges_overlap(s, e, result.start_offset, result.end_offset))
                        .unwrap_or(false)
                })
                .collect();

            let metadata = transfer_metadata(&overlapping, doc.markdown, result.start_offset, result.end_offset);

            let mut final_draft = draft.clone();
            final_draft.start_offset = result.start_offset;
            final_draft.end_offset = result.end_offset;

            matched.push(MatchedChunk {
                draft: final_draft,
                position_confidence: result.position_confidence,
                position_method: result.position_method,
                position_validated,
                metadata,
            });
        }

        matched
    }
}

/// Locates an extractor chunk's own offsets in the markdown by exact
/// substring search. Extractor chunks don't carry offsets themselves (only
/// content), so this is recomputed on demand; called once per overlap check.
pub(crate) fn extractor_chunk_offsets(chunk: &ExtractorChunk, markdown: &str) -> Option<(i64, i64)> {
    markdown
        .find(chunk.content.as_str())
        .map(|start| (start as i64, (start + chunk.content.len()) as i64))
}

pub(crate) fn ranges_overlap(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> bool {
    a_start < b_end && b_start < a_end
}

pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::BBox;

    fn chunk(index: i64, content: &str) -> SemanticChunkDraft {
        SemanticChunkDraft {
            chunk_index: index,
            content: content.to_string(),
            start_offset: 0,
            end_offset: 0,
            word_count: content.split_whitespace().count() as i64,
            chunker_type: "semantic_v1".to_string(),
            token_count: content.split_whitespace().count() as i64,
        }
    }

    fn extractor_chunk(content: &str, heading: &str, page: u32) -> ExtractorChunk {
        ExtractorChunk {
            content: content.to_string(),
            heading_path: vec![heading.to_string()],
            heading_level: Some(1),
            section_marker: None,
            page_start: Some(page),
            page_end: Some(page),
            bboxes: Vec::<BBox>::new(),
        }
    }

    #[test]
    fn exact_substring_wins_when_text_is_present_verbatim() {
        let markdown = "Intro paragraph.\n\nSecond paragraph here.";
        let extractor_chunks = vec![
            extractor_chunk("Intro paragraph.", "Intro", 1),
            extractor_chunk("Second paragraph here.", "Intro", 1),
        ];
        let doc = MatchDocument {
            markdown,
            extractor_chunks: &extractor_chunks,
        };
        let drafts = vec![chunk(0, "Second paragraph here.")];

        let matcher = BulletproofMatcher::default();
        let matched = matcher.match_all(&drafts, &doc);

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].position_confidence, PositionConfidence::Exact);
        assert_eq!(matched[0].draft.start_offset, markdown.find("Second").unwrap() as i64);
        assert!(matched[0].position_validated);
    }

    #[test]
    fn unmatchable_content_falls_through_to_synthetic_layer() {
        let markdown = "Alpha beta gamma.";
        let extractor_chunks = vec![extractor_chunk("Alpha beta gamma.", "Only", 1)];
        let doc = MatchDocument {
            markdown,
            extractor_chunks: &extractor_chunks,
        };
        let drafts = vec![chunk(0, "completely unrelated content not in markdown")];

        let matcher = BulletproofMatcher::default();
        let matched = matcher.match_all(&drafts, &doc);

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].position_confidence, PositionConfidence::Synthetic);
        assert!(
            matched[0].metadata.interpolated,
            "a synthetic placement has no genuinely overlapping extractor chunk, so its metadata must be flagged interpolated"
        );
    }
}
