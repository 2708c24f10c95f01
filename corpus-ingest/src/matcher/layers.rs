use super::{extractor_chunk_offsets, normalize_whitespace, MatchDocument, MatchLayer, MatchResult, PositionConfidence};
use crate::chunk::SemanticChunkDraft;

/// Builds a normalized (whitespace-collapsed) view of `text` alongside a map
/// from each normalized byte offset back to the corresponding original byte
/// offset, so matches found in the normalized view can be translated back.
fn normalize_with_offset_map(text: &str) -> (String, Vec<usize>) {
    let mut normalized = String::with_capacity(text.len());
    let mut offsets = Vec::with_capacity(text.len());
    let mut in_whitespace_run = true; // treat leading whitespace as already "seen"

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if !in_whitespace_run && !normalized.is_empty() {
                normalized.push(' ');
                offsets.push(idx);
            }
            in_whitespace_run = true;
        } else {
            normalized.push(ch);
            offsets.push(idx);
            in_whitespace_run = false;
        }
    }
    while normalized.ends_with(' ') {
        normalized.pop();
        offsets.pop();
    }
    (normalized, offsets)
}

/// Layer 1: find the chunk's text verbatim in the markdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactSubstringLayer;

impl MatchLayer for ExactSubstringLayer {
    fn name(&self) -> &'static str {
        "exact_substring"
    }

    fn try_match(&self, chunk: &SemanticChunkDraft, doc: &MatchDocument<'_>) -> Option<MatchResult> {
        let start = doc.markdown.find(chunk.content.as_str())?;
        Some(MatchResult {
            start_offset: start as i64,
            end_offset: (start + chunk.content.len()) as i64,
            position_confidence: PositionConfidence::Exact,
            position_method: "exact_substring".to_string(),
        })
    }
}

/// Layer 2: exact match fails when whitespace was rewrapped or collapsed
/// between extraction and chunking; retry against a normalized view.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizedWhitespaceLayer;

impl MatchLayer for NormalizedWhitespaceLayer {
    fn name(&self) -> &'static str {
        "normalized_whitespace"
    }

    fn try_match(&self, chunk: &SemanticChunkDraft, doc: &MatchDocument<'_>) -> Option<MatchResult> {
        let normalized_chunk = normalize_whitespace(&chunk.content);
        let (normalized_doc, offset_map) = normalize_with_offset_map(doc.markdown);

        let match_start = normalized_doc.find(normalized_chunk.as_str())?;
        let match_end = match_start + normalized_chunk.len();

        let start_offset = *offset_map.get(match_start)?;
        let end_offset = offset_map
            .get(match_end.saturating_sub(1))
            .map(|o| o + 1)
            .unwrap_or(doc.markdown.len());

        Some(MatchResult {
            start_offset: start_offset as i64,
            end_offset: end_offset as i64,
            position_confidence: PositionConfidence::High,
            position_method: "normalized_whitespace".to_string(),
        })
    }
}

/// Layer 3: bound a region using the chunk's first and last few words as
/// anchors, then accept that region as the placement.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnchorTriangulationLayer;

const ANCHOR_WORDS: usize = 5;

impl MatchLayer for AnchorTriangulationLayer {
    fn name(&self) -> &'static str {
        "anchor_triangulation"
    }

    fn try_match(&self, chunk: &SemanticChunkDraft, doc: &MatchDocument<'_>) -> Option<MatchResult> {
        let words: Vec<&str> = chunk.content.split_whitespace().collect();
        if words.is_empty() {
            return None;
        }

        let head_anchor = words.iter().take(ANCHOR_WORDS).copied().collect::<Vec<_>>().join(" ");
        let tail_anchor = words
            .iter()
            .rev()
            .take(ANCHOR_WORDS)
            .rev()
            .copied()
            .collect::<Vec<_>>()
            .join(" ");

        let (normalized_doc, offset_map) = normalize_with_offset_map(doc.markdown);
        let head_pos = normalized_doc.find(head_anchor.as_str())?;
        let tail_pos = normalized_doc.rfind(tail_anchor.as_str())?;
        if tail_pos < head_pos {
            return None;
        }

        let start_offset = *offset_map.get(head_pos)?;
        let tail_end = tail_pos + tail_anchor.len();
        let end_offset = offset_map
            .get(tail_end.saturating_sub(1))
            .map(|o| o + 1)
            .unwrap_or(doc.markdown.len());

        Some(MatchResult {
            start_offset: start_offset as i64,
            end_offset: end_offset as i64,
            position_confidence: PositionConfidence::High,
            position_method: "anchor_triangulation".to_string(),
        })
    }
}

/// Finds the extractor chunk with the highest word-overlap ratio against
/// `content`, used by the interpolation and gap-fill layers to pick a parent.
fn best_overlapping_extractor_chunk<'a>(
    content: &str,
    doc: &MatchDocument<'a>,
) -> Option<(usize, usize, f64)> {
    let chunk_words: std::collections::HashSet<&str> = content.split_whitespace().collect();
    if chunk_words.is_empty() {
        return None;
    }

    doc.extractor_chunks
        .iter()
        .enumerate()
        .filter_map(|(idx, ec)| {
            let (start, end) = extractor_chunk_offsets(ec, doc.markdown)?;
            let ec_words: std::collections::HashSet<&str> = ec.content.split_whitespace().collect();
            if ec_words.is_empty() {
                return None;
            }
            let shared = chunk_words.intersection(&ec_words).count();
            let score = shared as f64 / chunk_words.len().max(1) as f64;
            Some((idx, start as usize, end as usize, score))
        })
        .filter(|(_, _, _, score)| *score > 0.0)
        .map(|(idx, start, end, score)| (start, end, score))
        .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(start, end, score)| (start, end, score))
}

/// Layer 4: when anchors fail to bound a region, distribute the chunk's
/// offsets proportionally across its best-matching parent extractor chunk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LengthProratedInterpolationLayer;

impl MatchLayer for LengthProratedInterpolationLayer {
    fn name(&self) -> &'static str {
        "length_prorated_interpolation"
    }

    fn try_match(&self, chunk: &SemanticChunkDraft, doc: &MatchDocument<'_>) -> Option<MatchResult> {
        let (parent_start, parent_end, _score) = best_overlapping_extractor_chunk(&chunk.content, doc)?;
        let parent_len = parent_end.saturating_sub(parent_start);
        if parent_len == 0 {
            return None;
        }

        let proposed_len = chunk.content.len().min(parent_len);
        let start_offset = parent_start;
        let end_offset = (parent_start + proposed_len).min(parent_end);

        Some(MatchResult {
            start_offset: start_offset as i64,
            end_offset: end_offset as i64,
            position_confidence: PositionConfidence::Medium,
            position_method: "length_prorated_interpolation".to_string(),
        })
    }
}

/// Layer 5: last resort. Places content that falls in the small whitespace
/// gaps between extractor chunks, or — if no extractor chunk shares any
/// vocabulary at all — falls back to the chunker's own offsets. Always
/// succeeds so every semantic chunk gets a position.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticGapFillLayer;

impl MatchLayer for SyntheticGapFillLayer {
    fn name(&self) -> &'static str {
        "synthetic_gap_fill"
    }

    fn try_match(&self, chunk: &SemanticChunkDraft, doc: &MatchDocument<'_>) -> Option<MatchResult> {
        if let Some((_, parent_end, _)) = best_overlapping_extractor_chunk(&chunk.content, doc) {
            let start_offset = parent_end;
            let end_offset = parent_end + chunk.content.len();
            return Some(MatchResult {
                start_offset: start_offset as i64,
                end_offset: end_offset as i64,
                position_confidence: PositionConfidence::Synthetic,
                position_method: "synthetic_gap_fill".to_string(),
            });
        }

        Some(MatchResult {
            start_offset: chunk.start_offset,
            end_offset: chunk.end_offset,
            position_confidence: PositionConfidence::Synthetic,
            position_method: "synthetic_gap_fill_draft_offsets".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::BBox;

    fn doc_chunk(content: &str) -> SemanticChunkDraft {
        SemanticChunkDraft {
            chunk_index: 0,
            content: content.to_string(),
            start_offset: 0,
            end_offset: 0,
            word_count: content.split_whitespace().count() as i64,
            chunker_type: "semantic_v1".to_string(),
            token_count: content.split_whitespace().count() as i64,
        }
    }

    fn extractor_chunk(content: &str) -> crate::extract::ExtractorChunk {
        crate::extract::ExtractorChunk {
            content: content.to_string(),
            heading_path: Vec::new(),
            heading_level: None,
            section_marker: None,
            page_start: None,
            page_end: None,
            bboxes: Vec::<BBox>::new(),
        }
    }

    #[test]
    fn normalized_layer_recovers_offsets_across_rewrapped_whitespace() {
        let markdown = "Paragraph   with   irregular\nwhitespace   in it.";
        let chunk = doc_chunk("Paragraph with irregular whitespace in it.");
        let extractor_chunks = vec![extractor_chunk(markdown)];
        let doc = MatchDocument {
            markdown,
            extractor_chunks: &extractor_chunks,
        };

        let layer = NormalizedWhitespaceLayer;
        let result = layer.try_match(&chunk, &doc).unwrap();
        assert_eq!(result.position_confidence, PositionConfidence::High);
        assert_eq!(&markdown[result.start_offset as usize..result.end_offset as usize], "Paragraph   with   irregular\nwhitespace   in it.");
    }

    #[test]
    fn anchor_triangulation_bounds_a_region_by_head_and_tail() {
        let markdown = "preamble noise here. head one two three four five middle stuff is irrelevant tail one two three four five trailing noise.";
        let chunk = doc_chunk("head one two three four five middle stuff is irrelevant tail one two three four five");
        let extractor_chunks = vec![extractor_chunk(markdown)];
        let doc = MatchDocument {
            markdown,
            extractor_chunks: &extractor_chunks,
        };

        let layer = AnchorTriangulationLayer;
        let result = layer.try_match(&chunk, &doc).unwrap();
        assert!(result.start_offset < result.end_offset);
    }

    #[test]
    fn gap_fill_always_produces_a_result() {
        let markdown = "anything at all";
        let extractor_chunks = vec![];
        let doc = MatchDocument {
            markdown,
            extractor_chunks: &extractor_chunks,
        };
        let chunk = doc_chunk("totally unrelated text");

        let layer = SyntheticGapFillLayer;
        let result = layer.try_match(&chunk, &doc).unwrap();
        assert_eq!(result.position_confidence, PositionConfidence::Synthetic);
    }
}
