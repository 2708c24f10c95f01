use serde::{Deserialize, Serialize};

use super::extractor_chunk_offsets;
use crate::extract::{BBox, ExtractorChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataConfidence {
    High,
    Medium,
    Low,
}

/// Structural metadata merged onto a semantic chunk from its overlapping
/// extractor chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferredMetadata {
    pub overlap_count: i64,
    pub confidence: MetadataConfidence,
    pub interpolated: bool,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub heading_path: Vec<String>,
    pub section_marker: Option<String>,
    pub bboxes: Vec<BBox>,
}

fn longest_common_prefix(paths: &[&Vec<String>]) -> Vec<String> {
    let Some(first) = paths.first() else {
        return Vec::new();
    };
    let mut prefix = (*first).clone();
    for path in &paths[1..] {
        let common_len = prefix
            .iter()
            .zip(path.iter())
            .take_while(|(a, b)| a == b)
            .count();
        prefix.truncate(common_len);
        if prefix.is_empty() {
            break;
        }
    }
    prefix
}

/// Computes the set of overlapping extractor chunks' merged metadata for one
/// semantic chunk's offset range. `overlapping` must already be filtered to
/// chunks whose recomputed offsets overlap `[chunk_start, chunk_end)`.
pub fn transfer_metadata(
    overlapping: &[&ExtractorChunk],
    markdown: &str,
    chunk_start: i64,
    chunk_end: i64,
) -> TransferredMetadata {
    if overlapping.is_empty() {
        return TransferredMetadata {
            overlap_count: 0,
            confidence: MetadataConfidence::Low,
            interpolated: true,
            page_start: None,
            page_end: None,
            heading_path: Vec::new(),
            section_marker: None,
            bboxes: Vec::new(),
        };
    }

    let chunk_len = (chunk_end - chunk_start).max(1);

    // Overlap length for each extractor chunk against the semantic chunk's
    // range, used both for the covering-fraction confidence calculation and
    // the single-source tie-break (largest overlap, then earliest start).
    let mut overlap_lengths: Vec<(i64, i64, &ExtractorChunk)> = overlapping
        .iter()
        .filter_map(|ec| {
            let (ec_start, ec_end) = extractor_chunk_offsets(ec, markdown)?;
            let overlap_start = ec_start.max(chunk_start);
            let overlap_end = ec_end.min(chunk_end);
            let overlap_len = (overlap_end - overlap_start).max(0);
            Some((overlap_len, ec_start, *ec))
        })
        .collect();

    overlap_lengths.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let covered: i64 = {
        // Union length covered by overlaps, not a naive sum (overlaps can
        // overlap each other too in principle, though in practice extractor
        // chunks are disjoint).
        let mut intervals: Vec<(i64, i64)> = overlap_lengths
            .iter()
            .filter_map(|(_, _, ec)| {
                let (s, e) = extractor_chunk_offsets(ec, markdown)?;
                Some((s.max(chunk_start), e.min(chunk_end)))
            })
            .collect();
        intervals.sort();
        let mut merged_len = 0i64;
        let mut cursor: Option<(i64, i64)> = None;
        for (s, e) in intervals.drain(..) {
            match cursor {
                None => cursor = Some((s, e)),
                Some((cs, ce)) if s <= ce => cursor = Some((cs, ce.max(e))),
                Some((cs, ce)) => {
                    merged_len += ce - cs;
                    cursor = Some((s, e));
                }
            }
        }
        if let Some((cs, ce)) = cursor {
            merged_len += ce - cs;
        }
        merged_len
    };

    let coverage_fraction = covered as f64 / chunk_len as f64;
    let confidence = if coverage_fraction >= 0.9 {
        MetadataConfidence::High
    } else if coverage_fraction >= 0.5 {
        MetadataConfidence::Medium
    } else {
        MetadataConfidence::Low
    };

    let page_start = overlapping.iter().filter_map(|ec| ec.page_start).min();
    let page_end = overlapping.iter().filter_map(|ec| ec.page_end).max();

    let heading_paths: Vec<&Vec<String>> = overlapping.iter().map(|ec| &ec.heading_path).collect();
    let heading_path = longest_common_prefix(&heading_paths);

    let bboxes: Vec<BBox> = overlapping.iter().flat_map(|ec| ec.bboxes.clone()).collect();

    // Single-source tie-break field: pick from the largest-overlap chunk,
    // ties broken by earliest start_offset (already the sort order above).
    let section_marker = overlap_lengths
        .first()
        .and_then(|(_, _, ec)| ec.section_marker.clone());

    TransferredMetadata {
        overlap_count: overlapping.len() as i64,
        confidence,
        interpolated: false,
        page_start,
        page_end,
        heading_path,
        section_marker,
        bboxes,
    }
}
