//! Annotation recovery (§4.7, C16): the four-tier cascade used to re-anchor
//! an annotation's [`corpus_storage::db::annotations::AnnotationRow`] after
//! import assigns its document's chunks new IDs. Mirrors
//! [`corpus_ingest::matcher`]'s `MatchLayer` cascade shape — a fixed,
//! ordered list of layers, first one to return a result wins — generalized
//! from chunk-offset recovery to annotation re-anchoring.

/// The annotation being recovered, as last known before import.
#[derive(Debug, Clone)]
pub struct RecoveryTarget<'a> {
    pub original_text: &'a str,
    pub previous_chunk_id: Option<&'a str>,
    pub previous_start_offset: i64,
    pub previous_end_offset: i64,
}

/// One candidate chunk from the document's post-import chunk set.
#[derive(Debug, Clone)]
pub struct RecoveryCandidate<'a> {
    pub chunk_id: &'a str,
    pub chunk_index: i64,
    pub content: &'a str,
}

/// How confidence maps to disposition (§4.7's pinned thresholds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Anchored,
    Review,
    Lost,
}

impl SyncStatus {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.85 {
            SyncStatus::Anchored
        } else if confidence >= 0.75 {
            SyncStatus::Review
        } else {
            SyncStatus::Lost
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Anchored => "anchored",
            SyncStatus::Review => "review",
            SyncStatus::Lost => "lost",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub chunk_id: Option<String>,
    pub start_offset: i64,
    pub end_offset: i64,
    pub confidence: f64,
    pub method: &'static str,
}

impl RecoveryOutcome {
    pub fn status(&self) -> SyncStatus {
        SyncStatus::from_confidence(self.confidence)
    }
}

trait RecoveryLayer {
    fn name(&self) -> &'static str;
    fn try_recover(&self, target: &RecoveryTarget, candidates: &[RecoveryCandidate]) -> Option<RecoveryOutcome>;
}

/// Tier 1: the chunk ID the annotation pointed to still exists post-import
/// (merge_smart preserved it). Always succeeds if present — UUID identity
/// is definitive, no content comparison needed.
struct DirectRestoreLayer;

impl RecoveryLayer for DirectRestoreLayer {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn try_recover(&self, target: &RecoveryTarget, candidates: &[RecoveryCandidate]) -> Option<RecoveryOutcome> {
        let previous_id = target.previous_chunk_id?;
        let hit = candidates.iter().find(|c| c.chunk_id == previous_id)?;
        Some(RecoveryOutcome {
            chunk_id: Some(hit.chunk_id.to_string()),
            start_offset: target.previous_start_offset,
            end_offset: target.previous_end_offset,
            confidence: 1.0,
            method: self.name(),
        })
    }
}

/// Tier 2: `original_text` occurs verbatim in exactly one candidate chunk.
/// A unique hit is strong evidence even though the chunk boundaries moved.
struct ContextMatchLayer;

impl RecoveryLayer for ContextMatchLayer {
    fn name(&self) -> &'static str {
        "context_match"
    }

    fn try_recover(&self, target: &RecoveryTarget, candidates: &[RecoveryCandidate]) -> Option<RecoveryOutcome> {
        if target.original_text.trim().is_empty() {
            return None;
        }
        let mut hits = candidates.iter().filter(|c| c.content.contains(target.original_text));
        let hit = hits.next()?;
        if hits.next().is_some() {
            return None; // ambiguous: more than one chunk contains it verbatim
        }
        let local_offset = hit.content.find(target.original_text)? as i64;
        Some(RecoveryOutcome {
            chunk_id: Some(hit.chunk_id.to_string()),
            start_offset: local_offset,
            end_offset: local_offset + target.original_text.len() as i64,
            confidence: 0.92,
            method: self.name(),
        })
    }
}

/// Tier 3: restrict trigram similarity search to the candidate whose
/// `chunk_index` is closest to where the annotation used to sit, estimated
/// by the fraction of the old chunk list its previous offsets implied.
struct ChunkBoundedMatchLayer;

impl RecoveryLayer for ChunkBoundedMatchLayer {
    fn name(&self) -> &'static str {
        "chunk_bounded"
    }

    fn try_recover(&self, target: &RecoveryTarget, candidates: &[RecoveryCandidate]) -> Option<RecoveryOutcome> {
        if candidates.is_empty() {
            return None;
        }
        let estimated_index = estimated_chunk_index(target, candidates);
        let nearest = candidates
            .iter()
            .min_by_key(|c| (c.chunk_index - estimated_index).abs())?;
        let score = trigram_similarity(target.original_text, nearest.content);
        if score <= 0.0 {
            return None;
        }
        Some(RecoveryOutcome {
            chunk_id: Some(nearest.chunk_id.to_string()),
            start_offset: 0,
            end_offset: nearest.content.len() as i64,
            confidence: (0.6 + score * 0.35).min(0.95),
            method: self.name(),
        })
    }
}

/// Tier 4: trigram similarity against every candidate in the document,
/// no positional restriction. The fallback of last resort before a lost
/// annotation is recorded for manual relinking.
struct TrigramFallbackLayer;

impl RecoveryLayer for TrigramFallbackLayer {
    fn name(&self) -> &'static str {
        "trigram_fallback"
    }

    fn try_recover(&self, target: &RecoveryTarget, candidates: &[RecoveryCandidate]) -> Option<RecoveryOutcome> {
        let best = candidates
            .iter()
            .map(|c| (c, trigram_similarity(target.original_text, c.content)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;
        if best.1 <= 0.0 {
            return None;
        }
        Some(RecoveryOutcome {
            chunk_id: Some(best.0.chunk_id.to_string()),
            start_offset: 0,
            end_offset: best.0.content.len() as i64,
            confidence: best.1.min(0.74),
            method: self.name(),
        })
    }
}

fn estimated_chunk_index(target: &RecoveryTarget, candidates: &[RecoveryCandidate]) -> i64 {
    let previous_span = target.previous_end_offset.max(1);
    let fraction = (target.previous_start_offset as f64 / previous_span as f64).clamp(0.0, 1.0);
    let max_index = candidates.iter().map(|c| c.chunk_index).max().unwrap_or(0) as f64;
    (fraction * max_index).round() as i64
}

/// Character-trigram Jaccard similarity — cheap, dependency-free, and good
/// enough to rank whole-chunk candidates against a short annotation quote.
fn trigram_similarity(a: &str, b: &str) -> f64 {
    let trigrams = |s: &str| -> std::collections::HashSet<[char; 3]> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() < 3 {
            return std::collections::HashSet::new();
        }
        chars.windows(3).map(|w| [w[0], w[1], w[2]]).collect()
    };
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Runs the four-tier cascade, returning the first layer's result, or a
/// zero-confidence `lost` outcome if nothing matched at all (§4.7: lost
/// annotations are retained, never deleted).
pub fn recover(target: &RecoveryTarget, candidates: &[RecoveryCandidate]) -> RecoveryOutcome {
    const LAYERS: &[&dyn RecoveryLayer] =
        &[&DirectRestoreLayer, &ContextMatchLayer, &ChunkBoundedMatchLayer, &TrigramFallbackLayer];

    for layer in LAYERS {
        if let Some(outcome) = layer.try_recover(target, candidates) {
            return outcome;
        }
    }
    RecoveryOutcome {
        chunk_id: None,
        start_offset: target.previous_start_offset,
        end_offset: target.previous_end_offset,
        confidence: 0.0,
        method: "unresolved",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_restore_wins_when_the_chunk_id_survives() {
        let target = RecoveryTarget {
            original_text: "letting go of control",
            previous_chunk_id: Some("chunk-1"),
            previous_start_offset: 10,
            previous_end_offset: 32,
        };
        let candidates = vec![
            RecoveryCandidate { chunk_id: "chunk-0", chunk_index: 0, content: "intro text" },
            RecoveryCandidate { chunk_id: "chunk-1", chunk_index: 1, content: "something about letting go of control here" },
        ];
        let outcome = recover(&target, &candidates);
        assert_eq!(outcome.method, "direct");
        assert_eq!(outcome.chunk_id.as_deref(), Some("chunk-1"));
        assert_eq!(outcome.confidence, 1.0);
        assert_eq!(outcome.status(), SyncStatus::Anchored);
    }

    #[test]
    fn context_match_finds_a_unique_verbatim_quote_in_a_new_chunk() {
        let target = RecoveryTarget {
            original_text: "letting go of control",
            previous_chunk_id: Some("chunk-gone"),
            previous_start_offset: 10,
            previous_end_offset: 32,
        };
        let candidates = vec![
            RecoveryCandidate { chunk_id: "new-0", chunk_index: 0, content: "an unrelated paragraph" },
            RecoveryCandidate { chunk_id: "new-1", chunk_index: 1, content: "this chunk talks about letting go of control explicitly" },
        ];
        let outcome = recover(&target, &candidates);
        assert_eq!(outcome.method, "context_match");
        assert_eq!(outcome.chunk_id.as_deref(), Some("new-1"));
        assert_eq!(outcome.status(), SyncStatus::Anchored);
    }

    #[test]
    fn ambiguous_context_match_falls_through_to_trigram_tiers() {
        let target = RecoveryTarget {
            original_text: "the same phrase",
            previous_chunk_id: Some("chunk-gone"),
            previous_start_offset: 0,
            previous_end_offset: 16,
        };
        let candidates = vec![
            RecoveryCandidate { chunk_id: "new-0", chunk_index: 0, content: "the same phrase repeats here" },
            RecoveryCandidate { chunk_id: "new-1", chunk_index: 1, content: "and the same phrase repeats again" },
        ];
        let outcome = recover(&target, &candidates);
        assert_ne!(outcome.method, "context_match");
    }

    #[test]
    fn nothing_matches_produces_an_unresolved_lost_outcome() {
        let target = RecoveryTarget {
            original_text: "xyz123 nonexistent phrase qqq",
            previous_chunk_id: Some("chunk-gone"),
            previous_start_offset: 0,
            previous_end_offset: 10,
        };
        let candidates = vec![RecoveryCandidate { chunk_id: "new-0", chunk_index: 0, content: "abc def ghi" }];
        let outcome = recover(&target, &candidates);
        assert_eq!(outcome.method, "unresolved");
        assert_eq!(outcome.status(), SyncStatus::Lost);
    }

    #[test]
    fn trigram_similarity_is_one_for_identical_strings() {
        assert_eq!(trigram_similarity("hello world", "hello world"), 1.0);
    }

    #[test]
    fn trigram_similarity_is_zero_for_disjoint_strings() {
        assert_eq!(trigram_similarity("abc", "xyz"), 0.0);
    }
}
