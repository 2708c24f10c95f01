//! End-to-end exercise of extraction → cleanup → semantic chunking →
//! bulletproof matching, the path the worker's pipeline handler drives
//! stage by stage.

use corpus_ingest::chunk::SemanticChunker;
use corpus_ingest::cleanup::{CleanupStrategy, RegexCleanup};
use corpus_ingest::extract::{Extractor, HtmlExtractor, SourceRef};
use corpus_ingest::matcher::{BulletproofMatcher, MatchDocument, PositionConfidence};

const SAMPLE_HTML: &str = "\
<h1>On Grief</h1>
<p>Grief arrives uninvited and stays as long as it needs to.</p>
<h2>The Stages</h2>
<p>Denial, anger, bargaining, depression, and acceptance rarely arrive in order.</p>
<h2>What Helps</h2>
<p>Naming the feeling out loud, slowly, tends to loosen its grip.</p>
";

#[tokio::test]
async fn full_pipeline_places_every_semantic_chunk() {
    let extractor = HtmlExtractor;
    let extraction = extractor
        .extract(&SourceRef::Html(SAMPLE_HTML.to_string()))
        .await
        .unwrap();
    assert!(!extraction.extractor_chunks.is_empty());

    let cleanup = RegexCleanup::default();
    let cleaned = cleanup.clean(&extraction.markdown).await.unwrap();

    let chunker = SemanticChunker {
        target_tokens: 8,
        chunker_type: "semantic_v1".to_string(),
    };
    let chunking = chunker.chunk(&cleaned.markdown).unwrap();
    assert!(!chunking.chunks.is_empty());

    let doc = MatchDocument {
        markdown: &cleaned.markdown,
        extractor_chunks: &extraction.extractor_chunks,
    };
    let matcher = BulletproofMatcher::default();
    let matched = matcher.match_all(&chunking.chunks, &doc);

    assert_eq!(matched.len(), chunking.chunks.len());
    for chunk in &matched {
        assert!(chunk.draft.start_offset <= chunk.draft.end_offset);
        assert_ne!(chunk.position_method, "");
    }

    // At least one chunk should have recovered heading metadata, since the
    // source has clear heading structure the matcher can overlap against.
    assert!(matched.iter().any(|c| !c.metadata.heading_path.is_empty()));
}

#[tokio::test]
async fn chunks_derived_verbatim_from_markdown_match_exactly() {
    let markdown = "First paragraph of the document.\n\nSecond paragraph follows here.";
    let chunker = SemanticChunker {
        target_tokens: 3,
        chunker_type: "semantic_v1".to_string(),
    };
    let chunking = chunker.chunk(markdown).unwrap();

    let doc = MatchDocument {
        markdown,
        extractor_chunks: &[],
    };
    let matcher = BulletproofMatcher::default();
    let matched = matcher.match_all(&chunking.chunks, &doc);

    for chunk in &matched {
        assert_eq!(chunk.position_confidence, PositionConfidence::Exact);
        let recovered = &markdown[chunk.draft.start_offset as usize..chunk.draft.end_offset as usize];
        assert_eq!(recovered, chunk.draft.content);
    }
}
