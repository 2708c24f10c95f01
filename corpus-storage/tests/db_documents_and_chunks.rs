use corpus_storage::db::chunks::{self, NewChunk};
use corpus_storage::db::connections::{self, NewConnection};
use corpus_storage::db::documents::{self, NewDocument};
use corpus_storage::DbPool;

async fn memory_pool() -> DbPool {
    DbPool::connect("sqlite::memory:").await.unwrap()
}

fn sample_chunk(document_id: &str, index: i64) -> NewChunk {
    NewChunk {
        document_id: document_id.to_string(),
        chunk_index: index,
        content: format!("chunk number {index}"),
        start_offset: index * 100,
        end_offset: index * 100 + 50,
        word_count: 10,
        chunker_type: "semantic".to_string(),
        token_count: 12,
        page_start: Some(1),
        page_end: Some(1),
        heading_path: "[]".to_string(),
        heading_level: None,
        section_marker: None,
        bboxes: "[]".to_string(),
        position_confidence: "exact".to_string(),
        position_method: "exact_substring".to_string(),
        position_validated: true,
    }
}

#[tokio::test]
async fn insert_document_then_fetch_round_trips() {
    let pool = memory_pool().await;
    let doc = documents::insert(
        &pool,
        NewDocument {
            user_id: "alice".to_string(),
            source_type: "pdf".to_string(),
            title: "Notes".to_string(),
            storage_path: "alice/doc-1/content.pdf".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(doc.processing_status, "pending");

    let fetched = documents::get(&pool, &doc.id).await.unwrap();
    assert_eq!(fetched.title, "Notes");

    documents::update_status(&pool, &doc.id, "completed")
        .await
        .unwrap();
    let updated = documents::get(&pool, &doc.id).await.unwrap();
    assert_eq!(updated.processing_status, "completed");
}

#[tokio::test]
async fn list_by_user_only_returns_that_users_documents() {
    let pool = memory_pool().await;
    documents::insert(
        &pool,
        NewDocument {
            user_id: "alice".to_string(),
            source_type: "pdf".to_string(),
            title: "A".to_string(),
            storage_path: "alice/doc-a/content.pdf".to_string(),
        },
    )
    .await
    .unwrap();
    documents::insert(
        &pool,
        NewDocument {
            user_id: "bob".to_string(),
            source_type: "pdf".to_string(),
            title: "B".to_string(),
            storage_path: "bob/doc-b/content.pdf".to_string(),
        },
    )
    .await
    .unwrap();

    let alices = documents::list_by_user(&pool, "alice").await.unwrap();
    assert_eq!(alices.len(), 1);
    assert_eq!(alices[0].title, "A");
}

#[tokio::test]
async fn chunk_upsert_is_idempotent_overwrite_not_duplicate() {
    let pool = memory_pool().await;
    let doc = documents::insert(
        &pool,
        NewDocument {
            user_id: "alice".to_string(),
            source_type: "markdown".to_string(),
            title: "Doc".to_string(),
            storage_path: "alice/doc-1/content.md".to_string(),
        },
    )
    .await
    .unwrap();

    chunks::upsert(&pool, sample_chunk(&doc.id, 0)).await.unwrap();
    let mut retry = sample_chunk(&doc.id, 0);
    retry.content = "replaced content after crash-resume".to_string();
    chunks::upsert(&pool, retry).await.unwrap();

    let all = chunks::list_for_document(&pool, &doc.id).await.unwrap();
    assert_eq!(all.len(), 1, "re-running chunking must overwrite, not duplicate");
    assert_eq!(all[0].content, "replaced content after crash-resume");
}

#[tokio::test]
async fn embedding_and_enrichment_updates_are_independent() {
    let pool = memory_pool().await;
    let doc = documents::insert(
        &pool,
        NewDocument {
            user_id: "alice".to_string(),
            source_type: "markdown".to_string(),
            title: "Doc".to_string(),
            storage_path: "alice/doc-1/content.md".to_string(),
        },
    )
    .await
    .unwrap();
    let chunk = chunks::upsert(&pool, sample_chunk(&doc.id, 0)).await.unwrap();

    chunks::update_embedding(&pool, &chunk.id, "[0.1,0.2,0.3]")
        .await
        .unwrap();
    chunks::update_enrichment(
        &pool,
        &chunk.id,
        r#"["memory","grief"]"#,
        Some(0.8),
        Some("a short summary"),
        None,
        None,
        None,
        3,
        "high",
        false,
    )
    .await
    .unwrap();

    let updated = chunks::get_by_document_and_index(&pool, &doc.id, 0)
        .await
        .unwrap();
    assert_eq!(updated.embedding.as_deref(), Some("[0.1,0.2,0.3]"));
    assert_eq!(updated.enrichments_detected, 1);
    assert_eq!(updated.metadata_confidence.as_deref(), Some("high"));
}

#[tokio::test]
async fn connection_upsert_dedupes_by_source_target_engine() {
    let pool = memory_pool().await;
    let doc = documents::insert(
        &pool,
        NewDocument {
            user_id: "alice".to_string(),
            source_type: "markdown".to_string(),
            title: "Doc".to_string(),
            storage_path: "alice/doc-1/content.md".to_string(),
        },
    )
    .await
    .unwrap();
    let c1 = chunks::upsert(&pool, sample_chunk(&doc.id, 0)).await.unwrap();
    let c2 = chunks::upsert(&pool, sample_chunk(&doc.id, 1)).await.unwrap();

    connections::upsert(
        &pool,
        NewConnection {
            source_chunk_id: c1.id.clone(),
            target_chunk_id: c2.id.clone(),
            engine_type: "semantic_similarity".to_string(),
            strength: 0.6,
            connection_type: "similar".to_string(),
            evidence: "shared vocabulary".to_string(),
        },
    )
    .await
    .unwrap();
    connections::upsert(
        &pool,
        NewConnection {
            source_chunk_id: c1.id.clone(),
            target_chunk_id: c2.id.clone(),
            engine_type: "semantic_similarity".to_string(),
            strength: 0.9,
            connection_type: "similar".to_string(),
            evidence: "updated evidence".to_string(),
        },
    )
    .await
    .unwrap();

    let found = connections::list_for_chunk(&pool, &c1.id).await.unwrap();
    assert_eq!(found.len(), 1, "duplicate (source,target,engine) must overwrite");
    assert_eq!(found[0].strength, 0.9);
}

#[tokio::test]
async fn deleting_for_source_document_can_preserve_validated_rows() {
    let pool = memory_pool().await;
    let doc = documents::insert(
        &pool,
        NewDocument {
            user_id: "alice".to_string(),
            source_type: "markdown".to_string(),
            title: "Doc".to_string(),
            storage_path: "alice/doc-1/content.md".to_string(),
        },
    )
    .await
    .unwrap();
    let c1 = chunks::upsert(&pool, sample_chunk(&doc.id, 0)).await.unwrap();
    let c2 = chunks::upsert(&pool, sample_chunk(&doc.id, 1)).await.unwrap();
    let c3 = chunks::upsert(&pool, sample_chunk(&doc.id, 2)).await.unwrap();

    let validated = connections::upsert(
        &pool,
        NewConnection {
            source_chunk_id: c1.id.clone(),
            target_chunk_id: c2.id.clone(),
            engine_type: "semantic_similarity".to_string(),
            strength: 0.7,
            connection_type: "similar".to_string(),
            evidence: "shared vocabulary".to_string(),
        },
    )
    .await
    .unwrap();
    connections::set_validated(&pool, &validated.id, true).await.unwrap();

    connections::upsert(
        &pool,
        NewConnection {
            source_chunk_id: c1.id.clone(),
            target_chunk_id: c3.id.clone(),
            engine_type: "contradiction_detection".to_string(),
            strength: 0.4,
            connection_type: "contradicts".to_string(),
            evidence: "opposing polarity".to_string(),
        },
    )
    .await
    .unwrap();

    let validated_only = connections::list_validated_for_source_document(&pool, &doc.id)
        .await
        .unwrap();
    assert_eq!(validated_only.len(), 1);
    assert_eq!(validated_only[0].id, validated.id);

    connections::delete_for_source_document(&pool, &doc.id, true)
        .await
        .unwrap();
    let remaining = connections::list_for_chunk(&pool, &c1.id).await.unwrap();
    assert_eq!(remaining.len(), 1, "keep_validated must spare the validated row");
    assert_eq!(remaining[0].id, validated.id);

    connections::delete_for_source_document(&pool, &doc.id, false)
        .await
        .unwrap();
    let remaining = connections::list_for_chunk(&pool, &c1.id).await.unwrap();
    assert!(remaining.is_empty(), "without keep_validated every row is purged");
}
