//! Vault export (§4.7, C16): packages one or more documents into a ZIP,
//! one top-level folder per document (`content.md`, `chunks.json`,
//! `metadata.json`, `manifest.json`, `connections.json`,
//! `annotations.json`), with a root `manifest.json` when exporting more
//! than one.

use std::io::Write;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use corpus_storage::db::{annotations, chunks, connections, documents};
use corpus_storage::{DbPool, ObjectStore};

use crate::error::{EngineRuntimeError, Result};
use crate::url_signer::UrlSigner;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    pub version: String,
    pub document_ids: Vec<Uuid>,
    pub archive_path: String,
    pub download_url: String,
}

/// Writes `chunks.json`, `metadata.json`, `manifest.json`, and
/// `connections.json` for each document into one ZIP at
/// `destination_path`, then signs a time-limited download URL for it.
#[instrument(skip(pool, store, signer))]
pub async fn export_documents(
    pool: &DbPool,
    store: &dyn ObjectStore,
    document_ids: &[Uuid],
    destination_path: &str,
    signer: &dyn UrlSigner,
    signed_url_ttl_secs: i64,
) -> Result<ExportManifest> {
    let file = std::fs::File::create(destination_path)
        .map_err(|e| EngineRuntimeError::Portability(format!("failed to create archive at {destination_path}: {e}")))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for document_id in document_ids {
        let document = documents::get(pool, &document_id.to_string()).await?;
        let rows = chunks::list_for_document(pool, &document.id).await?;
        let conn_rows = connections::list_for_document(pool, &document.id).await?;
        let annotation_rows = annotations::list_for_document(pool, &document.id).await?;

        let chunks_json = serde_json::json!({
            "version": "1.0",
            "document_id": document.id,
            "chunks": rows.iter().map(chunk_row_to_json).collect::<Vec<_>>(),
        });
        let metadata_json = serde_json::json!({
            "version": "1.0",
            "document_id": document.id,
            "title": document.title,
            "created_at": document.created_at,
            "processing_mode": document.processing_status,
        });

        let chunks_bytes = serde_json::to_vec_pretty(&chunks_json).unwrap_or_default();
        let metadata_bytes = serde_json::to_vec_pretty(&metadata_json).unwrap_or_default();
        let word_count: i64 = rows.iter().map(|r| r.word_count).sum();
        let processing_time = processing_time_secs(&document.created_at, &document.updated_at);

        let manifest_json = serde_json::json!({
            "version": "1.0",
            "files": {
                "chunks.json": { "size": chunks_bytes.len(), "type": "final" },
                "metadata.json": { "size": metadata_bytes.len(), "type": "final" },
            },
            "chunk_count": rows.len(),
            "connection_count": conn_rows.len(),
            "word_count": word_count,
            "processing_time": processing_time,
            "docling_version": serde_json::Value::Null,
        });
        let connections_json = serde_json::json!({
            "version": "1.0",
            "connections": conn_rows.iter().map(|c| serde_json::json!({
                "id": c.id,
                "source_chunk_id": c.source_chunk_id,
                "target_chunk_id": c.target_chunk_id,
                "engine_type": c.engine_type,
                "strength": c.strength,
                "connection_type": c.connection_type,
                "evidence": c.evidence,
                "user_validated": c.user_validated != 0,
            })).collect::<Vec<_>>(),
        });
        let annotations_json = serde_json::json!({
            "version": "1.0",
            "annotations": annotation_rows.iter().map(|a| serde_json::json!({
                "id": a.id,
                "chunk_id": a.chunk_id,
                "annotation_type": a.annotation_type,
                "start_offset": a.start_offset,
                "end_offset": a.end_offset,
                "original_text": a.original_text,
                "content": serde_json::from_str::<serde_json::Value>(&a.content).unwrap_or_default(),
                "style": serde_json::from_str::<serde_json::Value>(&a.style).unwrap_or_default(),
            })).collect::<Vec<_>>(),
        });

        let content_md_path = corpus_storage::object_store::document_path(&document.user_id, &document.id, "content.md");
        let content_md = store.read(&content_md_path).await.unwrap_or_default();

        let source_name = corpus_storage::object_store::source_file_name(&document.source_type);
        let source_path = corpus_storage::object_store::document_path(&document.user_id, &document.id, source_name);
        let source_bytes = store.read(&source_path).await.ok();

        let folder = document.id.clone();
        if let Some(source_bytes) = &source_bytes {
            write_zip_entry(&mut zip, &format!("{folder}/{source_name}"), source_bytes, options)?;
        }
        write_zip_entry(&mut zip, &format!("{folder}/content.md"), &content_md, options)?;
        write_zip_entry(&mut zip, &format!("{folder}/chunks.json"), &chunks_bytes, options)?;
        write_zip_entry(&mut zip, &format!("{folder}/metadata.json"), &metadata_bytes, options)?;
        write_zip_entry(&mut zip, &format!("{folder}/manifest.json"), serde_json::to_vec_pretty(&manifest_json).unwrap_or_default().as_slice(), options)?;
        write_zip_entry(&mut zip, &format!("{folder}/connections.json"), serde_json::to_vec_pretty(&connections_json).unwrap_or_default().as_slice(), options)?;
        write_zip_entry(&mut zip, &format!("{folder}/annotations.json"), serde_json::to_vec_pretty(&annotations_json).unwrap_or_default().as_slice(), options)?;
    }

    if document_ids.len() > 1 {
        let root_manifest = serde_json::json!({
            "version": "1.0",
            "documents": document_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        });
        write_zip_entry(&mut zip, "manifest.json", serde_json::to_vec_pretty(&root_manifest).unwrap_or_default().as_slice(), options)?;
    }

    zip.finish().map_err(|e| EngineRuntimeError::Portability(format!("failed to finalize archive: {e}")))?;

    let expires_at = Utc::now() + Duration::seconds(signed_url_ttl_secs);
    let download_url = signer.sign(destination_path, expires_at);

    Ok(ExportManifest {
        version: "1.0".to_string(),
        document_ids: document_ids.to_vec(),
        archive_path: destination_path.to_string(),
        download_url,
    })
}

/// `manifest.json`'s `processing_time` for a re-exported document: this
/// crate doesn't persist how long the original pipeline run took, so the
/// best available proxy is the span between document creation and its
/// last status update, which is zero for a document that never finished.
fn processing_time_secs(created_at: &str, updated_at: &str) -> f64 {
    let (Ok(created), Ok(updated)) = (
        chrono::DateTime::parse_from_rfc3339(created_at),
        chrono::DateTime::parse_from_rfc3339(updated_at),
    ) else {
        return 0.0;
    };
    (updated - created).num_milliseconds().max(0) as f64 / 1000.0
}

pub(crate) fn chunk_row_to_json(row: &corpus_storage::db::models::ChunkRow) -> serde_json::Value {
    serde_json::json!({
        "id": row.id,
        "chunk_index": row.chunk_index,
        "content": row.content,
        "start_offset": row.start_offset,
        "end_offset": row.end_offset,
        "word_count": row.word_count,
        "chunker_type": row.chunker_type,
        "token_count": row.token_count,
        "page_start": row.page_start,
        "page_end": row.page_end,
        "heading_path": row.heading_path,
        "heading_level": row.heading_level,
        "section_marker": row.section_marker,
        "bboxes": row.bboxes,
        "position_confidence": row.position_confidence,
        "position_method": row.position_method,
        "position_validated": row.position_validated != 0,
        "themes": row.themes,
        "importance_score": row.importance_score,
        "summary": row.summary,
        "emotional_metadata": row.emotional_metadata,
        "conceptual_metadata": row.conceptual_metadata,
        "domain_metadata": row.domain_metadata,
        "metadata_extracted_at": row.metadata_extracted_at,
        "metadata_overlap_count": row.metadata_overlap_count,
        "metadata_confidence": row.metadata_confidence,
        "metadata_interpolated": row.metadata_interpolated != 0,
    })
}

fn write_zip_entry<W: std::io::Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    bytes: &[u8],
    options: SimpleFileOptions,
) -> Result<()> {
    zip.start_file(name, options)
        .map_err(|e| EngineRuntimeError::Portability(format!("failed to start archive entry '{name}': {e}")))?;
    zip.write_all(bytes)
        .map_err(|e| EngineRuntimeError::Portability(format!("failed to write archive entry '{name}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_storage::db::chunks::{self, NewChunk};
    use corpus_storage::object_store::LocalFsStore;
    use tempfile::tempdir;
    use zip::ZipArchive;

    use crate::url_signer::HmacUrlSigner;

    fn sample_chunk(document_id: &str) -> NewChunk {
        NewChunk {
            document_id: document_id.to_string(),
            chunk_index: 0,
            content: "the quick brown fox".to_string(),
            start_offset: 0,
            end_offset: 19,
            word_count: 4,
            chunker_type: "docling".to_string(),
            token_count: 5,
            page_start: Some(1),
            page_end: Some(1),
            heading_path: "Intro".to_string(),
            heading_level: Some(1),
            section_marker: None,
            bboxes: "[]".to_string(),
            position_confidence: "exact".to_string(),
            position_method: "direct".to_string(),
            position_validated: true,
        }
    }

    #[tokio::test]
    async fn export_writes_one_folder_per_document_with_chunks_and_manifest() {
        let pool = DbPool::connect("sqlite::memory:").await.unwrap();
        let store_dir = tempdir().unwrap();
        let store = LocalFsStore::new(store_dir.path());

        let document = documents::insert(
            &pool,
            documents::NewDocument {
                user_id: "alice".to_string(),
                source_type: "markdown".to_string(),
                title: "Morning pages".to_string(),
                storage_path: corpus_storage::object_store::document_path("alice", "placeholder", "content.md"),
            },
        )
        .await
        .unwrap();
        chunks::upsert(&pool, sample_chunk(&document.id)).await.unwrap();

        let content_path = corpus_storage::object_store::document_path("alice", &document.id, "content.md");
        store.write(&content_path, b"# Morning pages\n\nToday was fine.").await.unwrap();

        let out_dir = tempdir().unwrap();
        let archive_path = out_dir.path().join("export.zip");
        let signer = HmacUrlSigner::new(b"test-secret".to_vec());

        let manifest = export_documents(
            &pool,
            &store,
            &[Uuid::parse_str(&document.id).unwrap()],
            archive_path.to_str().unwrap(),
            &signer,
            900,
        )
        .await
        .unwrap();

        assert_eq!(manifest.document_ids.len(), 1);
        assert!(manifest.download_url.contains("sig="));

        let file = std::fs::File::open(&archive_path).unwrap();
        let mut archive = ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("/chunks.json")));
        assert!(names.iter().any(|n| n.ends_with("/metadata.json")));
        assert!(names.iter().any(|n| n.ends_with("/content.md")));
        assert!(names.iter().any(|n| n.ends_with("/annotations.json")));
        // A single-document export has no root manifest.json.
        assert!(!names.contains(&"manifest.json".to_string()));
    }

    #[tokio::test]
    async fn export_includes_existing_annotations_in_annotations_json() {
        let pool = DbPool::connect("sqlite::memory:").await.unwrap();
        let store_dir = tempdir().unwrap();
        let store = LocalFsStore::new(store_dir.path());

        let document = documents::insert(
            &pool,
            documents::NewDocument {
                user_id: "alice".to_string(),
                source_type: "markdown".to_string(),
                title: "Morning pages".to_string(),
                storage_path: corpus_storage::object_store::document_path("alice", "placeholder", "content.md"),
            },
        )
        .await
        .unwrap();
        let chunk = chunks::upsert(&pool, sample_chunk(&document.id)).await.unwrap();
        annotations::insert(
            &pool,
            annotations::NewAnnotation {
                user_id: "alice".to_string(),
                document_id: document.id.clone(),
                chunk_id: Some(chunk.id.clone()),
                annotation_type: "highlight".to_string(),
                start_offset: 4,
                end_offset: 9,
                original_text: "quick".to_string(),
                content: "{}".to_string(),
                style: "{}".to_string(),
            },
        )
        .await
        .unwrap();

        let content_path = corpus_storage::object_store::document_path("alice", &document.id, "content.md");
        store.write(&content_path, b"the quick brown fox").await.unwrap();

        let out_dir = tempdir().unwrap();
        let archive_path = out_dir.path().join("export.zip");
        let signer = HmacUrlSigner::new(b"test-secret".to_vec());
        export_documents(
            &pool,
            &store,
            &[Uuid::parse_str(&document.id).unwrap()],
            archive_path.to_str().unwrap(),
            &signer,
            900,
        )
        .await
        .unwrap();

        let file = std::fs::File::open(&archive_path).unwrap();
        let mut archive = ZipArchive::new(file).unwrap();
        let entry = archive.by_name(&format!("{}/annotations.json", document.id)).unwrap();
        let parsed: serde_json::Value = serde_json::from_reader(entry).unwrap();
        let annotations = parsed["annotations"].as_array().unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0]["original_text"], "quick");
    }
}
