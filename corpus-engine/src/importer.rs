//! Vault import (§4.7, C16): reads a previously exported ZIP back into
//! storage, honoring one of three conflict-resolution modes per document
//! and preserving chunk UUIDs so stored annotations reattach.

use std::collections::HashSet;
use std::io::Read;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use uuid::Uuid;
use zip::ZipArchive;

use corpus_storage::db::{annotations, chunks, documents};
use corpus_storage::{DbPool, ObjectStore};

use crate::annotation_recovery::{self, RecoveryCandidate, RecoveryTarget};
use crate::error::{EngineRuntimeError, Result};
use crate::jobs::model::ImportConflictMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub documents_imported: usize,
    pub documents_skipped: usize,
    pub chunks_written: usize,
    pub annotations_recovered: usize,
    pub annotations_lost: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ImportedMetadata {
    document_id: String,
    #[serde(default)]
    title: String,
    #[serde(default = "default_user")]
    user_id: String,
    #[serde(default = "default_source_type")]
    source_type: String,
}

fn default_user() -> String {
    "local-user".to_string()
}

fn default_source_type() -> String {
    "markdown".to_string()
}

#[derive(Debug, Deserialize)]
struct ImportedChunksFile {
    chunks: Vec<ImportedChunk>,
}

#[derive(Debug, Deserialize)]
struct ImportedChunk {
    #[serde(default)]
    id: Option<String>,
    chunk_index: i64,
    content: String,
    start_offset: i64,
    end_offset: i64,
    word_count: i64,
    chunker_type: String,
    token_count: i64,
    page_start: Option<i64>,
    page_end: Option<i64>,
    #[serde(default)]
    heading_path: String,
    heading_level: Option<i64>,
    section_marker: Option<String>,
    #[serde(default)]
    bboxes: String,
    #[serde(default = "default_confidence")]
    position_confidence: String,
    #[serde(default)]
    position_method: String,
    #[serde(default)]
    position_validated: bool,
}

fn default_confidence() -> String {
    "synthetic".to_string()
}

#[derive(Debug, Deserialize)]
struct ImportedAnnotationsFile {
    annotations: Vec<ImportedAnnotation>,
}

#[derive(Debug, Deserialize)]
struct ImportedAnnotation {
    #[serde(default)]
    chunk_id: Option<String>,
    #[serde(default = "default_annotation_type")]
    annotation_type: String,
    start_offset: i64,
    end_offset: i64,
    original_text: String,
    #[serde(default = "default_json_value")]
    content: serde_json::Value,
    #[serde(default = "default_json_value")]
    style: serde_json::Value,
}

fn default_annotation_type() -> String {
    "highlight".to_string()
}

fn default_json_value() -> serde_json::Value {
    serde_json::json!({})
}

/// Imports every top-level document folder found in `archive_path`,
/// applying `conflict_mode` to each.
#[instrument(skip(pool, store))]
pub async fn import_vault(
    pool: &DbPool,
    store: &dyn ObjectStore,
    archive_path: &str,
    conflict_mode: ImportConflictMode,
) -> Result<ImportReport> {
    let file = std::fs::File::open(archive_path)
        .map_err(|e| EngineRuntimeError::Portability(format!("failed to open archive at {archive_path}: {e}")))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| EngineRuntimeError::Portability(format!("failed to read archive: {e}")))?;

    let mut folders: HashSet<String> = HashSet::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| EngineRuntimeError::Portability(format!("failed to read archive entry: {e}")))?;
        if let Some((folder, _)) = entry.name().split_once('/') {
            folders.insert(folder.to_string());
        }
    }

    let mut report = ImportReport::default();

    for folder in folders {
        let metadata: ImportedMetadata = match read_json_entry(&mut archive, &format!("{folder}/metadata.json")) {
            Ok(m) => m,
            Err(err) => {
                report.warnings.push(format!("{folder}: unreadable metadata.json ({err})"));
                continue;
            }
        };
        let chunks_file: ImportedChunksFile = match read_json_entry(&mut archive, &format!("{folder}/chunks.json")) {
            Ok(c) => c,
            Err(err) => {
                report.warnings.push(format!("{folder}: unreadable chunks.json ({err})"));
                continue;
            }
        };
        let content_md = read_bytes_entry(&mut archive, &format!("{folder}/content.md")).unwrap_or_default();

        let document_id = metadata.document_id.clone();
        let already_present = documents::exists(pool, &document_id).await?;

        if already_present && matches!(&conflict_mode, ImportConflictMode::Skip) {
            report.documents_skipped += 1;
            continue;
        }

        let storage_path = corpus_storage::object_store::document_path(&metadata.user_id, &document_id, "content.md");
        store.write(&storage_path, &content_md).await?;

        let source_name = corpus_storage::object_store::source_file_name(&metadata.source_type);
        if let Ok(source_bytes) = read_bytes_entry(&mut archive, &format!("{folder}/{source_name}")) {
            let source_path = corpus_storage::object_store::document_path(&metadata.user_id, &document_id, source_name);
            store.write(&source_path, &source_bytes).await?;
        }

        documents::upsert_with_id(
            pool,
            &document_id,
            documents::NewDocument {
                user_id: metadata.user_id.clone(),
                source_type: metadata.source_type.clone(),
                title: metadata.title.clone(),
                storage_path,
            },
        )
        .await?;

        match &conflict_mode {
            ImportConflictMode::Replace => {
                chunks::delete_for_document(pool, &document_id).await?;
                for imported in &chunks_file.chunks {
                    write_imported_chunk(pool, &document_id, imported).await?;
                    report.chunks_written += 1;
                }
            }
            ImportConflictMode::MergeSmart => {
                let existing = chunks::list_for_document(pool, &document_id).await?;
                let incoming_ids: HashSet<String> = chunks_file
                    .chunks
                    .iter()
                    .filter_map(|c| c.id.clone())
                    .collect();
                for row in &existing {
                    if !incoming_ids.contains(&row.id) {
                        chunks::delete_by_id(pool, &row.id).await?;
                    }
                }
                for imported in &chunks_file.chunks {
                    write_imported_chunk(pool, &document_id, imported).await?;
                    report.chunks_written += 1;
                }
            }
            ImportConflictMode::Skip => {
                for imported in &chunks_file.chunks {
                    write_imported_chunk(pool, &document_id, imported).await?;
                    report.chunks_written += 1;
                }
            }
        }

        if let Ok(annotations_file) =
            read_json_entry::<ImportedAnnotationsFile, _>(&mut archive, &format!("{folder}/annotations.json"))
        {
            let (recovered, lost) =
                recover_annotations(pool, &metadata.user_id, &document_id, annotations_file.annotations).await?;
            report.annotations_recovered += recovered;
            report.annotations_lost += lost;
        }

        report.documents_imported += 1;
    }

    Ok(report)
}

/// Re-anchors every imported annotation against the document's post-import
/// chunk set via the four-tier cascade, persisting each outcome. Returns
/// `(recovered, lost)` counts for the import report.
async fn recover_annotations(
    pool: &DbPool,
    user_id: &str,
    document_id: &str,
    imported: Vec<ImportedAnnotation>,
) -> Result<(usize, usize)> {
    if imported.is_empty() {
        return Ok((0, 0));
    }
    let current_chunks = chunks::list_for_document(pool, document_id).await?;
    let candidates: Vec<RecoveryCandidate> = current_chunks
        .iter()
        .map(|row| RecoveryCandidate { chunk_id: &row.id, chunk_index: row.chunk_index, content: &row.content })
        .collect();

    let mut recovered = 0;
    let mut lost = 0;
    for annotation in &imported {
        let target = RecoveryTarget {
            original_text: &annotation.original_text,
            previous_chunk_id: annotation.chunk_id.as_deref(),
            previous_start_offset: annotation.start_offset,
            previous_end_offset: annotation.end_offset,
        };
        let outcome = annotation_recovery::recover(&target, &candidates);

        let row = annotations::insert(
            pool,
            annotations::NewAnnotation {
                user_id: user_id.to_string(),
                document_id: document_id.to_string(),
                chunk_id: outcome.chunk_id.clone(),
                annotation_type: annotation.annotation_type.clone(),
                start_offset: outcome.start_offset,
                end_offset: outcome.end_offset,
                original_text: annotation.original_text.clone(),
                content: serde_json::to_string(&annotation.content).unwrap_or_else(|_| "{}".to_string()),
                style: serde_json::to_string(&annotation.style).unwrap_or_else(|_| "{}".to_string()),
            },
        )
        .await?;

        annotations::reanchor(
            pool,
            &row.id,
            outcome.chunk_id.as_deref(),
            outcome.start_offset,
            outcome.end_offset,
            outcome.status().as_str(),
            outcome.confidence,
            outcome.method,
        )
        .await?;

        if matches!(outcome.status(), annotation_recovery::SyncStatus::Lost) {
            lost += 1;
        } else {
            recovered += 1;
        }
    }
    Ok((recovered, lost))
}

async fn write_imported_chunk(pool: &DbPool, document_id: &str, imported: &ImportedChunk) -> Result<()> {
    let new_chunk = chunks::NewChunk {
        document_id: document_id.to_string(),
        chunk_index: imported.chunk_index,
        content: imported.content.clone(),
        start_offset: imported.start_offset,
        end_offset: imported.end_offset,
        word_count: imported.word_count,
        chunker_type: imported.chunker_type.clone(),
        token_count: imported.token_count,
        page_start: imported.page_start,
        page_end: imported.page_end,
        heading_path: imported.heading_path.clone(),
        heading_level: imported.heading_level,
        section_marker: imported.section_marker.clone(),
        bboxes: imported.bboxes.clone(),
        position_confidence: imported.position_confidence.clone(),
        position_method: imported.position_method.clone(),
        position_validated: imported.position_validated,
    };

    match &imported.id {
        Some(id) => {
            if Uuid::parse_str(id).is_err() {
                warn!(id, "imported chunk id is not a valid UUID, minting a new one");
                chunks::upsert(pool, new_chunk).await?;
            } else {
                chunks::upsert_with_id(pool, id, new_chunk).await?;
            }
        }
        None => {
            chunks::upsert(pool, new_chunk).await?;
        }
    }
    Ok(())
}

fn read_bytes_entry<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| EngineRuntimeError::Portability(format!("missing archive entry '{name}': {e}")))?;
    let mut buf = Vec::new();
    entry
        .read_to_end(&mut buf)
        .map_err(|e| EngineRuntimeError::Portability(format!("failed to read archive entry '{name}': {e}")))?;
    Ok(buf)
}

fn read_json_entry<T: for<'de> Deserialize<'de>, R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<T> {
    let bytes = read_bytes_entry(archive, name)?;
    serde_json::from_slice(&bytes).map_err(|e| EngineRuntimeError::Portability(format!("malformed '{name}': {e}")))
}
