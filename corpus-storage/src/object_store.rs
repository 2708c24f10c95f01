//! Content-addressed object storage (C1/C4).
//!
//! Blobs live under a `{user}/{doc}/…` namespace (spec.md §6's storage
//! layout). The store is intentionally a thin trait over a single backend
//! implementation for now (local filesystem); a future S3/GCS backend only
//! needs to satisfy [`ObjectStore`].
//!
//! Grounded on `rag_utils::ingestion::cache::DocumentCache`: the same
//! root-rooted path derivation and `tokio::fs` read/write idiom, generalized
//! from URL-keyed cache entries to the spec's document/stage namespace, and
//! extended with SHA-256 content addressing so repeated writes of identical
//! bytes are detected without a round trip (the `DocumentCache` equivalent
//! only checked "does this path already exist").

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::error::{Result, StorageError};

/// SHA-256 hex digest of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// First 16 hex characters of the SHA-256 digest — the checkpoint-hash
/// format mandated by spec.md's Data Model invariant 7.
pub fn checkpoint_hash(bytes: &[u8]) -> String {
    sha256_hex(bytes)[..16].to_string()
}

/// An entry returned by [`ObjectStore::list_prefix`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub path: String,
    pub size: u64,
}

/// Capability contract for blob storage.
///
/// Paths are always namespace-relative strings, e.g.
/// `"{user}/{doc}/chunks.json"`. Implementations must overwrite on repeated
/// writes to the same path — re-running a pipeline stage after a crash is
/// required to be a safe overwrite, not an append (SPEC_FULL.md §4.8).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    async fn exists(&self, path: &str) -> Result<bool>;
    async fn delete(&self, path: &str) -> Result<()>;
    /// Lists every object whose path starts with `prefix`, e.g. `"{user}/{doc}/"`.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectEntry>>;
}

/// Local filesystem-backed [`ObjectStore`], rooted at a base directory.
///
/// The default backend for a single-user, single-machine deployment; a
/// networked backend would implement the same trait without touching
/// callers.
#[derive(Clone, Debug)]
pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.contains("..") {
            return Err(StorageError::Invariant(format!(
                "refusing path traversal in object path '{path}'"
            )));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl ObjectStore for LocalFsStore {
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    path: path.to_string(),
                    source,
                })?;
        }
        fs::write(&full, bytes)
            .await
            .map_err(|source| StorageError::Io {
                path: path.to_string(),
                source,
            })
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        match fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::ObjectNotFound(path.to_string()))
            }
            Err(source) => Err(StorageError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        Ok(fs::metadata(&full).await.is_ok())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let base = self.resolve(prefix)?;
        let mut out = Vec::new();
        let mut stack = vec![base.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(source) if source.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(StorageError::Io {
                        path: prefix.to_string(),
                        source,
                    })
                }
            };
            while let Some(entry) = entries.next_entry().await.map_err(|source| StorageError::Io {
                path: prefix.to_string(),
                source,
            })? {
                let meta = entry.metadata().await.map_err(|source| StorageError::Io {
                    path: prefix.to_string(),
                    source,
                })?;
                if meta.is_dir() {
                    stack.push(entry.path());
                } else {
                    let rel = entry
                        .path()
                        .strip_prefix(&self.root)
                        .unwrap_or(&entry.path())
                        .to_string_lossy()
                        .replace('\\', "/");
                    out.push(ObjectEntry {
                        path: rel,
                        size: meta.len(),
                    });
                }
            }
        }
        Ok(out)
    }
}

/// Builds the canonical per-document namespace prefix `"{user}/{doc}/"`.
pub fn document_prefix(user_id: &str, document_id: &str) -> String {
    format!("{user_id}/{document_id}/")
}

/// Builds the path for a named artifact within a document's namespace.
pub fn document_path(user_id: &str, document_id: &str, name: &str) -> String {
    format!("{user_id}/{document_id}/{name}")
}

/// Path for a pause-safe stage checkpoint envelope (SPEC_FULL.md §4.3).
pub fn checkpoint_path(user_id: &str, document_id: &str, stage: &str) -> String {
    document_path(user_id, document_id, &format!("stage-{stage}.json"))
}

/// Filename the original, pre-extraction source bytes round-trip under
/// within a document's namespace, keyed off `source_type` (SPEC_FULL.md's
/// storage layout: `source.{pdf|epub|...}` as the opaque upload).
pub fn source_file_name(source_type: &str) -> &'static str {
    match source_type {
        "plain_text" => "source.txt",
        "html" => "source.html",
        "markdown" => "source.md",
        "remote_docling" | "remote_chonkie" => "source.url",
        _ => "source.bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        let path = document_path("alice", "doc-1", "content.md");
        store.write(&path, b"hello world").await.unwrap();
        let bytes = store.read(&path).await.unwrap();
        assert_eq!(bytes, b"hello world");
        assert!(store.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_replaces_content() {
        let dir = tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        let path = document_path("alice", "doc-1", "stage-extraction.json");
        store.write(&path, b"v1").await.unwrap();
        store.write(&path, b"v2").await.unwrap();
        assert_eq!(store.read(&path).await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        let err = store.read("alice/doc-1/missing.json").await.unwrap_err();
        assert!(matches!(err, StorageError::ObjectNotFound(_)));
    }

    #[tokio::test]
    async fn list_prefix_scans_nested_documents() {
        let dir = tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        store
            .write("alice/doc-1/content.md", b"a")
            .await
            .unwrap();
        store
            .write("alice/doc-1/chunks.json", b"b")
            .await
            .unwrap();
        store
            .write("alice/doc-2/content.md", b"c")
            .await
            .unwrap();
        let entries = store.list_prefix("alice/doc-1/").await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn checkpoint_hash_is_16_hex_chars() {
        let h = checkpoint_hash(b"some checkpoint data");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        let result = futures_block_on_write(&store, "../escape");
        assert!(result.is_err());
    }

    fn futures_block_on_write(store: &LocalFsStore, path: &str) -> Result<PathBuf> {
        store.resolve(path)
    }
}
