//! Checkpoint manager (§4.3, C11): wraps a pause-safe stage output in a
//! hashed envelope, writes it through the object store, and records the
//! resume pointer on the job row.
//!
//! Generalizes the teacher's single `Checkpoint` struct
//! (`runtimes::checkpointer`) — there, one shape serialized every graph
//! step's accumulated state; here every pipeline stage has its own output
//! type, so the envelope is generic over `T` instead of being tied to one
//! state shape.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::instrument;

use corpus_storage::object_store::checkpoint_path;
use corpus_storage::ObjectStore;

use crate::error::{EngineRuntimeError, Result};

/// A pause-safe stage output, wrapped with its own content hash so a
/// resumed worker can tell whether the checkpoint it's about to reuse
/// still matches what's on the job row (§4.3.1, §7's "local recovery").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint<T> {
    pub stage: String,
    pub hash: String,
    pub payload: T,
}

/// The stage a resumed job should re-enter given the last completed
/// pause-safe stage (§4.3.1's resume-mapping table).
pub fn resume_stage_after(completed_stage: &str) -> Option<&'static str> {
    match completed_stage {
        "extraction" => Some("chunking"),
        "cleanup" => Some("chunking"),
        "chunking" => Some("embedding"),
        "embedding" => Some("completion"),
        _ => None,
    }
}

/// Serializes `payload`, hashes it, writes the envelope to
/// `{user}/{document}/stage-{stage}.json`, and returns the envelope so the
/// caller can record `hash`/`path` on the job row via
/// `jobs::save_checkpoint_pointer`.
#[instrument(skip(store, payload))]
pub async fn write_checkpoint<T>(
    store: &dyn ObjectStore,
    user_id: &str,
    document_id: &str,
    stage: &str,
    payload: T,
) -> Result<(Checkpoint<T>, String)>
where
    T: Serialize + DeserializeOwned + Clone,
{
    let payload_bytes = serde_json::to_vec(&payload)
        .map_err(|e| EngineRuntimeError::Portability(format!("checkpoint encode failed: {e}")))?;
    let hash = corpus_storage::object_store::checkpoint_hash(&payload_bytes);

    let envelope = Checkpoint {
        stage: stage.to_string(),
        hash: hash.clone(),
        payload,
    };
    let envelope_bytes = serde_json::to_vec(&envelope)
        .map_err(|e| EngineRuntimeError::Portability(format!("checkpoint encode failed: {e}")))?;

    let path = checkpoint_path(user_id, document_id, stage);
    store.write(&path, &envelope_bytes).await?;
    Ok((envelope, path))
}

/// Reads back a checkpoint envelope and verifies its hash still matches
/// the content — a mismatch means the object was modified out of band
/// (or the hashing scheme changed) and the caller should fall back to
/// re-executing the stage rather than trusting stale data (§7).
#[instrument(skip(store))]
pub async fn read_checkpoint<T>(store: &dyn ObjectStore, path: &str) -> Result<Checkpoint<T>>
where
    T: Serialize + DeserializeOwned,
{
    let bytes = store.read(path).await?;
    let envelope: Checkpoint<T> = serde_json::from_slice(&bytes)
        .map_err(|e| EngineRuntimeError::Portability(format!("checkpoint decode failed: {e}")))?;

    let payload_bytes = serde_json::to_vec(&envelope.payload)
        .map_err(|e| EngineRuntimeError::Portability(format!("checkpoint re-encode failed: {e}")))?;
    let recomputed = corpus_storage::object_store::checkpoint_hash(&payload_bytes);
    if recomputed != envelope.hash {
        return Err(EngineRuntimeError::CheckpointMismatch {
            stage: envelope.stage.clone(),
            expected: envelope.hash.clone(),
            found: recomputed,
        });
    }
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_storage::object_store::LocalFsStore;
    use serde::{Deserialize as De, Serialize as Se};
    use tempfile::tempdir;

    #[derive(Debug, Clone, Se, De, PartialEq)]
    struct SamplePayload {
        chunk_count: usize,
    }

    #[tokio::test]
    async fn write_then_read_round_trips_and_hash_matches() {
        let dir = tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        let (written, path) =
            write_checkpoint(&store, "alice", "doc-1", "chunking", SamplePayload { chunk_count: 7 })
                .await
                .unwrap();

        let read_back: Checkpoint<SamplePayload> = read_checkpoint(&store, &path).await.unwrap();
        assert_eq!(read_back.payload, written.payload);
        assert_eq!(read_back.hash, written.hash);
    }

    #[tokio::test]
    async fn tampered_checkpoint_fails_hash_verification() {
        let dir = tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        let (_, path) =
            write_checkpoint(&store, "alice", "doc-1", "embedding", SamplePayload { chunk_count: 3 })
                .await
                .unwrap();

        let mut tampered: Checkpoint<SamplePayload> = read_checkpoint(&store, &path).await.unwrap();
        tampered.hash = "deadbeefdeadbeef".to_string();
        let bytes = serde_json::to_vec(&tampered).unwrap();
        store.write(&path, &bytes).await.unwrap();

        let result: Result<Checkpoint<SamplePayload>> = read_checkpoint(&store, &path).await;
        assert!(matches!(
            result,
            Err(EngineRuntimeError::CheckpointMismatch { .. })
        ));
    }

    #[test]
    fn resume_mapping_follows_the_stage_table() {
        assert_eq!(resume_stage_after("extraction"), Some("chunking"));
        assert_eq!(resume_stage_after("cleanup"), Some("chunking"));
        assert_eq!(resume_stage_after("chunking"), Some("embedding"));
        assert_eq!(resume_stage_after("embedding"), Some("completion"));
        assert_eq!(resume_stage_after("completion"), None);
    }
}
