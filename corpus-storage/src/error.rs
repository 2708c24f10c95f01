use thiserror::Error;

/// Errors surfaced by the object store and the metadata database.
///
/// Kept deliberately flat (one enum per crate boundary) so callers in
/// `corpus-engine` can pattern-match without reaching into a nested error
/// tree, mirroring how `weavegraph::channels::errors` keeps a single
/// `LadderError` shape at the node boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found at path '{0}'")]
    ObjectNotFound(String),

    #[error("io error reading/writing '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
