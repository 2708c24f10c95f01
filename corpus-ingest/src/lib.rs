//! Document ingestion pipeline stages: extraction, cleanup, semantic
//! chunking, the bulletproof matcher, metadata enrichment, and embedding.
//!
//! Each stage is a capability trait with one or more local implementations
//! and, where the domain calls for it, a remote capability contract. The
//! worker crate wires these traits into the pipeline handler; this crate
//! has no knowledge of jobs, checkpoints, or persistence.

pub mod chunk;
pub mod cleanup;
pub mod embed;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod matcher;

pub use error::{ErrorKind, IngestError, Result};
