//! Content-addressed object storage and the metadata database for the
//! corpus worker (documents, chunks, connections, background jobs).
//!
//! This crate owns persistence only: no pipeline logic, no job-queue
//! semantics beyond plain row CRUD. `corpus-engine` builds the worker loop
//! and retry policy on top of [`db::jobs`]; `corpus-ingest` and
//! `corpus-connections` write through [`db::chunks`]/[`db::connections`].

pub mod db;
pub mod error;
pub mod object_store;

pub use db::DbPool;
pub use error::{Result, StorageError};
pub use object_store::{checkpoint_hash, document_path, document_prefix, sha256_hex, LocalFsStore, ObjectEntry, ObjectStore};
