//! # corpus-engine: background-job worker
//!
//! Owns the durable job queue (claim/heartbeat/checkpoint/retry), the
//! document-processing pipeline (extraction through connection hand-off),
//! and import/export. `corpus-storage` and `corpus-ingest`/
//! `corpus-connections` hold persistence and domain logic respectively;
//! this crate wires them into one worker loop and a CLI.
//!
//! ## Module guide
//!
//! - [`annotation_recovery`] — the four-tier cascade that re-anchors annotations on import
//! - [`config`] — layered `WorkerConfig` (defaults → file → env → CLI)
//! - [`error`] — [`error::EngineRuntimeError`] and the [`error::Classify`] retry-kind mapping
//! - [`jobs`] — typed job payloads, the queue operations, and the retry manager
//! - [`checkpoint`] — the pause-safe stage checkpoint envelope
//! - [`event_bus`] — in-process `StageEvent` broadcast channel
//! - [`pipeline`] — the `process_document`/`continue_processing` handler and connection hand-off
//! - [`worker`] — the claim/heartbeat/dispatch loop
//! - [`exporter`] / [`importer`] — vault export and import
//! - [`url_signer`] — signed, time-limited export download URLs
//! - [`cli`] — the `corpus-worker` command surface

pub mod annotation_recovery;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod exporter;
pub mod importer;
pub mod jobs;
pub mod pipeline;
pub mod url_signer;
pub mod worker;
