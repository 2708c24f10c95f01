//! Job queue, typed payloads, and the retry manager (§4.1, §4.2).

pub mod model;
pub mod queue;
pub mod retry;

pub use model::{
    CleanupStrategyChoice, ContinueProcessingInput, DetectConnectionsInput, ExportDocumentsInput,
    ImportConflictMode, ImportVaultInput, JobInput, JobType, ProcessDocumentInput,
};
pub use queue::ClaimedJob;
