use std::fmt;

use thiserror::Error;

use super::event::StageEvent;

/// Trait representing an abstract event emitter that pipeline/worker code
/// can clone and hand to a handler without depending on the broadcast hub
/// directly.
pub trait EventEmitter: Send + Sync + fmt::Debug {
    fn emit(&self, event: StageEvent) -> Result<(), EmitterError>;
}

#[derive(Debug, Error)]
pub enum EmitterError {
    #[error("event bus closed")]
    Closed,
}
