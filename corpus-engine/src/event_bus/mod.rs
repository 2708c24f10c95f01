//! In-process observability channel for stage/engine progress, trimmed
//! from the teacher's fuller event-bus (no multi-sink composition — see
//! `bus.rs` for why that surface isn't needed here).

pub mod bus;
pub mod emitter;
pub mod event;

pub use bus::{BusEmitter, EventBus, EventStream};
pub use emitter::{EmitterError, EventEmitter};
pub use event::StageEvent;
