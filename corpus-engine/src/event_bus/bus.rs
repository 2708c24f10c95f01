//! Broadcast hub for [`StageEvent`]s.
//!
//! Trimmed from the teacher's `EventHub`/`EventBus`/sink-worker machinery
//! (multi-sink fan-out, lag metrics, blocking iterators) down to the single
//! capability this worker needs: any number of subscribers can watch a
//! `tokio::sync::broadcast` stream of stage events. There is exactly one
//! producer (the worker loop) and subscribers are expected to be cheap,
//! short-lived CLI/watch sessions, so the richer sink-composition surface
//! the teacher built for multi-client streaming servers isn't needed here.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use super::emitter::{EmitterError, EventEmitter};
use super::event::StageEvent;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<StageEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: StageEvent) -> Result<(), EmitterError> {
        // No subscribers is not an error: the pipeline runs fine unobserved.
        let _ = self.sender.send(event);
        Ok(())
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn emitter(self: &Arc<Self>) -> BusEmitter {
        BusEmitter {
            bus: Arc::clone(self),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BusEmitter {
    bus: Arc<EventBus>,
}

impl EventEmitter for BusEmitter {
    fn emit(&self, event: StageEvent) -> Result<(), EmitterError> {
        self.bus.publish(event)
    }
}

pub struct EventStream {
    receiver: broadcast::Receiver<StageEvent>,
}

impl EventStream {
    /// Awaits the next event, transparently skipping past lag
    /// notifications — a slow subscriber misses events rather than
    /// blocking the publisher.
    pub async fn recv(&mut self) -> Option<StageEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = Arc::new(EventBus::default());
        let mut stream = bus.subscribe();
        let job_id = Uuid::new_v4();

        bus.publish(StageEvent::JobClaimed {
            job_id,
            job_type: "process_document".to_string(),
        })
        .unwrap();

        let event = stream.recv().await.unwrap();
        assert_eq!(event.job_id(), Some(job_id));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = EventBus::default();
        let job_id = Uuid::new_v4();
        let result = bus.publish(StageEvent::StageStarted {
            job_id,
            stage: "extraction".to_string(),
        });
        assert!(result.is_ok());
    }
}
