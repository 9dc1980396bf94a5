//! Progress events for presentation layers
//!
//! The orchestrator publishes events on a `tokio::sync::broadcast` channel so
//! a front end can show progress without the orchestrator knowing about it.
//! Emitting never blocks: with no subscribers the event is dropped, and a
//! lagging subscriber loses the oldest events first.
//!
//! ```no_run
//! use libautopost::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! if let Ok(Event::PlatformCompleted { result, .. }) = receiver.recv().await {
//!     println!("{} finished", result.platform);
//! }
//! # }
//! ```

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{OverallOutcome, PlatformId, PlatformResult};

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before old events are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A request was accepted and image preparation is starting
    PostingStarted {
        request_id: String,
        platforms: Vec<PlatformId>,
    },

    /// One platform produced its final result
    PlatformCompleted {
        request_id: String,
        result: PlatformResult,
    },

    /// Every platform has reported
    PostingCompleted {
        request_id: String,
        overall: OverallOutcome,
    },

    /// The request failed before any platform was contacted
    PostingFailed { request_id: String, error: String },
}

impl Event {
    pub fn request_id(&self) -> &str {
        match self {
            Event::PostingStarted { request_id, .. }
            | Event::PlatformCompleted { request_id, .. }
            | Event::PostingCompleted { request_id, .. }
            | Event::PostingFailed { request_id, .. } => request_id,
        }
    }
}
