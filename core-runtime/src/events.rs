//! # Event Bus System
//!
//! Typed events over `tokio::sync::broadcast`, so hosts can observe the core
//! without the core knowing about them.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: one enum per domain, wrapped in [`CoreEvent`]
//! - **EventBus**: the broadcast sender; cheap to clone
//! - **EventStream**: a receiver with an optional filter
//!
//! ```text
//! ┌──────────────┐   emit   ┌──────────┐  subscribe  ┌────────────┐
//! │ Aggregation  ├─────────>│          ├────────────>│ Subscriber │
//! └──────────────┘          │ EventBus │             └────────────┘
//! ┌──────────────┐   emit   │          │  subscribe  ┌────────────┐
//! │ Shuffle      ├─────────>│          ├────────────>│ Subscriber │
//! └──────────────┘          └──────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_library::EntityKind;
//! use core_runtime::events::{AggregationEvent, CoreEvent, EventBus, EventStream};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut failures = EventStream::new(bus.subscribe()).filter(|event| {
//!     matches!(event, CoreEvent::Aggregation(AggregationEvent::SourceFailed { .. }))
//! });
//!
//! bus.emit(CoreEvent::Aggregation(AggregationEvent::SourceFailed {
//!     source: "subsonic:home".to_string(),
//!     kind: EntityKind::Song,
//!     message: "timed out".to_string(),
//! }))
//! .ok();
//!
//! assert!(failures.recv().await.is_ok());
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; keep reading.
//! - **`RecvError::Closed`**: every sender is gone; treat it as shutdown.
//!
//! Emitting with no subscribers returns `Err`; producers ignore it.

use core_library::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Aggregation(AggregationEvent),
    Shuffle(ShuffleEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Aggregation(e) => e.description(),
            CoreEvent::Shuffle(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Aggregation(AggregationEvent::SourceFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Aggregation(AggregationEvent::Merged { .. }) => EventSeverity::Info,
            CoreEvent::Shuffle(ShuffleEvent::SessionStarted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Aggregation Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AggregationEvent {
    /// Loads were dispatched to `sources` (labels of the instances).
    Started {
        kind: EntityKind,
        sources: Vec<String>,
    },
    /// One backend load failed and contributed an empty list.
    SourceFailed {
        source: String,
        kind: EntityKind,
        message: String,
    },
    /// The join completed and produced `output` entities from `input`.
    Merged {
        kind: EntityKind,
        input: usize,
        output: usize,
    },
}

impl AggregationEvent {
    fn description(&self) -> &str {
        match self {
            AggregationEvent::Started { .. } => "Aggregation started",
            AggregationEvent::SourceFailed { .. } => "Source load failed",
            AggregationEvent::Merged { .. } => "Aggregation merged",
        }
    }
}

// ============================================================================
// Shuffle Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ShuffleEvent {
    SessionStarted {
        session_id: i64,
        resumed: bool,
        size: usize,
    },
    /// The permutation wrapped and was rebuilt from `seed`.
    Reseeded {
        session_id: i64,
        seed: i64,
    },
    BatchAppended {
        session_id: i64,
        count: usize,
    },
    Cleared,
}

impl ShuffleEvent {
    fn description(&self) -> &str {
        match self {
            ShuffleEvent::SessionStarted { .. } => "Shuffle session started",
            ShuffleEvent::Reseeded { .. } => "Shuffle reseeded",
            ShuffleEvent::BatchAppended { .. } => "Shuffle batch appended",
            ShuffleEvent::Cleared => "Shuffle cleared",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of subscribers that received the event.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    /// Next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
