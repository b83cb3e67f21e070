//! Bounded per-session event queue.

use kube::api::DynamicObject;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::event::{EventType, WireEvent};
use crate::feed::FeedHandler;
use crate::selector::SessionKey;

/// Default number of events a session buffers before dropping.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Outcome of offering an event to an [`EventQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    /// The event will be delivered to the consumer.
    Accepted,
    /// The queue was full; the event was discarded.
    Dropped,
    /// The consumer is gone; the event was discarded.
    Closed,
}

/// Producer side of a session's bounded FIFO queue.
///
/// Enqueueing never waits. When the queue is full the new event is dropped,
/// older events are kept.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<WireEvent>,
}

/// Consumer side of an [`EventQueue`].
pub type EventReceiver = mpsc::Receiver<WireEvent>;

impl EventQueue {
    /// Create a queue holding at most `capacity` events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn bounded(capacity: usize) -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Offer an event without blocking.
    pub fn try_enqueue(&self, event: WireEvent) -> Enqueue {
        match self.tx.try_send(event) {
            Ok(()) => Enqueue::Accepted,
            Err(TrySendError::Full(_)) => Enqueue::Dropped,
            Err(TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    /// Number of events waiting for the consumer.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Whether no events are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered events.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Feed handler that turns each notification into a [`WireEvent`] and
/// offers it to a session's queue.
#[derive(Debug)]
pub struct EventForwarder {
    key: SessionKey,
    queue: EventQueue,
}

impl EventForwarder {
    /// Forward events for session `key` into `queue`.
    pub fn new(key: SessionKey, queue: EventQueue) -> Self {
        Self { key, queue }
    }

    fn forward(&self, event_type: EventType, object: &DynamicObject) {
        let event = match WireEvent::snapshot(event_type, object) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(
                    "Failed to serialize {} event for {}: {}",
                    event_type,
                    self.key,
                    e
                );
                return;
            }
        };
        tracing::debug!("EventType: {}, Details: {}", event_type, event.payload());

        match self.queue.try_enqueue(event) {
            Enqueue::Accepted => {}
            Enqueue::Dropped => {
                tracing::warn!(
                    "Event queue is full, dropping {} event for {}",
                    event_type,
                    self.key
                );
            }
            Enqueue::Closed => {
                tracing::debug!("Stream closed, discarding {} event for {}", event_type, self.key);
            }
        }
    }
}

impl FeedHandler for EventForwarder {
    fn on_created(&self, object: &DynamicObject) {
        self.forward(EventType::Added, object);
    }

    fn on_changed(&self, object: &DynamicObject) {
        self.forward(EventType::Updated, object);
    }

    fn on_removed(&self, object: &DynamicObject) {
        self.forward(EventType::Removed, object);
    }
}
