//! The stream pump: drains a session queue into its outbound sink.

use async_trait::async_trait;
use thiserror::Error;

use crate::event::WireEvent;
use crate::queue::EventReceiver;

/// Errors from writing to an [`EventSink`].
#[derive(Debug, Error)]
pub enum SinkError {
    /// The consumer went away
    #[error("stream closed")]
    Closed,
    /// The write failed
    #[error("transport error: {0}")]
    Transport(String),
}

/// Where a session's events are written, typically an RPC response stream.
#[async_trait]
pub trait EventSink: Send + 'static {
    /// Write one event. Errors are terminal for the session.
    async fn send(&mut self, event: WireEvent) -> Result<(), SinkError>;
}

/// Write events from `queue` to `sink` in order until the queue closes or a
/// write fails.
///
/// Waits while the queue is empty. A failed write is not retried.
pub async fn pump<S: EventSink>(mut queue: EventReceiver, mut sink: S) -> Result<(), SinkError> {
    while let Some(event) = queue.recv().await {
        let event_type = event.event_type();
        if let Err(e) = sink.send(event).await {
            tracing::error!("Failed to send {} event: {}", event_type, e);
            return Err(e);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use crate::queue::{Enqueue, EventQueue};
    use crate::testing::{FailingSink, RecordingSink};

    #[tokio::test]
    async fn delivers_events_in_order() {
        let (queue, rx) = EventQueue::bounded(10);
        for event_type in [EventType::Added, EventType::Updated, EventType::Removed] {
            assert_eq!(
                queue.try_enqueue(WireEvent::new(event_type, "{}")),
                Enqueue::Accepted
            );
        }
        drop(queue);

        let sink = RecordingSink::default();
        pump(rx, sink.clone()).await.unwrap();

        let types: Vec<EventType> = sink.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            [EventType::Added, EventType::Updated, EventType::Removed]
        );
    }

    #[tokio::test]
    async fn stops_at_first_send_failure() {
        let (queue, rx) = EventQueue::bounded(10);
        for n in 0..3 {
            queue.try_enqueue(WireEvent::new(EventType::Added, format!("{n}")));
        }

        let sink = FailingSink::after(1);
        let result = pump(rx, sink.clone()).await;

        assert!(matches!(result, Err(SinkError::Transport(_))));
        assert_eq!(sink.attempts(), 2);
        assert_eq!(sink.delivered().len(), 1);
    }
}
