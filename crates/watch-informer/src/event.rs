//! Wire-ready watch events.

use std::fmt;

use serde::Serialize;

/// The kind of change a [`WireEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// An object was created, or seen for the first time in a listing.
    Added,
    /// An object that was already known has a new revision.
    Updated,
    /// An object was removed.
    Removed,
}

impl EventType {
    /// The string sent to clients for this event type.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Added => "ADD",
            EventType::Updated => "UPDATE",
            EventType::Removed => "DELETE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change notification, ready to be written to a client stream.
///
/// The payload is the JSON snapshot of the affected object taken when the
/// change feed reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEvent {
    event_type: EventType,
    payload: String,
}

impl WireEvent {
    /// Create an event from an already serialized payload.
    pub fn new(event_type: EventType, payload: impl Into<String>) -> Self {
        Self {
            event_type,
            payload: payload.into(),
        }
    }

    /// Snapshot `object` as JSON.
    pub fn snapshot<T: Serialize + ?Sized>(
        event_type: EventType,
        object: &T,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_string(object)?;
        Ok(Self::new(event_type, payload))
    }

    /// The kind of change.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// The serialized object.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Split the event into its parts.
    pub fn into_parts(self) -> (EventType, String) {
        (self.event_type, self.payload)
    }
}
