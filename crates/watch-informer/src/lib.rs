//! Watch Informer: Kubernetes watches as live event streams
//!
//! This crate turns a cluster resource watch into a live, cancellable,
//! back-pressure-aware stream of [`WireEvent`]s for a single consumer.
//!
//! # Architecture
//!
//! A [`WatchController`] runs one session per consumer:
//!
//! ```text
//! WatchSelector ──> ResourceResolver ──> ChangeFeed ──callbacks──> EventQueue
//!                                                                     │
//!                                      EventSink <──── pump <─────────┘
//! ```
//!
//! - The [`ChangeFeed`] runs a list-then-watch subscription on its own task
//!   and reports created, changed and removed objects to a [`FeedHandler`].
//! - The handler serializes each object into a [`WireEvent`] and offers it
//!   to a bounded [`EventQueue`]. Enqueueing never blocks: when the queue is
//!   full the event is dropped and a warning is logged.
//! - A single pump task drains the queue in order into the session's
//!   [`EventSink`] and stops at the first send failure.
//! - The session ends when its cancellation token fires or the pump stops.
//!   Teardown stops the feed, aborts the pump and removes the session from
//!   the [`SessionRegistry`].

mod event;
mod pump;
mod queue;
mod registry;
mod resolver;
mod selector;
mod session;

pub mod feed;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testing;

pub use event::{EventType, WireEvent};
pub use feed::{ChangeFeed, FeedError, FeedHandle, FeedHandler, KubeFeed, Notification};
pub use pump::{EventSink, SinkError, pump};
pub use queue::{DEFAULT_QUEUE_CAPACITY, Enqueue, EventForwarder, EventQueue, EventReceiver};
pub use registry::{SessionId, SessionRegistry, SessionSnapshot};
pub use resolver::{
    DiscoveryResolver, HeuristicResolver, ResolveError, ResourceResolver, group_version,
};
pub use selector::{SessionKey, WatchSelector, pluralize};
pub use session::{SessionConfig, SessionError, SessionState, WatchController, WatchSession};

/// Re-exported so callers can build a [`KubeFeed`] or [`DiscoveryResolver`]
/// without depending on `kube` directly.
pub use kube::Client;
