//! Watch sessions: one selector, one feed, one queue, one pump.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::feed::{ChangeFeed, FeedError, FeedHandle};
use crate::pump::{EventSink, SinkError, pump};
use crate::queue::{DEFAULT_QUEUE_CAPACITY, EventForwarder, EventQueue};
use crate::registry::{SessionId, SessionRegistry};
use crate::resolver::ResourceResolver;
use crate::selector::{SessionKey, WatchSelector, pluralize};

/// Errors that end a watch session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The change feed could not be started
    #[error("failed to start change feed: {0}")]
    Feed(#[from] FeedError),
    /// The session's cancellation token fired
    #[error("watch session cancelled")]
    Cancelled,
    /// Writing to the outbound stream failed
    #[error("stream failed: {0}")]
    Stream(#[source] SinkError),
    /// The pump task exited abnormally
    #[error("pump task failed: {0}")]
    Pump(String),
}

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of each session's event queue
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Building the selector from the request.
    Initializing,
    /// Looking up the authoritative resource name.
    Resolving,
    /// Feed and pump are running.
    Streaming,
    /// The session has ended.
    Terminated,
}

/// Runs watch sessions against a resolver and a change feed.
pub struct WatchController {
    resolver: Arc<dyn ResourceResolver>,
    feed: Arc<dyn ChangeFeed>,
    registry: Arc<SessionRegistry>,
    config: SessionConfig,
}

impl std::fmt::Debug for WatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchController")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WatchController {
    /// Create a controller with its own, empty session registry.
    pub fn new(
        resolver: Arc<dyn ResourceResolver>,
        feed: Arc<dyn ChangeFeed>,
        config: SessionConfig,
    ) -> Self {
        Self {
            resolver,
            feed,
            registry: Arc::new(SessionRegistry::new()),
            config,
        }
    }

    /// The registry of this controller's live sessions.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start a session for `selector`, writing events to `sink`.
    ///
    /// Returns once the feed and pump are running. A resolver failure is not
    /// fatal: the session proceeds with the mechanically pluralized name.
    pub async fn open<S: EventSink>(
        &self,
        selector: WatchSelector,
        sink: S,
    ) -> Result<WatchSession, SessionError> {
        let mut state = SessionState::Initializing;
        tracing::trace!("Session state: {:?}", state);

        if selector.version().is_empty() {
            return Err(FeedError::InvalidSelector("version is empty".to_string()).into());
        }
        if selector.resource().is_empty() {
            return Err(FeedError::InvalidSelector("resource is empty".to_string()).into());
        }

        state = SessionState::Resolving;
        tracing::trace!("Session state: {:?}", state);
        let selector = self.resolve(selector).await;
        let key = selector.session_key();
        tracing::info!("Starting watch for {}", key);

        let (queue, events) = EventQueue::bounded(self.config.queue_capacity.max(1));
        let id = self.registry.register(key.clone(), queue.clone());

        let forwarder = Arc::new(EventForwarder::new(key.clone(), queue));
        let feed = match self.feed.start(&selector, forwarder) {
            Ok(feed) => feed,
            Err(e) => {
                tracing::error!("Failed to start feed for {}: {}", key, e);
                self.registry.remove(&key, id);
                return Err(e.into());
            }
        };

        let pump = tokio::spawn(pump(events, sink));
        state = SessionState::Streaming;
        tracing::debug!("Session state: {:?} for {}", state, key);

        Ok(WatchSession {
            key,
            id,
            registry: Arc::clone(&self.registry),
            feed: Some(feed),
            pump,
            state,
        })
    }

    /// Run a whole session: open it and wait until `cancel` fires or the
    /// stream fails.
    pub async fn watch<S: EventSink>(
        &self,
        selector: WatchSelector,
        sink: S,
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        self.open(selector, sink).await?.run(cancel).await
    }

    async fn resolve(&self, selector: WatchSelector) -> WatchSelector {
        match self
            .resolver
            .resolve(selector.group(), selector.version(), selector.resource())
            .await
        {
            Ok(plural) => selector.with_resource(plural),
            Err(e) => {
                let fallback = pluralize(selector.resource());
                tracing::warn!(
                    "Failed to resolve resource {:?}, using {:?}: {}",
                    selector.resource(),
                    fallback,
                    e
                );
                selector.with_resource(fallback)
            }
        }
    }
}

/// A running watch session.
///
/// Dropping the session tears it down without waiting for the feed task;
/// [`WatchSession::run`] waits for it.
#[derive(Debug)]
pub struct WatchSession {
    key: SessionKey,
    id: SessionId,
    registry: Arc<SessionRegistry>,
    feed: Option<FeedHandle>,
    pump: JoinHandle<Result<(), SinkError>>,
    state: SessionState,
}

impl WatchSession {
    /// The session's key.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// The session's lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Wait until `cancel` fires or the pump stops, then tear down.
    ///
    /// Returns `Ok(())` when the consumer closed the stream,
    /// [`SessionError::Cancelled`] on cancellation and
    /// [`SessionError::Stream`] when a write failed.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), SessionError> {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(SessionError::Cancelled),
            result = &mut self.pump => match result {
                Ok(Ok(())) | Ok(Err(SinkError::Closed)) => Ok(()),
                Ok(Err(e)) => Err(SessionError::Stream(e)),
                Err(e) => Err(SessionError::Pump(e.to_string())),
            },
        };
        self.terminate().await;
        match &outcome {
            Ok(()) => tracing::info!("Watch for {} closed by client", self.key),
            Err(e) => tracing::info!("Watch for {} ended: {}", self.key, e),
        }
        outcome
    }

    async fn terminate(&mut self) {
        self.pump.abort();
        if let Some(feed) = self.feed.take() {
            feed.stop().await;
        }
        self.registry.remove(&self.key, self.id);
        self.state = SessionState::Terminated;
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        if self.state != SessionState::Terminated {
            self.pump.abort();
            // Dropping the feed handle signals its task to stop.
            self.feed.take();
            self.registry.remove(&self.key, self.id);
        }
    }
}
