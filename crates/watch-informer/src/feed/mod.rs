//! Change feeds: list-then-watch subscriptions that report object changes.
//!
//! A [`ChangeFeed`] starts a subscription for a [`WatchSelector`] and calls a
//! [`FeedHandler`] for every created, changed or removed object. The
//! subscription runs on its own task, owned by the returned [`FeedHandle`].
//!
//! Handlers may be called at any time after `start` returns, including
//! immediately and while the session is being torn down. They must not
//! block.

mod tracker;
mod watcher;

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};

use kube::api::DynamicObject;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::selector::WatchSelector;

pub use self::watcher::KubeFeed;

/// Errors from starting a change feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The selector cannot be watched
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    /// The feed client is unusable
    #[error("feed client error: {0}")]
    Client(String),
}

/// Receives the changes a feed observes.
///
/// Each call gets the object's snapshot at the time of the notification.
pub trait FeedHandler: Send + Sync {
    /// An object was created or first listed.
    fn on_created(&self, object: &DynamicObject);
    /// A known object changed. Only the new snapshot is passed.
    fn on_changed(&self, object: &DynamicObject);
    /// An object was removed.
    fn on_removed(&self, object: &DynamicObject);
}

/// A single change, as classified by a feed.
#[derive(Debug, Clone)]
pub enum Notification {
    /// See [`FeedHandler::on_created`].
    Created(DynamicObject),
    /// See [`FeedHandler::on_changed`].
    Changed(DynamicObject),
    /// See [`FeedHandler::on_removed`].
    Removed(DynamicObject),
}

impl Notification {
    /// Hand the notification to `handler`.
    ///
    /// A panicking handler is caught and logged so that one bad callback
    /// cannot take the feed task down with it.
    pub fn deliver(&self, handler: &dyn FeedHandler) {
        let result = catch_unwind(AssertUnwindSafe(|| match self {
            Notification::Created(obj) => handler.on_created(obj),
            Notification::Changed(obj) => handler.on_changed(obj),
            Notification::Removed(obj) => handler.on_removed(obj),
        }));
        if let Err(panic) = result {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("Recovered from panic in feed handler: {}", msg);
        }
    }
}

/// Starts change feeds.
pub trait ChangeFeed: Send + Sync {
    /// Start watching `selector`, reporting changes to `handler`.
    ///
    /// Called once per session. The feed runs until the returned handle is
    /// stopped or dropped.
    fn start(
        &self,
        selector: &WatchSelector,
        handler: std::sync::Arc<dyn FeedHandler>,
    ) -> Result<FeedHandle, FeedError>;
}

/// Owns a running feed task.
///
/// Dropping the handle signals the task to stop without waiting for it.
#[derive(Debug)]
pub struct FeedHandle {
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Spawn a feed task. The task receives the token that signals it to
    /// stop.
    pub fn spawn<F, Fut>(run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stop = CancellationToken::new();
        let task = tokio::spawn(run(stop.clone()));
        Self {
            stop,
            task: Some(task),
        }
    }

    /// Whether the feed task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Signal the feed to stop and wait for its task to exit.
    pub async fn stop(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && e.is_panic()
        {
            tracing::error!("Feed task panicked: {}", e);
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::testing::pod;

    #[derive(Default)]
    struct Counting {
        created: AtomicUsize,
        changed: AtomicUsize,
        removed: AtomicUsize,
    }

    impl FeedHandler for Counting {
        fn on_created(&self, _: &DynamicObject) {
            self.created.fetch_add(1, Ordering::SeqCst);
        }
        fn on_changed(&self, _: &DynamicObject) {
            panic!("boom");
        }
        fn on_removed(&self, _: &DynamicObject) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn deliver_survives_panicking_handler() {
        let handler = Counting::default();
        Notification::Created(pod("a")).deliver(&handler);
        Notification::Changed(pod("a")).deliver(&handler);
        Notification::Removed(pod("a")).deliver(&handler);
        assert_eq!(handler.created.load(Ordering::SeqCst), 1);
        assert_eq!(handler.changed.load(Ordering::SeqCst), 0);
        assert_eq!(handler.removed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_waits_for_task() {
        let exited = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&exited);
        let handle = FeedHandle::spawn(move |stop| async move {
            stop.cancelled().await;
            flag.store(1, Ordering::SeqCst);
        });
        assert!(!handle.is_finished());
        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .unwrap();
        assert_eq!(exited.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_signals_stop() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = FeedHandle::spawn(move |stop| async move {
            stop.cancelled().await;
            let _ = tx.send(());
        });
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .unwrap()
            .unwrap();
    }
}
