//! Change feed backed by the Kubernetes watch API.

use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::Client;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind};
use kube::runtime::{WatchStreamExt, watcher};
use tokio_util::sync::CancellationToken;

use super::tracker::ObjectTracker;
use super::{ChangeFeed, FeedError, FeedHandle, FeedHandler};
use crate::selector::WatchSelector;

/// Watches dynamic objects through a `kube` client.
///
/// Each started feed runs `kube`'s list-then-watch stream, with its default
/// backoff on errors, until the returned [`FeedHandle`] stops it.
#[derive(Clone)]
pub struct KubeFeed {
    client: Client,
}

impl std::fmt::Debug for KubeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeFeed").finish_non_exhaustive()
    }
}

impl KubeFeed {
    /// Create a feed factory using `client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, selector: &WatchSelector) -> Api<DynamicObject> {
        // The kind is informational only; requests are routed by plural name.
        let gvk = GroupVersionKind::gvk(selector.group(), selector.version(), "");
        let resource = ApiResource::from_gvk_with_plural(&gvk, selector.resource());
        if selector.is_cluster_wide() {
            Api::all_with(self.client.clone(), &resource)
        } else {
            Api::namespaced_with(self.client.clone(), selector.namespace(), &resource)
        }
    }
}

impl ChangeFeed for KubeFeed {
    fn start(
        &self,
        selector: &WatchSelector,
        handler: Arc<dyn FeedHandler>,
    ) -> Result<FeedHandle, FeedError> {
        if selector.version().is_empty() {
            return Err(FeedError::InvalidSelector("version is empty".to_string()));
        }
        if selector.resource().is_empty() {
            return Err(FeedError::InvalidSelector("resource is empty".to_string()));
        }

        let api = self.api(selector);
        let key = selector.session_key();
        Ok(FeedHandle::spawn(move |stop| async move {
            tracing::debug!("Feed started for {}", key);
            run_watch(api, handler, stop).await;
            tracing::debug!("Feed stopped for {}", key);
        }))
    }
}

async fn run_watch(
    api: Api<DynamicObject>,
    handler: Arc<dyn FeedHandler>,
    stop: CancellationToken,
) {
    let mut events = pin!(watcher(api, watcher::Config::default()).default_backoff());
    let mut tracker = ObjectTracker::default();

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            next = events.next() => match next {
                Some(Ok(event)) => {
                    for notification in tracker.observe(event) {
                        notification.deliver(handler.as_ref());
                    }
                }
                Some(Err(e)) => tracing::warn!("Watch error, retrying: {}", e),
                None => break,
            },
        }
    }
}
