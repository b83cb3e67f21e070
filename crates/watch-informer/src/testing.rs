//! Test doubles for resolvers, feeds and sinks.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use http::{Request, Response, StatusCode};
use k8s_openapi::api::core::v1::Pod;
use kube::Client;
use kube::api::{ApiResource, DynamicObject};
use kube::client::Body;
use tokio::sync::mpsc;

use crate::event::WireEvent;
use crate::feed::{ChangeFeed, FeedError, FeedHandle, FeedHandler, Notification};
use crate::pump::{EventSink, SinkError};
use crate::resolver::{ResolveError, ResourceResolver};
use crate::selector::WatchSelector;

static INIT_TRACING: Once = Once::new();

pub(crate) fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("watch_informer=debug")
            .with_test_writer()
            .try_init();
    });
}

/// A pod snapshot named `name` in the `default` namespace.
pub(crate) fn pod(name: &str) -> DynamicObject {
    let resource = ApiResource::erase::<Pod>(&());
    let mut obj = DynamicObject::new(name, &resource)
        .within("default")
        .data(serde_json::json!({
            "spec": {"containers": [{"name": "app", "image": "nginx"}]}
        }));
    obj.metadata.uid = Some(format!("uid-{name}"));
    obj
}

/// Path and query of every request a [`mock_client`] served.
pub(crate) type Requests = Arc<Mutex<Vec<String>>>;

/// A client whose API server is `respond`, called with each request's path
/// and query.
pub(crate) fn mock_client<F>(respond: F) -> (Client, Requests)
where
    F: Fn(&str) -> (StatusCode, String) + Send + 'static,
{
    let requests = Requests::default();
    let seen = Arc::clone(&requests);
    let service = tower::service_fn(move |req: Request<Body>| {
        let uri = req
            .uri()
            .path_and_query()
            .map(|p| p.to_string())
            .unwrap_or_default();
        seen.lock().unwrap().push(uri.clone());
        let (status, body) = respond(&uri);
        async move {
            Ok::<_, Infallible>(
                Response::builder()
                    .status(status)
                    .header("content-type", "application/json")
                    .body(Body::from(body.into_bytes()))
                    .unwrap(),
            )
        }
    });
    (Client::new(service, "default"), requests)
}

/// Body of a failed API call.
pub(crate) fn api_failure(code: u16) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Status",
        "status": "Failure",
        "message": "the server is unavailable",
        "reason": "InternalError",
        "code": code,
    })
    .to_string()
}

/// Resolver backed by a fixed name mapping.
pub(crate) struct MockResolver {
    names: HashMap<String, String>,
}

impl MockResolver {
    pub(crate) fn new<'a>(names: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            names: names
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl ResourceResolver for MockResolver {
    async fn resolve(
        &self,
        _group: &str,
        _version: &str,
        name: &str,
    ) -> Result<String, ResolveError> {
        self.names
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))
    }
}

enum Behavior {
    Idle,
    Created(Vec<String>),
    Failing,
}

struct MockFeedInner {
    behavior: Behavior,
    selectors: Mutex<Vec<WatchSelector>>,
    running: AtomicUsize,
}

/// Feed that raises a fixed set of "created" notifications on start and then
/// waits to be stopped.
#[derive(Clone)]
pub(crate) struct MockFeed {
    inner: Arc<MockFeedInner>,
}

impl MockFeed {
    fn with(behavior: Behavior) -> Self {
        Self {
            inner: Arc::new(MockFeedInner {
                behavior,
                selectors: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
            }),
        }
    }

    pub(crate) fn idle() -> Self {
        Self::with(Behavior::Idle)
    }

    pub(crate) fn created<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self::with(Behavior::Created(
            names.into_iter().map(str::to_string).collect(),
        ))
    }

    pub(crate) fn failing() -> Self {
        Self::with(Behavior::Failing)
    }

    pub(crate) fn selectors(&self) -> Vec<WatchSelector> {
        self.inner.selectors.lock().unwrap().clone()
    }

    pub(crate) fn all_stopped(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst) == 0
    }

    pub(crate) async fn wait_stopped(&self) {
        while !self.all_stopped() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl ChangeFeed for MockFeed {
    fn start(
        &self,
        selector: &WatchSelector,
        handler: Arc<dyn FeedHandler>,
    ) -> Result<FeedHandle, FeedError> {
        let names = match &self.inner.behavior {
            Behavior::Failing => {
                return Err(FeedError::Client("feed client is not initialized".into()));
            }
            Behavior::Idle => Vec::new(),
            Behavior::Created(names) => names.clone(),
        };
        self.inner.selectors.lock().unwrap().push(selector.clone());
        self.inner.running.fetch_add(1, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        Ok(FeedHandle::spawn(move |stop| async move {
            for name in names {
                Notification::Created(pod(&name)).deliver(handler.as_ref());
            }
            stop.cancelled().await;
            inner.running.fetch_sub(1, Ordering::SeqCst);
        }))
    }
}

/// Sink that records every event.
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    events: Arc<Mutex<Vec<WireEvent>>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<WireEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&mut self, event: WireEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Sink that forwards events to a channel, reporting `Closed` once the
/// receiver is dropped.
pub(crate) struct ChannelSink {
    tx: mpsc::UnboundedSender<WireEvent>,
}

impl ChannelSink {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<WireEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, event: WireEvent) -> Result<(), SinkError> {
        self.tx.send(event).map_err(|_| SinkError::Closed)
    }
}

#[derive(Default)]
struct FailingState {
    attempts: usize,
    delivered: Vec<WireEvent>,
}

/// Sink that accepts `ok` events, then fails with a transport error.
#[derive(Clone)]
pub(crate) struct FailingSink {
    ok: usize,
    state: Arc<Mutex<FailingState>>,
}

impl FailingSink {
    pub(crate) fn after(ok: usize) -> Self {
        Self {
            ok,
            state: Arc::default(),
        }
    }

    pub(crate) fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub(crate) fn delivered(&self) -> Vec<WireEvent> {
        self.state.lock().unwrap().delivered.clone()
    }
}

#[async_trait]
impl EventSink for FailingSink {
    async fn send(&mut self, event: WireEvent) -> Result<(), SinkError> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        if state.delivered.len() < self.ok {
            state.delivered.push(event);
            Ok(())
        } else {
            Err(SinkError::Transport("connection reset".to_string()))
        }
    }
}
