//! gRPC implementation of the WatchService.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use watch_informer::{
    EventSink, SessionError, SinkError, WatchController, WatchSelector, WireEvent,
};

use crate::proto::{
    self, ListSessionsRequest, ListSessionsResponse, SessionInfo, WatchRequest, WatchResponse,
};

/// Responses buffered between a session's pump and the transport. The
/// session queue does the real buffering; this only hands events over.
const OUTBOUND_BUFFER: usize = 1;

type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchResponse, Status>> + Send>>;

/// The WatchService implementation.
#[derive(Clone, Debug)]
pub struct InformerService {
    controller: Arc<WatchController>,
    shutdown: CancellationToken,
}

impl InformerService {
    /// Create a service running sessions on `controller`.
    ///
    /// Cancelling `shutdown` ends every session.
    pub fn new(controller: Arc<WatchController>, shutdown: CancellationToken) -> Self {
        Self {
            controller,
            shutdown,
        }
    }
}

#[tonic::async_trait]
impl proto::watch_service_server::WatchService for InformerService {
    type WatchStream = WatchStream;

    async fn watch(
        &self,
        request: Request<WatchRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let req = request.into_inner();
        if req.version.trim().is_empty() {
            return Err(Status::invalid_argument("version is required"));
        }
        if req.resource.trim().is_empty() {
            return Err(Status::invalid_argument("resource is required"));
        }

        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let sink = GrpcSink { tx: tx.clone() };
        let session = self
            .controller
            .open(WatchSelector::from(req), sink)
            .await
            .map_err(|e| open_status(&e))?;

        // A session ends on server shutdown or when the client goes away.
        let cancel = self.shutdown.child_token();
        tokio::spawn(cancel_on_disconnect(tx.clone(), cancel.clone()));

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let outcome = session.run(cancel.clone()).await;
            if let Err(e) = &outcome
                && let Some(status) = terminal_status(e, shutdown.is_cancelled())
            {
                send_terminal(&tx, status);
            }
            cancel.cancel();
        });

        let stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream) as Self::WatchStream))
    }

    async fn list_sessions(
        &self,
        _request: Request<ListSessionsRequest>,
    ) -> Result<Response<ListSessionsResponse>, Status> {
        let sessions = self
            .controller
            .registry()
            .snapshot()
            .into_iter()
            .map(|s| SessionInfo {
                key: s.key.to_string(),
                queue_depth: u64::try_from(s.queue_depth).unwrap_or(u64::MAX),
                age_ms: u64::try_from(s.age.as_millis()).unwrap_or(u64::MAX),
            })
            .collect();
        Ok(Response::new(ListSessionsResponse { sessions }))
    }
}

/// Cancel `cancel` once the response stream's receiver is dropped.
///
/// Returns early if the session is cancelled first, so this task never keeps
/// the stream open on its own.
async fn cancel_on_disconnect(
    tx: mpsc::Sender<Result<WatchResponse, Status>>,
    cancel: CancellationToken,
) {
    tokio::select! {
        () = tx.closed() => {
            tracing::debug!("Client disconnected");
            cancel.cancel();
        }
        () = cancel.cancelled() => {}
    }
}

/// Queue `status` as the last item of the stream without waiting for the
/// client to make room. Returns whether it was queued.
fn send_terminal(tx: &mpsc::Sender<Result<WatchResponse, Status>>, status: Status) -> bool {
    match tx.try_send(Err(status)) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::debug!("Client is not reading, terminal status dropped");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

fn open_status(err: &SessionError) -> Status {
    match err {
        SessionError::Feed(e) => Status::failed_precondition(e.to_string()),
        other => Status::internal(other.to_string()),
    }
}

/// The status to end the stream with, if the client can still receive one.
fn terminal_status(err: &SessionError, shutting_down: bool) -> Option<Status> {
    match err {
        SessionError::Cancelled if shutting_down => {
            Some(Status::unavailable("server is shutting down"))
        }
        SessionError::Cancelled => Some(Status::cancelled(err.to_string())),
        SessionError::Stream(_) => None,
        SessionError::Feed(_) | SessionError::Pump(_) => Some(Status::internal(err.to_string())),
    }
}

/// Writes session events to a response stream.
#[derive(Debug)]
struct GrpcSink {
    tx: mpsc::Sender<Result<WatchResponse, Status>>,
}

#[async_trait]
impl EventSink for GrpcSink {
    async fn send(&mut self, event: WireEvent) -> Result<(), SinkError> {
        self.tx
            .send(Ok(event.into()))
            .await
            .map_err(|_| SinkError::Closed)
    }
}

impl From<WireEvent> for WatchResponse {
    fn from(event: WireEvent) -> Self {
        let (event_type, details) = event.into_parts();
        Self {
            event_type: event_type.as_str().to_string(),
            details,
        }
    }
}

impl From<WatchRequest> for WatchSelector {
    fn from(req: WatchRequest) -> Self {
        WatchSelector::normalized(req.group, req.version, req.resource, req.namespace)
    }
}
