//! Server runner with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use watch_informer::WatchController;

use crate::proto;
use crate::service::InformerService;

/// Server configuration and runner.
#[derive(Debug)]
pub struct InformerServer {
    addr: SocketAddr,
    controller: Arc<WatchController>,
}

impl InformerServer {
    /// Create a server bound to `addr`, running sessions on `controller`.
    pub fn new(addr: SocketAddr, controller: WatchController) -> Self {
        Self {
            addr,
            controller: Arc::new(controller),
        }
    }

    /// Run the server until a shutdown signal arrives.
    ///
    /// On shutdown every open watch session is cancelled before the
    /// transport drains.
    pub async fn run(self) -> Result<(), tonic::transport::Error> {
        let shutdown = CancellationToken::new();
        let service = InformerService::new(Arc::clone(&self.controller), shutdown.clone());

        tracing::info!("Server listening at {}", self.addr);

        tonic::transport::Server::builder()
            .add_service(proto::watch_service_server::WatchServiceServer::new(service))
            .serve_with_shutdown(self.addr, cancel_on(shutdown_signal(), shutdown))
            .await?;

        tracing::info!("gRPC server shut down");
        Ok(())
    }
}

/// Wait for `signal`, then end every session through `shutdown`.
async fn cancel_on(signal: impl Future<Output = &'static str>, shutdown: CancellationToken) {
    let name = signal.await;
    tracing::info!("Received {}, initiating graceful shutdown", name);
    shutdown.cancel();
}

/// Resolves with the name of the first termination signal received.
async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                tracing::error!("Cannot listen for SIGINT: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                tracing::error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    }
}
