//! Watch Informer gRPC Server
//!
//! A gRPC service that streams Kubernetes watch events for a resource
//! selector to a single client, one session per call.
//!
//! # Example Flow
//!
//! ```text
//! Client                                         Server
//! │                                                │
//! │  WatchRequest{version: "v1", resource: "pod"}  │
//! │ ──────────────────────────────────────────────>│
//! │                                                │  resolve "pod" -> "pods"
//! │                                                │  start feed + pump
//! │       WatchResponse{event_type: "ADD", ...}    │
//! │<────────────────────────────────────────────── │
//! │       WatchResponse{event_type: "UPDATE", ...} │
//! │<────────────────────────────────────────────── │
//! │                                                │
//! │  (cancel / disconnect)                         │
//! │ ──────────────────────────────────────────────>│  stop feed, drop queue
//! ```
//!
//! Sessions are independent: each call gets its own feed, queue and pump.
//! When the client goes away or the server shuts down, the session's feed is
//! stopped and its registry entry removed.

pub mod proto {
    #![allow(missing_docs)]
    #![allow(clippy::doc_markdown)]
    tonic::include_proto!("api");
}

mod config;
mod server;
mod service;

pub use config::{Config, LogFormat, LogLevel, init_logging};
pub use server::InformerServer;
pub use service::InformerService;

// Re-export proto types for convenience
pub use proto::{
    ListSessionsRequest, ListSessionsResponse, WatchRequest, WatchResponse,
    watch_service_client::WatchServiceClient,
    watch_service_server::WatchServiceServer as WatchGrpcServer,
};
