//! Watch Informer gRPC Server
//!
//! Streams Kubernetes watch events to gRPC clients, one watch session per
//! call.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use watch_informer::{
    Client, DiscoveryResolver, HeuristicResolver, KubeFeed, ResourceResolver, WatchController,
};
use watch_informer_grpc::{Config, InformerServer, init_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_logging(&config)?;

    let client = Client::try_default()
        .await
        .context("failed to load Kubernetes client configuration")?;

    let resolver: Arc<dyn ResourceResolver> = if config.no_discovery {
        tracing::info!("Discovery disabled, resource names are pluralized mechanically");
        Arc::new(HeuristicResolver)
    } else {
        Arc::new(DiscoveryResolver::new(client.clone()))
    };
    let feed = Arc::new(KubeFeed::new(client));
    let controller = WatchController::new(resolver, feed, config.session_config());

    InformerServer::new(config.addr, controller).run().await?;

    Ok(())
}
