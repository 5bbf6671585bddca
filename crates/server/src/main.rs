//! hazardmap server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use hazardmap_core::{AppConfig, CacheStore, SystemClock};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod state;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;

    tracing::info!(
        mode = %config.mode,
        db_path = %config.db_path.display(),
        primary = config.primary_url.is_some(),
        secondary = config.secondary_url.is_some(),
        bundle = config.bundle_path.is_some(),
        "Starting hazardmap server on stdio transport"
    );

    let store = CacheStore::open(&config.db_path).await?;
    let state = state::HazardState::from_config(&config, Some(store), Arc::new(SystemClock))?;
    state.warm_start().await;

    let state = Arc::new(state);
    let handler = handler::HazardMapServer::new(Arc::clone(&state));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    tracing::info!("Transport closed; persisting caches");
    state.persist().await;

    Ok(())
}
