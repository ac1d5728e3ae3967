//! bibcache server entry point.
//!
//! Boots the record cache maintenance server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use bibcache_core::{AppConfig, PlainRenderer, RecordCache};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(db_path = %config.db_path.display(), "Starting bibcache server on stdio transport");

    let cache = RecordCache::open(&config, Arc::new(PlainRenderer)).await?;
    let handler = handler::BibcacheServer::new(cache.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    // Let debounced work scheduled by the last requests finish before exit.
    cache.wait_idle().await;

    Ok(())
}
