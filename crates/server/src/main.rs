//! shelter server entry point.
//!
//! Boots the caching agent (install, then activation) and serves it over MCP
//! on stdio transport. Logging goes to stderr to avoid interfering with the
//! JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use shelter_client::{Agent, FetchClient, FetchConfig};
use shelter_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(db_path = %config.db_path.display(), scope = %config.scope, "starting shelter on stdio transport");

    let store = CacheDb::open_with_quota(&config.db_path, config.quota_bytes)
        .await
        .context("opening cache database")?;
    let fetcher = FetchClient::new(FetchConfig::from(&config))?;
    let agent = Arc::new(Agent::from_config(&config, Arc::new(store), Arc::new(fetcher))?);

    let report = agent.install().await.context("installing agent")?;
    tracing::info!(updated = report.updated.len(), not_updated = report.not_updated.len(), "agent installed");

    let deleted = agent.clients_released().await?;
    if !deleted.is_empty() {
        tracing::info!(buckets = ?deleted, "removed outdated buckets");
    }

    let handler = handler::ShelterServer::new(agent);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
