mod auth;
mod cache;
mod config;
mod discovery;
mod error;
mod generate;
mod graph;
mod logs;
mod server;

use std::sync::Arc;

use rmcp::transport::stdio;
use rmcp::ServiceExt;

use auth::{ClientSecretCredential, TokenCache};
use cache::SchemaCache;
use discovery::SchemaDiscoveryService;
use graph::GraphClient;
use logs::LogsClient;
use server::LogAnalyticsMcpServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Write structured logs to stderr so stdout stays clean for MCP JSON-RPC.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_env("RUST_LOG")
                .add_directive("loganalytics_mcp_server=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "Starting loganalytics-mcp-server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = config::Config::from_env()?;

    let http = reqwest::Client::new();
    let credential = Arc::new(ClientSecretCredential::new(
        http.clone(),
        config.tenant_id.clone(),
        config.client_id.clone(),
        config.client_secret.clone(),
    ));

    let service = SchemaDiscoveryService::new(
        TokenCache::new(&config.token_cache_dir, credential),
        SchemaCache::new(&config.schema_cache_dir),
        Arc::new(LogsClient::new(http.clone(), config.workspace_id.clone())),
        Arc::new(GraphClient::new(http)),
    );
    let server = LogAnalyticsMcpServer::new(service);

    let transport = stdio();

    tracing::info!("MCP server listening on stdio");

    let running = server.serve(transport).await?;
    running.waiting().await?;

    Ok(())
}
