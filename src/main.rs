//! relay-gateway server entry point.
//!
//! Starts the connection pool and the Axum HTTP server with REST and
//! WebSocket endpoints.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use relay_gateway::config::{GatewayConfig, LogFormat};
use relay_gateway::server::{bootstrap, build_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    // Load configuration
    let config = GatewayConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    tracing::info!(addr = %config.listen_addr, relays = config.default_relays.len(), "starting relay-gateway");

    // Start the pool and build the router
    let (app_state, _pool_task) = bootstrap(&config);
    let app = build_app(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
