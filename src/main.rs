//! Swarm Gateway Server
//!
//! Loads configuration, sets up logging, and serves swarm resources over HTTP.

use anyhow::Context;
use std::env;
use std::sync::Arc;
use swarm_gateway::{GatewayConfig, GatewayMetrics, GatewayServer, LocalSwarmEngine, MetricsEndpoint};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Main entry point for the gateway
///
/// # Usage
/// ```bash
/// # Defaults plus PORT / WEBSEED_ROOT / DATA_DIR from the environment
/// swarm-gateway
///
/// # With a config file
/// swarm-gateway /path/to/gateway.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting swarm gateway");

    let config = match env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            GatewayConfig::from_file(&path)
        }
        None => GatewayConfig::from_env(),
    }
    .context("failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  - Web seed root: {}", config.webseed_root);
    info!("  - Data directory: {}", config.data_dir.display());
    info!("  - Trackers: {}", config.trackers.len());
    info!("  - Stream chunk size: {} KB", config.stream_chunk_size / 1024);
    match config.acquisition_timeout_secs {
        Some(secs) => info!("  - Acquisition timeout: {} seconds", secs),
        None => info!("  - Acquisition timeout: none"),
    }

    let metrics = Arc::new(GatewayMetrics::new());

    if let Some(endpoint) = config.metrics_endpoint.as_ref().filter(|m| m.enabled) {
        let addr = endpoint
            .address
            .parse()
            .context("invalid metrics endpoint address")?;
        let metrics_endpoint = MetricsEndpoint::new(Arc::clone(&metrics), addr);
        tokio::spawn(async move {
            if let Err(e) = metrics_endpoint.start().await {
                error!("Metrics endpoint stopped: {}", e);
            }
        });
    }

    let engine = Arc::new(LocalSwarmEngine::new(&config.data_dir, config.stream_chunk_size));
    let server = GatewayServer::new(&config, engine, metrics);
    let addr = config.socket_addr()?;

    server
        .run(addr)
        .await
        .with_context(|| format!("server on {} failed", addr))?;

    info!("Gateway stopped");
    Ok(())
}
