use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use aoi_world_server::config::ServerConfig;
use aoi_world_server::metrics::{self, Metrics};
use aoi_world_server::net::server::GameServer;
use aoi_world_server::world::World;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("AOI World Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate().context("Invalid configuration")?;
    info!(
        "Configuration loaded: {}:{}, max_connections={}, pacing={:?}",
        config.bind_address, config.port, config.max_connections, config.world.notify_pacing
    );

    let metrics = Arc::new(Metrics::new());

    if config.metrics_port > 0 {
        let metrics_clone = metrics.clone();
        let metrics_port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let world = Arc::new(World::new(&config.world, metrics.clone())?);
    let server = GameServer::new(config, world.clone(), metrics);

    // Shutdown signal handler
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    info!("Server stopped with {} entities online", world.online_count());

    Ok(())
}
