//! Review portal - metrics retrieval and presentation backend
//!
//! Serves the JSON API behind the clinical review portal: AI-processed
//! document metrics are loaded from Azure Blob Storage (connection string or
//! managed identity), cached per browser session, and filtered and shaped for
//! display on each request.

mod cache;
mod config;
mod errors;
mod feedback;
mod metrics;
mod presentation;
mod repository;
mod routes;
mod schema;
mod server;
mod session;
mod storage;
mod table;

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::server::Server;
use crate::storage::BlobClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from environment and optional config file
    let config = Config::from_env()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    crate::metrics::init_metrics()?;

    info!(environment = %config.environment, "Starting review portal");
    info!(?config, "Configuration loaded");

    // Connection is established lazily on first use
    let blobs = Arc::new(BlobClient::new(config.storage.clone()));

    let server = Server::new(config.clone(), blobs)?;

    // Handle graceful shutdown
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Received shutdown signal");
    };

    info!("Server starting on {}", config.server.bind_address);
    if let Err(e) = server.start(shutdown_signal).await {
        error!(error = %e, "Server error");
        return Err(e);
    }

    info!("Server shutdown complete");
    Ok(())
}
