//! HTTP server implementation
//!
//! Sets up the Axum HTTP server with:
//! - Portal API routes
//! - Middleware (tracing, timeout, compression)
//! - Graceful shutdown
//! - Health and readiness checks

use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::config::Config;
use crate::repository::MetricsRepository;
use crate::routes::{self, AppState};
use crate::session::SessionStore;
use crate::storage::BlobClient;

/// HTTP server for the review portal
pub struct Server {
    config: Arc<Config>,
    state: AppState,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, blobs: Arc<BlobClient>) -> Result<Self, Box<dyn std::error::Error>> {
        let repository = Arc::new(MetricsRepository::new(
            blobs.clone(),
            config.schemas.clone(),
            &config.portal.metrics_prefix,
            &config.portal.feedback_base_url,
        )?);
        let sessions = Arc::new(SessionStore::from_config(&config.portal));
        let config = Arc::new(config);

        let state = AppState {
            config: config.clone(),
            blobs,
            repository,
            sessions,
        };
        Ok(Self { config, state })
    }

    /// Build the Axum router with all middleware
    fn build_router(&self) -> Router {
        routes::create_router(self.state.clone()).layer(
            ServiceBuilder::new()
                // Add request tracing
                .layer(TraceLayer::new_for_http())
                // Add timeout
                .layer(TimeoutLayer::new(std::time::Duration::from_secs(
                    self.config.server.timeout_secs,
                )))
                // Add compression
                .layer(CompressionLayer::new())
                .into_inner(),
        )
    }

    /// Start the server and run until shutdown signal
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.config.server.bind_address).await?;
        info!(address = %self.config.server.bind_address, "Server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
