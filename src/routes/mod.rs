//! HTTP routes for the review portal API
//!
//! - GET  /healthz, /ready, /metrics - health checks and Prometheus scrape
//! - GET  /api/environment - deployment and storage info
//! - GET  /api/blobs - container listing
//! - GET  /api/session, PUT /api/session/identity - session identity
//! - GET  /api/metrics/{source} - filtered metrics view
//! - POST /api/metrics/{source}/reload - drop one cached table
//! - POST /api/feedback - feedback intake

mod handlers;

use axum::{
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::Config;
use crate::repository::MetricsRepository;
use crate::session::SessionStore;
use crate::storage::BlobClient;

/// Header carrying the session id in both directions
pub const SESSION_HEADER: &str = "x-session-id";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub blobs: Arc<BlobClient>,
    pub repository: Arc<MetricsRepository>,
    pub sessions: Arc<SessionStore>,
}

/// Query parameters for the metrics view
#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub version: Option<String>,
    pub accuracy: Option<String>,
    pub note_type: Option<String>,
    pub location: Option<String>,
}

/// Query parameters for a forced reload
#[derive(Debug, Default, Deserialize)]
pub struct ReloadQuery {
    pub version: Option<String>,
}

/// Body of an identity switch
#[derive(Debug, Deserialize)]
pub struct IdentityRequest {
    pub name: String,
}

/// Create the portal API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics))
        .route("/api/environment", get(handlers::environment))
        .route("/api/blobs", get(handlers::list_blobs))
        .route("/api/session", get(handlers::get_session))
        .route("/api/session/identity", put(handlers::set_identity))
        .route("/api/metrics/:source", get(handlers::get_metrics))
        .route("/api/metrics/:source/reload", post(handlers::reload_metrics))
        .route("/api/feedback", post(handlers::submit_feedback))
        .with_state(state)
}
