//! Request handlers for the portal API

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::cache::{CacheKey, VersionKey};
use crate::errors::{PortalError, Result};
use crate::feedback::{self, FeedbackSubmission};
use crate::presentation::{render_view, Choice, FilterSelection};
use crate::routes::{AppState, IdentityRequest, MetricsQuery, ReloadQuery, SESSION_HEADER};
use crate::schema::Source;
use crate::session::SessionContext;

fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
}

fn session(state: &AppState, headers: &HeaderMap) -> Result<Arc<SessionContext>> {
    let (session, _created) = state.sessions.get_or_create(session_id(headers))?;
    Ok(session)
}

/// JSON response that echoes the session id header
fn respond<T: Serialize>(session: &SessionContext, body: T) -> Response {
    let mut response = Json(body).into_response();
    if let Ok(value) = HeaderValue::from_str(&session.id().to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(SESSION_HEADER), value);
    }
    response
}

fn cache_key(source: &str, version: Option<&str>) -> Result<CacheKey> {
    let source = Source::from_str(source)?;
    let version = match version.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => VersionKey::parse(v)?,
        None => VersionKey::default(),
    };
    Ok(CacheKey::new(source, version))
}

/// Health check endpoint
#[instrument]
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check: the configured blob must be reachable
#[instrument(skip(state))]
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let blob = &state.config.storage.blob_name;
    if state.blobs.exists(blob).await {
        (StatusCode::OK, "Ready")
    } else {
        warn!(blob = %blob, "Readiness check failed");
        (StatusCode::SERVICE_UNAVAILABLE, "Data file not found")
    }
}

/// Prometheus metrics endpoint
#[instrument]
pub async fn metrics() -> Result<String> {
    crate::metrics::render().map_err(|e| PortalError::Internal(e.to_string()))
}

/// Deployment and storage info shown in the portal sidebar
#[instrument(skip(state))]
pub async fn environment(State(state): State<AppState>) -> impl IntoResponse {
    let storage = state.blobs.config();
    let blob_found = state.blobs.exists(&storage.blob_name).await;
    Json(json!({
        "environment": state.config.environment,
        "storage_account": storage.account_name,
        "container": storage.container_name,
        "blob_name": storage.blob_name,
        "blob_found": blob_found,
        "auth": state.blobs.strategy().kind(),
    }))
}

/// Container listing, used when troubleshooting missing data
#[instrument(skip(state))]
pub async fn list_blobs(State(state): State<AppState>) -> Result<Response> {
    let blobs = state.blobs.list().await.map_err(|e| {
        error!(error = %e, "Blob listing failed");
        e
    })?;
    Ok(Json(json!({ "blobs": blobs })).into_response())
}

/// Current session identity and the selectable roster
#[instrument(skip(state, headers))]
pub async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let session = session(&state, &headers)?;
    let body = json!({
        "session_id": session.id(),
        "identity": session.identity(),
        "roster": state.sessions.roster(),
    });
    Ok(respond(&session, body))
}

/// Switch the session identity; cached tables are dropped on change
#[instrument(skip(state, headers))]
pub async fn set_identity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IdentityRequest>,
) -> Result<Response> {
    let session = session(&state, &headers)?;
    let changed = session.set_identity(request.name.trim(), state.sessions.roster())?;
    let body = json!({
        "identity": session.identity(),
        "changed": changed,
    });
    Ok(respond(&session, body))
}

/// Filtered metrics view for one source and version
#[instrument(skip(state, headers))]
pub async fn get_metrics(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Query(params): Query<MetricsQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let key = cache_key(&source, params.version.as_deref())?;
    let session = session(&state, &headers)?;
    let identity = session.identity();

    let table = session
        .cache()
        .get(&key, &identity, state.repository.as_ref())
        .await
        .map_err(|e| {
            error!(%key, error = %e, retryable = e.is_retryable(), "Metrics unavailable");
            e
        })?;

    let selection = FilterSelection {
        accuracy_level: Choice::parse(params.accuracy.as_deref()),
        note_type: Choice::parse(params.note_type.as_deref()),
        hospital_or_tenant: Choice::parse(params.location.as_deref()),
    };
    let schema = state.repository.schemas().get(key.source);
    let view = render_view(&table, schema, &selection);
    info!(%key, empty = view.is_empty(), "Metrics view rendered");

    Ok(respond(&session, view))
}

/// Drop one cached table so the next view refetches it
#[instrument(skip(state, headers))]
pub async fn reload_metrics(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Query(params): Query<ReloadQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let key = cache_key(&source, params.version.as_deref())?;
    let session = session(&state, &headers)?;
    let invalidated = session.cache().invalidate_key(&key);
    Ok(respond(&session, json!({ "key": key, "invalidated": invalidated })))
}

/// Feedback intake (acknowledged, not stored)
#[instrument(skip(state, headers, submission))]
pub async fn submit_feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(submission): Json<FeedbackSubmission>,
) -> Result<Response> {
    let session = session(&state, &headers)?;
    let receipt = feedback::submit(&session.identity(), &submission)?;
    Ok(respond(&session, receipt))
}
