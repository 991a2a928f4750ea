//! Error types for the review portal
//!
//! Storage, authentication and parse failures are kept apart so the HTTP
//! layer can tell a transient outage ("data unavailable") from a corrupt
//! dataset ("data corrupt"). Filter configuration problems never reach the
//! user; they are absorbed where they occur.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Main error type for portal operations
#[derive(Error, Debug)]
pub enum PortalError {
    /// Credentials were resolved but the store rejected them
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Network or transport failure talking to blob storage
    #[error("Storage error: {0}")]
    Storage(String),

    /// The downloaded payload is not a usable metrics table
    #[error("Parse error: {0}")]
    Parse(String),

    /// A filter references a column the loaded table does not have
    #[error("Filter configuration error: column {column} is missing")]
    FilterConfig { column: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PortalError {
    /// Whether repeating the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PortalError::Storage(_))
    }

    /// Stable machine-readable code used in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PortalError::Auth(_) | PortalError::Storage(_) => "data_unavailable",
            PortalError::Parse(_) => "data_corrupt",
            PortalError::FilterConfig { .. } => "filter_unavailable",
            PortalError::InvalidRequest(_) => "invalid_request",
            PortalError::Config(_)
            | PortalError::Internal(_)
            | PortalError::Io(_)
            | PortalError::Serialization(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            PortalError::Auth(_) | PortalError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            PortalError::Parse(_) => StatusCode::BAD_GATEWAY,
            PortalError::InvalidRequest(_) | PortalError::FilterConfig { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<object_store::Error> for PortalError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::UnknownConfigurationKey { .. } => {
                PortalError::Auth(err.to_string())
            }
            object_store::Error::Generic { ref source, .. }
                if rejected_credentials(&**source) =>
            {
                PortalError::Auth(err.to_string())
            }
            other => PortalError::Storage(other.to_string()),
        }
    }
}

/// Whether any error in the chain is a 401/403 answer from the store.
///
/// object_store keeps its HTTP error types private; their messages carry the
/// status as `status 403 Forbidden`.
fn rejected_credentials(err: &(dyn std::error::Error + 'static)) -> bool {
    std::iter::successors(Some(err), |e| e.source()).any(|e| {
        let message = e.to_string();
        message.contains("status 401") || message.contains("status 403")
    })
}

impl From<csv::Error> for PortalError {
    fn from(err: csv::Error) -> Self {
        PortalError::Parse(err.to_string())
    }
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Cause details for outages stay in the logs
            PortalError::Auth(_) | PortalError::Storage(_) => "Data unavailable".to_string(),
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": self.code(),
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PortalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_errors_are_retryable() {
        assert!(PortalError::Storage("timeout".into()).is_retryable());
        assert!(!PortalError::Parse("ragged row".into()).is_retryable());
        assert!(!PortalError::Auth("403".into()).is_retryable());
    }

    #[test]
    fn test_outages_map_to_service_unavailable() {
        let response = PortalError::Storage("connection reset".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = PortalError::Parse("bad utf-8".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[derive(Debug)]
    struct ClientError(&'static str);

    impl std::fmt::Display for ClientError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for ClientError {}

    #[derive(Debug)]
    struct RequestError(ClientError);

    impl std::fmt::Display for RequestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("Error performing get request")
        }
    }

    impl std::error::Error for RequestError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    fn generic(status: &'static str) -> object_store::Error {
        object_store::Error::Generic {
            store: "MicrosoftAzure",
            source: Box::new(RequestError(ClientError(status))),
        }
    }

    #[test]
    fn test_store_rejection_is_auth_error() {
        for status in [
            "Client error with status 403 Forbidden: AuthorizationFailure",
            "Client error with status 401 Unauthorized: No Body",
        ] {
            let err: PortalError = generic(status).into();
            assert!(matches!(err, PortalError::Auth(_)), "{status}");
            assert!(!err.is_retryable());
        }

        let err: PortalError =
            generic("Client error with status 500 Internal Server Error").into();
        assert!(matches!(err, PortalError::Storage(_)));
    }

    #[test]
    fn test_not_found_store_error_is_storage_kind() {
        let err: PortalError = object_store::Error::NotFound {
            path: "metrics/saas/current.csv".into(),
            source: "missing".into(),
        }
        .into();
        assert!(matches!(err, PortalError::Storage(_)));
    }
}
