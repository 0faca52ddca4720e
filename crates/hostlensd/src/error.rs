//! Error types for the daemon and its HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hostlens_analytics::{AnalyticsError, InsufficientData};
use hostlens_metrics::MetricsError;
use hostlens_report::ReportError;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Errors that can occur in the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(std::net::SocketAddr, std::io::Error),

    /// The window holds too few rows for the requested pipeline.
    #[error("{0}")]
    InsufficientData(InsufficientData),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Resource not found.
    #[error("{0} not found: {1}")]
    NotFound(String, String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Unusable configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl DaemonError {
    /// HTTP status and machine-readable error type.
    #[must_use]
    pub const fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InsufficientData(_) => (StatusCode::BAD_REQUEST, "insufficient_data"),
            Self::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Self::NotFound(_, _) => (StatusCode::NOT_FOUND, "not_found"),
            Self::BindFailed(_, _) | Self::Internal(_) | Self::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for DaemonError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status();

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":"internal_error","message":"failed to serialize error"}"#.to_string()
        });

        (status, [("content-type", "application/json")], json).into_response()
    }
}

impl From<InsufficientData> for DaemonError {
    fn from(marker: InsufficientData) -> Self {
        Self::InsufficientData(marker)
    }
}

impl From<MetricsError> for DaemonError {
    fn from(err: MetricsError) -> Self {
        match err {
            MetricsError::InvalidWindow { .. } => Self::InvalidRequest(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<AnalyticsError> for DaemonError {
    fn from(err: AnalyticsError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl From<ReportError> for DaemonError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::Metrics(inner) => inner.into(),
            ReportError::Analytics(inner) => inner.into(),
            ReportError::Io(inner) => Self::Internal(inner.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for DaemonError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("worker task failed: {err}"))
    }
}
