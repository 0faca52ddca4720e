//! Error types for report generation.

use thiserror::Error;

/// Errors that can abort a report pass.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Writing an artifact failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Loading the window failed.
    #[error("metrics error: {0}")]
    Metrics(#[from] hostlens_metrics::MetricsError),

    /// A pipeline rejected its parameters.
    #[error("analytics error: {0}")]
    Analytics(#[from] hostlens_analytics::AnalyticsError),
}

/// Result type alias for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;
