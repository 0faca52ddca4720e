//! Error types for the hostlens-metrics crate.

use thiserror::Error;

/// Errors that can occur in the sample store and its collaborators.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Storage operation failed.
    #[error("storage error: {reason}")]
    Storage {
        /// The reason the storage operation failed.
        reason: String,
    },

    /// The requested lookback window is not a usable duration.
    #[error("invalid window: {reason}")]
    InvalidWindow {
        /// Why the window was rejected.
        reason: String,
    },

    /// Filesystem operation around the store failed.
    #[error("i/o error at {path}: {reason}")]
    Io {
        /// Path the operation touched.
        path: String,
        /// OS error message.
        reason: String,
    },

    /// A stored timestamp could not be parsed back into an instant.
    #[error("invalid stored timestamp '{value}': {reason}")]
    Timestamp {
        /// The raw stored value.
        value: String,
        /// Parser message.
        reason: String,
    },
}

impl From<rusqlite::Error> for MetricsError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage {
            reason: err.to_string(),
        }
    }
}

/// Result type for metrics operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
