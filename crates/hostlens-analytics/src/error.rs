//! Error types for the analytics pipelines.
//!
//! Not having enough rows is *not* an error; see [`crate::Outcome`].

use thiserror::Error;

/// Errors raised before a pipeline starts fitting.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyticsError {
    /// A pipeline parameter is out of range.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name as callers know it.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl AnalyticsError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Result type for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;
