//! Error types for Groombook
//!
//! All errors in the engine are converted to `AppError`. The taxonomy
//! separates conditions that latch for the session (permission denial)
//! from conditions that are retryable on the next call (transient).

use thiserror::Error;

use crate::data::Resource;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur in the
/// engine. Variants map 1:1 to the failure-handling policy applied by
/// the gateway and submission flows.
#[derive(Debug, Error)]
pub enum AppError {
    /// Remote operation rejected by access-control policy.
    ///
    /// Latched per session; never retried. Read paths fall back to the
    /// persisted snapshot, booking write paths propagate.
    #[error("Permission denied for {0}")]
    PermissionDenied(Resource),

    /// Timeout or connectivity loss. Retryable on the next call.
    #[error("Remote unavailable: {0}")]
    Transient(String),

    /// Invalid input (bad status, missing id, malformed fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A conflicting active booking already exists.
    ///
    /// A designed business rule, not a fault. Carries enough detail for
    /// the caller to render a self-correcting message.
    #[error("Duplicate booking for {pet_name} on {date} at {time}")]
    DuplicateBooking {
        pet_name: String,
        date: chrono::NaiveDate,
        time: String,
    },

    /// Local store failure (quota exhausted after eviction retry)
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON encode/decode failure on a path that must not be swallowed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Stable label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::PermissionDenied(_) => "permission_denied",
            AppError::Transient(_) => "transient",
            AppError::Validation(_) => "validation",
            AppError::DuplicateBooking { .. } => "duplicate_booking",
            AppError::Storage(_) => "storage",
            AppError::Serialization(_) => "serialization",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    /// Record this error in the metrics registry.
    pub fn record(&self, operation: &str) {
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL
            .with_label_values(&[self.kind(), operation])
            .inc();
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
