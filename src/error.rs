//! Trackcheck error types

use std::time::Duration;

/// Trackcheck error types
#[derive(Debug, thiserror::Error)]
pub enum TrackcheckError {
    // Network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    // Authentication errors
    /// No valid bearer credential and a live lookup is required.
    ///
    /// Never retried internally; callers should prompt for re-authentication.
    #[error("not authenticated, please authenticate first")]
    AuthenticationRequired,

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    /// The durable storage backend refused a write for lack of space.
    #[error("storage quota exceeded: needed {needed} bytes, {available} available")]
    QuotaExceeded { needed: usize, available: usize },
}

impl TrackcheckError {
    /// Whether retrying the same request may succeed.
    ///
    /// Network failures, rate limits and 5xx responses are transient.
    /// Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            TrackcheckError::Http(_) | TrackcheckError::RateLimited { .. } => true,
            TrackcheckError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TrackcheckError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether this is a storage quota condition.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, TrackcheckError::QuotaExceeded { .. })
    }
}

/// Result type alias for Trackcheck operations
pub type Result<T> = std::result::Result<T, TrackcheckError>;
