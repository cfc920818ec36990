//! Error types for the Ratewindow service.

use std::time::Duration;

use thiserror::Error;

/// Failures raised by a window store adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or no pooled connection was available.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The store rejected or aborted the transaction.
    #[error("store query error: {0}")]
    Query(String),

    /// The store did not answer within the configured response timeout.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcome of a rate limit evaluation that did not admit the request.
///
/// The two variants are deliberately distinct so callers can apply their own
/// policy to infrastructure failures instead of conflating them with denials.
#[derive(Error, Debug)]
pub enum LimitError {
    /// The key has more entries in the current window than allowed.
    #[error("rate limit exceeded")]
    RateLimitExceeded {
        /// Number of entries in the window, including this request.
        observed_count: u64,
        /// Configured maximum requests per window.
        max_requests: u64,
    },

    /// The shared store failed, so no decision could be made.
    #[error("rate limit store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl LimitError {
    /// Whether this is a denial rather than an infrastructure failure.
    pub fn is_exceeded(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }
}

/// Main error type for Ratewindow process-level operations.
#[derive(Error, Debug)]
pub enum RateWindowError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store bootstrap errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for RateWindowError {
    fn from(err: ::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for Ratewindow operations.
pub type Result<T> = std::result::Result<T, RateWindowError>;
