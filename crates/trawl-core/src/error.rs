use std::fmt;

use thiserror::Error;

/// Coarse classification used by retry policy and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeouts, 5xx and connection failures. Retried locally.
    Transient,
    /// HTTP 429. Slows the governor down hard.
    RateLimit,
    /// Anything else. Never retried.
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::RateLimit => write!(f, "rate_limit"),
            FailureKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Application-wide error types for Trawl.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed with a status that is not worth retrying.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The server answered with a 5xx status.
    #[error("Server error (HTTP {status}) for {url}")]
    ServerError { status: u16, url: String },

    /// The server answered with HTTP 429.
    #[error("Rate limited by {0}")]
    RateLimited(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Headless browser launch or navigation failed.
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// Reading or writing tabular output failed.
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ServerError { .. }
                | AppError::RateLimited(_)
                | AppError::Timeout(_)
                | AppError::NetworkError(_)
        )
    }

    /// Returns true if this error should slow the rate governor down hard.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AppError::RateLimited(_))
    }

    pub fn failure_kind(&self) -> FailureKind {
        if self.is_rate_limit() {
            FailureKind::RateLimit
        } else if self.is_retryable() {
            FailureKind::Transient
        } else {
            FailureKind::Permanent
        }
    }
}
