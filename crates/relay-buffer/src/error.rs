//! Relay error types.

use thiserror::Error;

/// Relay error type.
#[derive(Error, Debug)]
pub enum RelayError {
    /// IO error (buffer file open/write/rename/remove)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (record serialization or parsing)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Collector endpoint is not a valid URL
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// A background loop panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),
}

impl RelayError {
    /// Whether retrying the same operation could succeed.
    ///
    /// Storage errors may clear up (disk freed, permissions fixed); a record
    /// that failed to serialize will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::Io(_))
    }
}

/// Result type alias using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;
