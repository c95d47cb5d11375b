//! Reference-data client error types.

use thiserror::Error;

use classreg_protocol::NormalizeError;

/// Result type for reference-data operations.
pub type ReferenceResult<T> = Result<T, ReferenceError>;

/// Errors that can occur while fetching reference data.
#[derive(Debug, Error)]
pub enum ReferenceError {
    /// The backend returned an error response.
    #[error("reference data error: {0}")]
    Api(String),

    /// The token is no longer accepted.
    #[error("unauthorized")]
    Unauthorized,

    /// HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The response body did not match any known shape.
    #[error("failed to parse response: {0}")]
    Parse(#[from] NormalizeError),
}
