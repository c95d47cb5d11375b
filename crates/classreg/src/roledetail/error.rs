//! Role-detail client error types.

use thiserror::Error;

/// Result type for role-detail service operations.
pub type RoleDetailResult<T> = Result<T, RoleDetailError>;

/// Errors that can occur while submitting role details.
#[derive(Debug, Error)]
pub enum RoleDetailError {
    /// The backend rejected the batch with a readable message.
    #[error("role details rejected: {0}")]
    Rejected(String),

    /// The token is no longer accepted.
    #[error("unauthorized")]
    Unauthorized,

    /// HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}
