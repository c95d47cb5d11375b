//! Account client error types.

use thiserror::Error;

use classreg_protocol::NormalizeError;
use classreg_protocol::account::FieldErrors;

/// Result type for account service operations.
pub type AccountResult<T> = Result<T, AccountError>;

/// Errors that can occur during account service operations.
#[derive(Debug, Error)]
pub enum AccountError {
    /// The backend rejected the request with per-field validation errors
    /// (e.g. username already taken).
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// Credentials were rejected or the token is no longer accepted.
    #[error("unauthorized")]
    Unauthorized,

    /// The referenced account does not exist.
    #[error("account not found: {0}")]
    NotFound(String),

    /// The backend returned an error response with a readable message.
    #[error("account service error: {0}")]
    Api(String),

    /// HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The response body did not match any known shape.
    #[error("failed to parse response: {0}")]
    Parse(#[from] NormalizeError),
}

impl AccountError {
    /// Field-level errors, when this error carries them.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            AccountError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
