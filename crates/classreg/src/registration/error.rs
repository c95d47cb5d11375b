//! Registration wizard error types.

use thiserror::Error;
use uuid::Uuid;

use classreg_protocol::account::FieldErrors;

use crate::account::AccountError;
use crate::roledetail::RoleDetailError;

/// Result type for wizard operations.
pub type WizardResult<T> = Result<T, WizardError>;

/// Errors surfaced by the registration wizard.
///
/// None of these are fatal: the wizard stays in its current phase and the
/// user can correct the input or retry.
#[derive(Debug, Error)]
pub enum WizardError {
    /// A single input failed local validation.
    #[error("{field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },

    /// The backend rejected the submit with per-field errors.
    #[error("validation failed: {0}")]
    FieldErrors(FieldErrors),

    /// An identical entry is already staged.
    #[error("an identical entry is already staged")]
    DuplicateEntry,

    /// No staged entry has the given id.
    #[error("no staged entry with id {0}")]
    UnknownEntry(Uuid),

    /// The operation is not valid in the wizard's current phase.
    #[error("operation not valid in the current phase")]
    InvalidPhase,

    /// The entry or form does not match the account's role.
    #[error("entry does not match the account role {role}")]
    RoleMismatch { role: String },

    /// The backend could not be reached or answered unexpectedly.
    /// Surfaced as a dismissible notification; the user resubmits.
    #[error("network error: {0}")]
    Transport(String),
}

impl WizardError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        WizardError::Invalid {
            field,
            message: message.into(),
        }
    }

    /// Field-level errors, when this error carries them.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            WizardError::FieldErrors(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<AccountError> for WizardError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(fields) => WizardError::FieldErrors(fields),
            other => WizardError::Transport(other.to_string()),
        }
    }
}

impl From<RoleDetailError> for WizardError {
    fn from(err: RoleDetailError) -> Self {
        WizardError::Transport(err.to_string())
    }
}
