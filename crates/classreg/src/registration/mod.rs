//! Registration wizard module.
//!
//! A two-phase signup flow: phase 1 creates a base account on the backend;
//! phase 2 collects role-specific details and either commits them or, if the
//! user abandons the flow, issues a compensating delete of the phase-1
//! account.

mod error;
mod models;
mod signals;
mod wizard;

pub use error::{WizardError, WizardResult};
pub use models::{
    BasicInfoForm, CancelOutcome, CompleteOutcome, PhaseKind, RoleDetail, RoleDetailsForm,
    StagedEntry, SubmitOutcome,
};
pub use signals::{CancelReason, CancelSignalHub};
pub use wizard::RegistrationWizard;
