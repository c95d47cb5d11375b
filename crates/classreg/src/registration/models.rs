//! Registration session data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use classreg_protocol::account::AccountRole;
use classreg_protocol::roles::{ParentLink, StudentRecord, TeacherAssignment};

/// Phase 1 input: the base-account form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicInfoForm {
    pub name: String,
    pub email: String,
    pub address: String,
    pub birth_date: String,
    pub contact: String,
    pub role: AccountRole,
    pub username: String,
    pub password: String,
    pub password_confirmation: String,
    pub gender: String,
}

/// One role-detail entry a user can stage before the final submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleDetail {
    /// A teaching assignment row.
    Teacher(TeacherAssignment),
    /// A parent-child link row.
    ParentLink(ParentLink),
}

impl RoleDetail {
    /// The account role this kind of entry belongs to.
    pub fn role(&self) -> AccountRole {
        match self {
            RoleDetail::Teacher(_) => AccountRole::Teacher,
            RoleDetail::ParentLink(_) => AccountRole::Parent,
        }
    }
}

/// A staged entry: a role-detail row added locally but not yet submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedEntry {
    /// Client-generated id, used for removal.
    pub id: Uuid,
    /// The staged row.
    pub detail: RoleDetail,
    /// When the row was staged.
    pub staged_at: DateTime<Utc>,
}

/// Phase 2 input: what accompanies the staged entries at the final submit.
#[derive(Debug, Clone)]
pub enum RoleDetailsForm {
    /// Teacher submit: staff number plus the staged assignment batch.
    Teacher { staff_no: String },
    /// Student submit: the single in-form record (students stage nothing).
    Student { record: StudentRecord },
    /// Parent submit: the staged link batch.
    Parent,
}

/// Which step of the wizard a session is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    /// Phase 1: no backend state exists yet.
    CollectingBasicInfo,
    /// Phase 2: a base account exists and may need compensation.
    CollectingRoleDetails,
    /// Terminal: role details committed.
    Completed,
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseKind::CollectingBasicInfo => write!(f, "collecting-basic-info"),
            PhaseKind::CollectingRoleDetails => write!(f, "collecting-role-details"),
            PhaseKind::Completed => write!(f, "completed"),
        }
    }
}

/// Result of a phase-1 submit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The account was created; the wizard moved to phase 2.
    Advanced,
    /// Another submission was in flight; nothing was sent.
    AlreadySubmitting,
}

/// Result of a phase-2 submit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// Role details committed; the session is finished.
    Completed,
    /// Another submission was in flight; nothing was sent.
    AlreadySubmitting,
}

/// Result of a cancellation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The session was reset to phase 1. `compensated` records whether the
    /// compensating delete was acknowledged; the local reset happens either
    /// way.
    Cancelled { compensated: bool },
    /// There was nothing to cancel (not in phase 2).
    Ignored,
}
