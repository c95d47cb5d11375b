//! Role-detail service client module.
//!
//! Submits the role-specific batches collected in wizard phase 2: teaching
//! assignments, the student record, or parent-child links.

mod client;
mod error;

use async_trait::async_trait;

use classreg_protocol::account::AccountRole;
use classreg_protocol::roles::{ParentLink, StudentRecord, TeacherAssignment};

pub use client::RoleDetailClient;
pub use error::{RoleDetailError, RoleDetailResult};

/// Operations the role-detail service exposes to this client.
#[async_trait]
pub trait RoleDetailApi: Send + Sync {
    /// Submit a teacher's staff number and assignment batch.
    async fn submit_teacher_assignments(
        &self,
        account_id: &str,
        role: AccountRole,
        staff_no: &str,
        assignments: &[TeacherAssignment],
    ) -> RoleDetailResult<()>;

    /// Submit the single student record.
    async fn submit_student_record(
        &self,
        account_id: &str,
        role: AccountRole,
        record: &StudentRecord,
    ) -> RoleDetailResult<()>;

    /// Submit a parent's child-link batch.
    async fn submit_parent_links(
        &self,
        account_id: &str,
        role: AccountRole,
        links: &[ParentLink],
    ) -> RoleDetailResult<()>;
}
