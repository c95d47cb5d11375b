//! Role-detail service HTTP client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use classreg_protocol::account::AccountRole;
use classreg_protocol::error_message;
use classreg_protocol::roles::{
    ParentLink, ParentLinksRequest, StudentRecord, StudentRecordRequest, TeacherAssignment,
    TeacherAssignmentsRequest, normalize_ack,
};

use crate::auth::SessionHandle;

use super::RoleDetailApi;
use super::error::{RoleDetailError, RoleDetailResult};

/// Default timeout for role-detail requests.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for communicating with the role-detail service.
#[derive(Debug, Clone)]
pub struct RoleDetailClient {
    /// HTTP client.
    client: Client,
    /// Base URL for the platform API.
    base_url: String,
    /// Session context; cleared when the backend answers 401.
    session: SessionHandle,
}

impl RoleDetailClient {
    /// Create a new role-detail client with the default timeout.
    pub fn new(base_url: impl Into<String>, session: SessionHandle) -> Self {
        Self::with_timeout(base_url, session, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a new role-detail client with an explicit timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        session: SessionHandle,
        request_timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            session,
        }
    }

    /// POST a batch and interpret the acknowledgement.
    async fn post_batch<B: serde::Serialize>(&self, path: &str, body: &B) -> RoleDetailResult<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.session.clear();
            return Err(RoleDetailError::Unauthorized);
        }

        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        if status.is_success() && normalize_ack(&body) {
            Ok(())
        } else {
            let message = error_message(&body)
                .unwrap_or_else(|| format!("unexpected status {}", status));
            Err(RoleDetailError::Rejected(message))
        }
    }
}

#[async_trait]
impl RoleDetailApi for RoleDetailClient {
    async fn submit_teacher_assignments(
        &self,
        account_id: &str,
        role: AccountRole,
        staff_no: &str,
        assignments: &[TeacherAssignment],
    ) -> RoleDetailResult<()> {
        let request = TeacherAssignmentsRequest {
            account_id: account_id.to_string(),
            role,
            staff_no: staff_no.to_string(),
            assignments: assignments.to_vec(),
        };
        self.post_batch("/teachers/assignments", &request).await
    }

    async fn submit_student_record(
        &self,
        account_id: &str,
        role: AccountRole,
        record: &StudentRecord,
    ) -> RoleDetailResult<()> {
        let request = StudentRecordRequest {
            account_id: account_id.to_string(),
            role,
            record: record.clone(),
        };
        self.post_batch("/students/records", &request).await
    }

    async fn submit_parent_links(
        &self,
        account_id: &str,
        role: AccountRole,
        links: &[ParentLink],
    ) -> RoleDetailResult<()> {
        let request = ParentLinksRequest {
            account_id: account_id.to_string(),
            role,
            links: links.to_vec(),
        };
        self.post_batch("/parents/links", &request).await
    }
}
