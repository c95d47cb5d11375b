//! Reference-data service HTTP client.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use classreg_protocol::error_message;
use classreg_protocol::reference::{Grade, SchoolClass, Subject, normalize_list};

use crate::auth::SessionHandle;

use super::error::{ReferenceError, ReferenceResult};

/// Default timeout for reference lookups.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the read-only reference-data endpoints.
#[derive(Debug, Clone)]
pub struct ReferenceClient {
    /// HTTP client.
    client: Client,
    /// Base URL for the platform API.
    base_url: String,
    /// Session context; cleared when the backend answers 401.
    session: SessionHandle,
}

impl ReferenceClient {
    /// Create a new reference-data client.
    pub fn new(base_url: impl Into<String>, session: SessionHandle) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            session,
        }
    }

    /// List the grade levels offered by the school.
    pub async fn list_grades(&self) -> ReferenceResult<Vec<Grade>> {
        self.fetch_list("/reference/grades").await
    }

    /// List the named classes.
    pub async fn list_classes(&self) -> ReferenceResult<Vec<SchoolClass>> {
        self.fetch_list("/reference/classes").await
    }

    /// List the subject offerings.
    pub async fn list_subjects(&self) -> ReferenceResult<Vec<Subject>> {
        self.fetch_list("/reference/subjects").await
    }

    async fn fetch_list<T: DeserializeOwned>(&self, path: &str) -> ReferenceResult<Vec<T>> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.session.clear();
            return Err(ReferenceError::Unauthorized);
        }

        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        if status.is_success() {
            Ok(normalize_list(&body)?)
        } else {
            let message =
                error_message(&body).unwrap_or_else(|| format!("unexpected status {}", status));
            Err(ReferenceError::Api(message))
        }
    }
}
