//! Account service HTTP client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use classreg_protocol::account::{
    AccountRole, CreateAccountRequest, CreatedAccount, LoginSuccess, UserRecord,
    extract_field_errors, normalize_created_account, normalize_login, normalize_user_record,
};
use classreg_protocol::error_message;

use crate::auth::SessionHandle;

use super::error::{AccountError, AccountResult};
use super::AccountApi;

/// Default timeout for ordinary account requests.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the compensating delete. Kept short so abandonment
/// does not hang on a slow backend.
const DEFAULT_COMPENSATION_TIMEOUT: Duration = Duration::from_secs(3);

/// Client for communicating with the account service.
#[derive(Debug, Clone)]
pub struct AccountClient {
    /// HTTP client.
    client: Client,
    /// Base URL for the platform API (e.g. "http://localhost:8080").
    base_url: String,
    /// Session context; cleared when the backend answers 401.
    session: SessionHandle,
    /// Timeout applied to the compensating delete only.
    compensation_timeout: Duration,
}

impl AccountClient {
    /// Create a new account client with default timeouts.
    pub fn new(base_url: impl Into<String>, session: SessionHandle) -> Self {
        Self::with_timeouts(
            base_url,
            session,
            DEFAULT_REQUEST_TIMEOUT,
            DEFAULT_COMPENSATION_TIMEOUT,
        )
    }

    /// Create a new account client with explicit timeouts.
    pub fn with_timeouts(
        base_url: impl Into<String>,
        session: SessionHandle,
        request_timeout: Duration,
        compensation_timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            session,
            compensation_timeout,
        }
    }

    /// Read a successful response body as JSON.
    async fn read_json(&self, response: reqwest::Response) -> AccountResult<Value> {
        response.json::<Value>().await.map_err(AccountError::from)
    }

    /// Map an error response onto an [`AccountError`], clearing the session
    /// context when the backend no longer accepts our token.
    async fn error_from_response(&self, response: reqwest::Response) -> AccountError {
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        match status {
            StatusCode::UNAUTHORIZED => {
                self.session.clear();
                AccountError::Unauthorized
            }
            StatusCode::NOT_FOUND => AccountError::NotFound(
                error_message(&body).unwrap_or_else(|| "unknown account".to_string()),
            ),
            _ => {
                if let Some(fields) = extract_field_errors(&body) {
                    AccountError::Validation(fields)
                } else {
                    let message = error_message(&body)
                        .unwrap_or_else(|| format!("unexpected status {}", status));
                    AccountError::Api(message)
                }
            }
        }
    }
}

#[async_trait]
impl AccountApi for AccountClient {
    async fn create_account(&self, request: CreateAccountRequest) -> AccountResult<CreatedAccount> {
        let url = format!("{}/accounts", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;

        if response.status().is_success() {
            let body = self.read_json(response).await?;
            Ok(normalize_created_account(&body)?)
        } else {
            Err(self.error_from_response(response).await)
        }
    }

    async fn delete_account(&self, account_id: &str, role: AccountRole) -> AccountResult<()> {
        let url = format!("{}/accounts/{}", self.base_url, account_id);
        let response = self
            .client
            .delete(&url)
            .query(&[("role", role.to_string())])
            .timeout(self.compensation_timeout)
            .send()
            .await?;

        match response.status() {
            // The delete is idempotent: an already-removed account is fine.
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(account_id, "account already absent on delete");
                Ok(())
            }
            _ => Err(self.error_from_response(response).await),
        }
    }

    async fn login(&self, username: &str, password: &str) -> AccountResult<LoginSuccess> {
        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "username": username,
                "password": password,
            }))
            .send()
            .await?;

        if response.status().is_success() {
            let body = self.read_json(response).await?;
            Ok(normalize_login(&body)?)
        } else if response.status() == StatusCode::UNAUTHORIZED {
            Err(AccountError::Unauthorized)
        } else {
            Err(self.error_from_response(response).await)
        }
    }

    async fn get_user(&self, account_id: &str) -> AccountResult<UserRecord> {
        let url = format!("{}/users/{}", self.base_url, account_id);
        let mut request = self.client.get(&url);
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            let body = self.read_json(response).await?;
            Ok(normalize_user_record(&body)?)
        } else {
            Err(self.error_from_response(response).await)
        }
    }
}
