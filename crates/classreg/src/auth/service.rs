//! Login flow with bounded permission resolution.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::account::{AccountApi, AccountError};

use super::context::{SessionContext, SessionHandle};

/// How many extra user-record lookups are made when the login response
/// carries no permissions. This is the only automatically retried call in
/// the client.
const PERMISSION_LOOKUP_RETRIES: u32 = 2;

/// Default delay between permission lookups.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(400);

/// Errors that can occur during login.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The account service could not be reached or answered unexpectedly.
    #[error("login failed: {0}")]
    Transport(String),
}

/// Result of a login attempt that reached the backend.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Session established with a non-empty permission set.
    Authorized(SessionContext),
    /// Credentials were accepted but no permissions could be resolved;
    /// the caller routes to the unauthorized view.
    Unauthorized,
}

/// Service wrapping login, permission resolution, and logout.
#[derive(Clone)]
pub struct AuthService {
    account: Arc<dyn AccountApi>,
    session: SessionHandle,
    retry_delay: Duration,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(account: Arc<dyn AccountApi>, session: SessionHandle) -> Self {
        Self {
            account,
            session,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Override the delay between permission lookups.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Authenticate and establish a session context.
    ///
    /// If the login response carries no permission set, the canonical user
    /// record is re-queried up to [`PERMISSION_LOOKUP_RETRIES`] times with a
    /// fixed delay before giving up.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let login = self
            .account
            .login(username, password)
            .await
            .map_err(|err| match err {
                AccountError::Unauthorized => AuthError::InvalidCredentials,
                other => AuthError::Transport(other.to_string()),
            })?;

        let mut permissions = login.permissions;
        let mut lookups = 0;
        while permissions.is_empty() && lookups < PERMISSION_LOOKUP_RETRIES {
            lookups += 1;
            tokio::time::sleep(self.retry_delay).await;

            match self.account.get_user(&login.account_id).await {
                Ok(record) => permissions = record.permissions,
                Err(err) => {
                    warn!(account_id = %login.account_id, attempt = lookups, error = %err,
                        "permission lookup failed");
                }
            }
        }

        if permissions.is_empty() {
            warn!(account_id = %login.account_id, "no permissions resolved after retries");
            return Ok(LoginOutcome::Unauthorized);
        }

        let context = SessionContext {
            token: login.token,
            account_id: login.account_id,
            role: login.role,
            permissions,
            established_at: Utc::now(),
        };
        self.session.set(context.clone());
        info!(account_id = %context.account_id, role = %context.role, "session established");

        Ok(LoginOutcome::Authorized(context))
    }

    /// Drop the current session context.
    pub fn logout(&self) {
        self.session.clear();
        info!("logged out");
    }
}
