//! Account service client module.
//!
//! Provides an async client for base account creation, the compensating
//! deletion, and the login/user-record lookups.

mod client;
mod error;

use async_trait::async_trait;

use classreg_protocol::account::{
    AccountRole, CreateAccountRequest, CreatedAccount, LoginSuccess, UserRecord,
};

pub use client::AccountClient;
pub use error::{AccountError, AccountResult};

/// Operations the account service exposes to this client.
///
/// Implemented by [`AccountClient`] over HTTP; implemented by in-memory fakes
/// in tests.
#[async_trait]
pub trait AccountApi: Send + Sync {
    /// Create a base account. Returns the assigned id and role.
    async fn create_account(&self, request: CreateAccountRequest) -> AccountResult<CreatedAccount>;

    /// Delete a half-registered account. Idempotent on the backend side.
    async fn delete_account(&self, account_id: &str, role: AccountRole) -> AccountResult<()>;

    /// Authenticate and obtain a token plus whatever permissions the backend
    /// resolved eagerly.
    async fn login(&self, username: &str, password: &str) -> AccountResult<LoginSuccess>;

    /// Fetch the canonical user record (used when permissions were not
    /// resolved at login time).
    async fn get_user(&self, account_id: &str) -> AccountResult<UserRecord>;
}
