//! Explicit session context.
//!
//! One object with a defined lifecycle: set on login success, cleared on
//! logout or whenever a client observes a 401. Components receive a handle
//! instead of reading ambient global state.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::debug;

use classreg_protocol::account::AccountRole;

/// An authenticated session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Opaque bearer token issued by the backend.
    pub token: String,
    /// Account the token was issued for.
    pub account_id: String,
    /// Role of the authenticated account.
    pub role: AccountRole,
    /// Resolved permission set. Never empty for an established context.
    pub permissions: Vec<String>,
    /// When the context was established.
    pub established_at: DateTime<Utc>,
}

impl SessionContext {
    /// Check whether the session carries the given permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Shared handle to the (possibly absent) session context.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<Mutex<Option<SessionContext>>>,
}

impl SessionHandle {
    /// Create an empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a context (login success).
    pub fn set(&self, context: SessionContext) {
        let mut slot = self.inner.lock().expect("session context lock poisoned");
        *slot = Some(context);
    }

    /// Drop the context (logout, or a 401 observed by any client).
    pub fn clear(&self) {
        let mut slot = self.inner.lock().expect("session context lock poisoned");
        if slot.take().is_some() {
            debug!("session context cleared");
        }
    }

    /// Snapshot of the current context, if any.
    pub fn current(&self) -> Option<SessionContext> {
        self.inner
            .lock()
            .expect("session context lock poisoned")
            .clone()
    }

    /// Current bearer token, if a context is installed.
    pub fn token(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("session context lock poisoned")
            .as_ref()
            .map(|context| context.token.clone())
    }

    /// Whether a context is currently installed.
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .lock()
            .expect("session context lock poisoned")
            .is_some()
    }
}
