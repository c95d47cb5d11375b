//! Account service types: creation, deletion, login, and the canonical user
//! record used by permission resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{NormalizeError, unwrap_envelope};

/// Role a base account is registered under. Fixed once the account is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    Teacher,
    Student,
    Parent,
}

impl std::fmt::Display for AccountRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountRole::Teacher => write!(f, "teacher"),
            AccountRole::Student => write!(f, "student"),
            AccountRole::Parent => write!(f, "parent"),
        }
    }
}

impl std::str::FromStr for AccountRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "teacher" => Ok(AccountRole::Teacher),
            "student" => Ok(AccountRole::Student),
            "parent" => Ok(AccountRole::Parent),
            _ => Err(format!("unknown account role: {}", s)),
        }
    }
}

/// Request body for base account creation (wizard phase 1).
///
/// The password confirmation never leaves the client; it is checked before
/// this request is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub name: String,
    pub email: String,
    pub address: String,
    pub birth_date: String,
    pub contact: String,
    pub role: AccountRole,
    pub username: String,
    pub password: String,
    pub gender: String,
}

/// Canonical result of a successful account creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAccount {
    pub account_id: String,
    pub role: AccountRole,
}

/// Field-level validation errors, keyed by the offending input field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors(pub BTreeMap<String, String>);

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

/// Canonical result of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSuccess {
    pub token: String,
    pub account_id: String,
    pub role: AccountRole,
    /// May be empty: the backend sometimes resolves permissions lazily and
    /// the client must re-query the user record.
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Canonical user record, as returned by the user lookup endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub account_id: String,
    pub role: AccountRole,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Normalize an account-creation response.
///
/// Observed shapes: the canonical `{"accountId", "role"}` object, the same
/// object under a `data` envelope, and a legacy `{"id", "role"}` form.
pub fn normalize_created_account(body: &Value) -> Result<CreatedAccount, NormalizeError> {
    let inner = unwrap_envelope(body);

    if let Ok(account) = serde_json::from_value::<CreatedAccount>(inner.clone()) {
        return Ok(account);
    }

    // Legacy shape: "id" instead of "accountId".
    if let Some(obj) = inner.as_object() {
        if let (Some(id), Some(role)) = (obj.get("id"), obj.get("role")) {
            return Ok(CreatedAccount {
                account_id: id
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| id.to_string()),
                role: serde_json::from_value(role.clone())?,
            });
        }
    }

    Err(NormalizeError::UnrecognizedShape(inner.to_string()))
}

/// Normalize a login response.
pub fn normalize_login(body: &Value) -> Result<LoginSuccess, NormalizeError> {
    let inner = unwrap_envelope(body);
    serde_json::from_value::<LoginSuccess>(inner.clone())
        .map_err(|_| NormalizeError::UnrecognizedShape(inner.to_string()))
}

/// Normalize a user-record response.
pub fn normalize_user_record(body: &Value) -> Result<UserRecord, NormalizeError> {
    let inner = unwrap_envelope(body);
    serde_json::from_value::<UserRecord>(inner.clone())
        .map_err(|_| NormalizeError::UnrecognizedShape(inner.to_string()))
}

/// Extract field-level errors from an error response body, if present.
///
/// Observed shapes:
/// - `{"errors": {"username": "already taken"}}`
/// - `{"errors": [{"field": "username", "message": "already taken"}]}`
/// - `{"fieldErrors": {...}}` (same two inner forms)
pub fn extract_field_errors(body: &Value) -> Option<FieldErrors> {
    let obj = body.as_object()?;
    let raw = obj.get("errors").or_else(|| obj.get("fieldErrors"))?;

    let mut fields = BTreeMap::new();
    match raw {
        Value::Object(map) => {
            for (field, message) in map {
                let message = message
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| message.to_string());
                fields.insert(field.clone(), message);
            }
        }
        Value::Array(entries) => {
            for entry in entries {
                let field = entry.get("field").and_then(Value::as_str)?;
                let message = entry
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("invalid value");
                fields.insert(field.to_string(), message.to_string());
            }
        }
        _ => return None,
    }

    if fields.is_empty() {
        None
    } else {
        Some(FieldErrors(fields))
    }
}
