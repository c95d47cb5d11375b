//! Canonical wire types for the school platform backend.
//!
//! The backend is inconsistent about response framing: some endpoints return
//! bare JSON arrays, others wrap payloads in `{"data": ...}` envelopes, and
//! validation failures arrive in several shapes. This crate is the single
//! normalization boundary: one function per response kind maps every observed
//! shape onto one canonical type, so downstream code never sees the raw JSON.

pub mod account;
pub mod reference;
pub mod roles;

use thiserror::Error;

/// Errors produced while normalizing a backend response body.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The body did not match any shape this endpoint is known to produce.
    #[error("unrecognized response shape: {0}")]
    UnrecognizedShape(String),

    /// The body matched a known shape but a field failed to deserialize.
    #[error("malformed response field: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Pull a human-readable message out of an error response body, if one is
/// present under any of the shapes the backend uses.
pub fn error_message(body: &serde_json::Value) -> Option<String> {
    let obj = body.as_object()?;
    for key in ["error", "message", "detail"] {
        match obj.get(key) {
            Some(serde_json::Value::String(message)) => return Some(message.clone()),
            Some(serde_json::Value::Object(inner)) => {
                if let Some(serde_json::Value::String(message)) = inner.get("message") {
                    return Some(message.clone());
                }
            }
            _ => {}
        }
    }
    None
}

/// Unwrap the common `{"data": ...}` / `{"items": ...}` envelopes, returning
/// the inner value untouched when no envelope is present.
pub(crate) fn unwrap_envelope(value: &serde_json::Value) -> &serde_json::Value {
    if let Some(obj) = value.as_object() {
        for key in ["data", "items", "result"] {
            if let Some(inner) = obj.get(key) {
                return inner;
            }
        }
    }
    value
}
