//! Role-detail service types: the batches submitted in wizard phase 2.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::account::AccountRole;
use crate::unwrap_envelope;

/// One teaching assignment row: which subject a teacher covers, where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAssignment {
    pub grade: String,
    pub class: String,
    pub subject: String,
    pub medium: String,
}

/// Batch of teaching assignments for a newly registered teacher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAssignmentsRequest {
    pub account_id: String,
    pub role: AccountRole,
    pub staff_no: String,
    pub assignments: Vec<TeacherAssignment>,
}

/// The single student record collected in phase 2 of a student signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub admission_no: String,
    pub grade: String,
    pub class: String,
    pub medium: String,
    pub guardian_contact: String,
}

/// Wrapper tagging a student record with its account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecordRequest {
    pub account_id: String,
    pub role: AccountRole,
    pub record: StudentRecord,
}

/// One parent-child link row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentLink {
    pub student_admission_no: String,
    pub profession: String,
    pub relation: String,
    pub contact: String,
}

/// Batch of parent-child links for a newly registered parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentLinksRequest {
    pub account_id: String,
    pub role: AccountRole,
    pub links: Vec<ParentLink>,
}

/// Normalize an acknowledgement body.
///
/// Observed shapes: empty body (`null`), `{"success": true}`, and
/// `{"status": "ok"}`. Anything else is treated as a failed acknowledgement.
pub fn normalize_ack(body: &Value) -> bool {
    let inner = unwrap_envelope(body);
    match inner {
        Value::Null => true,
        Value::Object(obj) => {
            if let Some(success) = obj.get("success").and_then(Value::as_bool) {
                return success;
            }
            matches!(obj.get("status").and_then(Value::as_str), Some("ok"))
        }
        _ => false,
    }
}
