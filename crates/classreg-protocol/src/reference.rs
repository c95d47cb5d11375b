//! Reference-data service types: read-only lookup lists used to populate
//! selection fields.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{NormalizeError, unwrap_envelope};

/// A grade level offered by the school.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub grade: String,
}

/// A named class within a grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolClass {
    pub class: String,
}

/// A subject offering, qualified by medium and grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub main_subject: String,
    #[serde(default)]
    pub sub_subject: Option<String>,
    pub medium: String,
    pub grade: String,
}

/// Normalize a lookup-list response.
///
/// The reference endpoints return either a bare array or the array under a
/// `data`/`items` envelope, depending on the endpoint's vintage.
pub fn normalize_list<T: DeserializeOwned>(body: &Value) -> Result<Vec<T>, NormalizeError> {
    let inner = unwrap_envelope(body);
    match inner {
        Value::Array(entries) => entries
            .iter()
            .map(|entry| serde_json::from_value(entry.clone()).map_err(NormalizeError::from))
            .collect(),
        other => Err(NormalizeError::UnrecognizedShape(other.to_string())),
    }
}
