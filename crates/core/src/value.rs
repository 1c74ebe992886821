//! Field value shapes shared by source parsing and target records.
//!
//! Source data arrives either as a single scalar or as an ordered list; the
//! target side stores whichever shape was written. Both normalise to a list of
//! strings at the field-resolution boundary.

use serde::{Deserialize, Serialize};

/// A value stored in (or destined for) a single target field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Build the value to write for a parsed list: one element becomes a
    /// scalar, several become a multi-value write, none becomes an empty
    /// scalar.
    pub fn from_parsed(mut values: Vec<String>) -> Self {
        match values.len() {
            0 => Self::Scalar(String::new()),
            1 => Self::Scalar(values.remove(0)),
            _ => Self::List(values),
        }
    }

    /// The first stored value, or `""`.
    pub fn first(&self) -> &str {
        match self {
            Self::Scalar(s) => s,
            Self::List(items) => items.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// All stored values in order.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            Self::Scalar(s) => vec![s.clone()],
            Self::List(items) => items.clone(),
        }
    }

    /// True when there is no non-empty value stored.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Scalar(s) => s.is_empty(),
            Self::List(items) => items.iter().all(String::is_empty),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

/// Render a JSON leaf as the string stored in a target field.
///
/// Strings are taken verbatim, numbers and booleans use their JSON text,
/// `null` is empty and nested structures are kept as compact JSON.
pub fn json_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
