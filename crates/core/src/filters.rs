//! Source query filters.
//!
//! Users configure filters as text, one JSON filter per line, for example
//! `[{"locationType":{"is":[2]}}]`. The crawl prepends its own
//! `lastUpdated between` filter for the current date window.

use serde_json::{json, Value};

/// Decode user filter text. Blank lines are ignored; lines that are not a
/// JSON array or object are logged and skipped.
pub fn parse_filter_lines(text: &str) -> Vec<Value> {
    let mut filters = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Array(items)) => filters.extend(items),
            Ok(obj @ Value::Object(_)) => filters.push(obj),
            Ok(other) => {
                tracing::warn!(line, kind = %json_kind(&other), "Ignoring filter that is not an array or object");
            }
            Err(e) => {
                tracing::warn!(line, error = %e, "Ignoring filter that cannot be decoded");
            }
        }
    }
    filters
}

/// The `lastUpdated between [start, end]` filter merged with user filters.
pub fn window_filters(start: &str, end: &str, user_filters: &[Value]) -> Vec<Value> {
    let mut all = Vec::with_capacity(user_filters.len() + 1);
    all.push(json!({ "lastUpdated": { "between": [start, end] } }));
    all.extend_from_slice(user_filters);
    all
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
