//! Immutable view over one JSON object delivered by the source API.

use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::value::json_to_string;

// ---------------------------------------------------------------------------
// Source keys
// ---------------------------------------------------------------------------

pub const KEY_ID: &str = "id";
pub const KEY_TIMESTAMP: &str = "timestamp";
pub const KEY_NAME: &str = "locationName";
pub const KEY_DESCRIPTION: &str = "description";
pub const KEY_CUSTOM_FIELDS: &str = "customFields";
pub const HEADSHOT_URL_PATH: &[&str] = &["headshot", "url"];

/// Latitude/longitude keys, tried in order.
const GEO_KEYS: &[(&str, &str)] = &[
    ("yextDisplayLat", "yextDisplayLng"),
    ("displayLat", "displayLng"),
];

/// A latitude/longitude pair as delivered by the source, kept as text so no
/// precision is lost on the way to the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoPoint {
    pub lat: String,
    pub lon: String,
}

/// One listing fetched from the source.
///
/// Construction fails unless both the external ID and the last-updated
/// timestamp are present and non-empty.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    raw: Value,
    external_id: String,
    last_updated: i64,
}

impl SourceRecord {
    pub fn parse(raw: Value) -> SyncResult<Self> {
        let external_id = match raw.get(KEY_ID) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(SyncError::RequiredFieldMissing {
                    field: KEY_ID,
                    message: "the source ID is how target records are linked to source records",
                })
            }
        };

        let last_updated = match raw.get(KEY_TIMESTAMP) {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .filter(|ts| *ts != 0)
        .ok_or(SyncError::RequiredFieldMissing {
            field: KEY_TIMESTAMP,
            message: "the last update time is how out-of-date target records are detected",
        })?;

        Ok(Self {
            raw,
            external_id,
            last_updated,
        })
    }

    /// Parse a record from its serialized JSON form, e.g. a raw mirror field.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        let raw: Value = serde_json::from_str(json)
            .map_err(|e| SyncError::MalformedResponse(format!("cannot decode source JSON: {e}")))?;
        Self::parse(raw)
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn last_updated(&self) -> i64 {
        self.last_updated
    }

    pub fn name(&self) -> String {
        self.string_at(&[KEY_NAME])
    }

    pub fn bio(&self) -> String {
        self.string_at(&[KEY_DESCRIPTION])
    }

    pub fn headshot_url(&self) -> String {
        self.string_at(HEADSHOT_URL_PATH)
    }

    /// Coordinates, only when a latitude is present.
    pub fn geo(&self) -> Option<GeoPoint> {
        GEO_KEYS.iter().find_map(|(lat_key, lon_key)| {
            let lat = self.string_at(&[*lat_key]);
            if lat.is_empty() {
                return None;
            }
            Some(GeoPoint {
                lat,
                lon: self.string_at(&[*lon_key]),
            })
        })
    }

    /// Walk a key path into the record. Array segments are addressed by
    /// numeric index. Missing keys and `null` leaves both yield `None`.
    pub fn element<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let mut current = &self.raw;
        for key in path {
            let key = key.as_ref();
            current = match current {
                Value::Object(map) => map.get(key)?,
                Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        (!current.is_null()).then_some(current)
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn raw_json(&self) -> String {
        self.raw.to_string()
    }

    fn string_at(&self, path: &[&str]) -> String {
        self.element(path).map(json_to_string).unwrap_or_default()
    }
}
