//! Engine configuration: target type, field names, field map and behaviour
//! flags.
//!
//! Loaded once at startup by the embedding process and passed down by
//! reference. Defaults match a fresh installation.

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_RECORD_TYPE: &str = "article";
pub const DEFAULT_EXTERNAL_ID_FIELD: &str = "field_yext_unique_id";
pub const DEFAULT_LAST_UPDATED_FIELD: &str = "field_yext_last_updated";
pub const DEFAULT_RAW_FIELD: &str = "field_yext_raw";

/// Separator between the source field ID and the target field in a custom
/// field map line.
pub const CUSTOM_FIELD_SEPARATOR: char = '|';

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

/// Process-wide engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Target record type, e.g. `article`.
    pub record_type: String,
    /// Target field holding the source's unique ID.
    pub external_id_field: String,
    /// Target field holding the last-synchronized source timestamp.
    pub last_updated_field: String,
    pub field_map: FieldMap,
    /// User-configured filters, one JSON filter per line.
    pub filters: String,
    /// Delete later duplicates found during preload instead of failing.
    pub auto_delete_duplicates: bool,
    /// Unpublish a record whose external ID the source rejects during
    /// on-save processing.
    pub unpublish_on_invalid_id: bool,
    /// Always refresh the raw mirror during on-save processing, not only
    /// when it is empty.
    pub update_raw_on_save: bool,
    /// Engage title-based resolution of unlinked records.
    pub find_by_title: bool,
    /// Suppress headshot downloads and raw-data refreshes.
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            record_type: DEFAULT_RECORD_TYPE.to_string(),
            external_id_field: DEFAULT_EXTERNAL_ID_FIELD.to_string(),
            last_updated_field: DEFAULT_LAST_UPDATED_FIELD.to_string(),
            field_map: FieldMap::default(),
            filters: String::new(),
            auto_delete_duplicates: false,
            unpublish_on_invalid_id: false,
            update_raw_on_save: false,
            find_by_title: false,
            dry_run: false,
        }
    }
}

// ---------------------------------------------------------------------------
// FieldMap
// ---------------------------------------------------------------------------

/// One custom field mapping: a source field ID (numeric IDs live under
/// `customFields`, others are bracket paths such as `a][b`) and the target
/// field it is written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldMapping {
    pub source_id: String,
    pub target_field: String,
}

/// Mapping from abstract content fields to concrete target fields. An unset
/// entry means the content is not mirrored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    pub bio: Option<String>,
    pub headshot: Option<String>,
    pub geo: Option<String>,
    pub raw: Option<String>,
    pub custom: Vec<CustomFieldMapping>,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            bio: None,
            headshot: None,
            geo: None,
            raw: Some(DEFAULT_RAW_FIELD.to_string()),
            custom: Vec::new(),
        }
    }
}

impl FieldMap {
    /// Parse custom field mappings from text, one `source_id|target_field`
    /// per line. Blank lines are ignored.
    pub fn parse_custom(text: &str) -> SyncResult<Vec<CustomFieldMapping>> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let (source_id, target_field) =
                    line.split_once(CUSTOM_FIELD_SEPARATOR).ok_or_else(|| {
                        SyncError::Config(format!(
                            "custom field mapping '{line}' must look like source_id{CUSTOM_FIELD_SEPARATOR}target_field"
                        ))
                    })?;
                let (source_id, target_field) = (source_id.trim(), target_field.trim());
                if source_id.is_empty() || target_field.is_empty() {
                    return Err(SyncError::Config(format!(
                        "custom field mapping '{line}' has an empty side"
                    )));
                }
                Ok(CustomFieldMapping {
                    source_id: source_id.to_string(),
                    target_field: target_field.to_string(),
                })
            })
            .collect()
    }

    /// Every target field this map writes to.
    pub fn target_fields(&self) -> Vec<&str> {
        [&self.bio, &self.headshot, &self.geo, &self.raw]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .chain(self.custom.iter().map(|c| c.target_field.as_str()))
            .collect()
    }

    /// Report mapped target fields that do not exist on the target type.
    pub fn validate(&self, known_fields: &[&str]) -> Vec<String> {
        self.target_fields()
            .into_iter()
            .filter(|field| !known_fields.contains(field))
            .map(|field| format!("Field '{field}' is mapped but does not exist on the target type"))
            .collect()
    }
}
