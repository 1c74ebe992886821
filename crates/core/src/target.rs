//! Local mirror records owned by the Target Repository.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::DbId;
use crate::value::FieldValue;

/// A persisted local record of the configured target type.
///
/// The engine only borrows these for the duration of one migration call;
/// persistence goes through [`crate::repository::TargetRepository::save`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub id: DbId,
    pub record_type: String,
    pub title: String,
    pub published: bool,
    pub fields: BTreeMap<String, FieldValue>,
}

impl TargetRecord {
    pub fn new(id: DbId, record_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            record_type: record_type.into(),
            title: title.into(),
            published: true,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// First value stored in `name`, or `""` when unset.
    pub fn field_str(&self, name: &str) -> &str {
        self.fields.get(name).map(FieldValue::first).unwrap_or("")
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn unpublish(&mut self) {
        self.published = false;
    }
}
