//! Target record rows.

use std::collections::BTreeMap;

use locsync_core::target::TargetRecord;
use locsync_core::types::{DbId, Timestamp};
use locsync_core::value::FieldValue;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `target_records` table.
///
/// Mapped content fields live in the `fields` JSONB column keyed by field
/// name; each value is a string or an array of strings.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TargetRecordRow {
    pub id: DbId,
    pub record_type: String,
    pub title: String,
    pub published: bool,
    pub fields: Json<BTreeMap<String, FieldValue>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<TargetRecordRow> for TargetRecord {
    fn from(row: TargetRecordRow) -> Self {
        Self {
            id: row.id,
            record_type: row.record_type,
            title: row.title,
            published: row.published,
            fields: row.fields.0,
        }
    }
}
