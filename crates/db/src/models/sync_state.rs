//! Persisted engine state rows.

use locsync_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `sync_state` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SyncStateRow {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: Timestamp,
}
