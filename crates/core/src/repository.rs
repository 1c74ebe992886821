//! Target Repository contract consumed by the engine.

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::source::Asset;
use crate::target::TargetRecord;
use crate::types::DbId;

/// Substring that marks an external ID as deleted from the source.
pub const DELETED_MARKER: &str = "DELETED";

#[async_trait]
pub trait TargetRepository: Send + Sync {
    /// Records of `record_type` whose `field` holds one of `values`, ordered
    /// by ascending ID.
    async fn find_by_field(
        &self,
        record_type: &str,
        field: &str,
        values: &[String],
    ) -> SyncResult<Vec<TargetRecord>>;

    /// Records of `record_type` whose title equals `title` exactly, ordered
    /// by ascending ID.
    async fn find_by_title(&self, record_type: &str, title: &str) -> SyncResult<Vec<TargetRecord>>;

    async fn load(&self, id: DbId) -> SyncResult<Option<TargetRecord>>;

    /// Records of `record_type` with a non-empty `external_id_field` and an ID
    /// of at least `min_id`, ordered by ID, skipping `offset` and returning
    /// at most `limit`.
    async fn list_linked(
        &self,
        record_type: &str,
        external_id_field: &str,
        min_id: DbId,
        offset: i64,
        limit: i64,
    ) -> SyncResult<Vec<TargetRecord>>;

    /// IDs of published records of `record_type` whose `external_id_field` is
    /// non-empty and does not contain [`DELETED_MARKER`].
    async fn list_active_ids(
        &self,
        record_type: &str,
        external_id_field: &str,
    ) -> SyncResult<Vec<DbId>>;

    /// Create and persist an empty record titled `Generated {record_type}`.
    async fn create(&self, record_type: &str) -> SyncResult<TargetRecord>;

    async fn save(&self, record: &TargetRecord) -> SyncResult<()>;

    /// Physically remove a record. Only used to resolve duplicate keys.
    async fn delete(&self, id: DbId) -> SyncResult<()>;

    /// Store a downloaded asset for `record` and return the reference to
    /// write into the record's field.
    async fn store_asset(&self, record: &TargetRecord, asset: &Asset) -> SyncResult<String>;
}

/// Title given to records created before any source data is migrated.
pub fn placeholder_title(record_type: &str) -> String {
    format!("Generated {record_type}")
}
