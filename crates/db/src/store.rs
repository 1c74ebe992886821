//! Engine collaborator implementations backed by PostgreSQL.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use locsync_core::error::SyncResult;
use locsync_core::repository::{placeholder_title, TargetRepository, DELETED_MARKER};
use locsync_core::source::Asset;
use locsync_core::state::StateStore;
use locsync_core::target::TargetRecord;
use locsync_core::types::DbId;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::DbError;
use crate::repositories::{SyncStateRepo, TargetRecordRepo};

fn records(rows: Vec<crate::models::target_record::TargetRecordRow>) -> Vec<TargetRecord> {
    rows.into_iter().map(TargetRecord::from).collect()
}

// ---------------------------------------------------------------------------
// PgTargetRepository
// ---------------------------------------------------------------------------

/// Target records in `target_records`; assets written under `asset_dir`.
#[derive(Debug, Clone)]
pub struct PgTargetRepository {
    pool: PgPool,
    asset_dir: PathBuf,
}

impl PgTargetRepository {
    pub fn new(pool: PgPool, asset_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            asset_dir: asset_dir.into(),
        }
    }

    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }
}

#[async_trait]
impl TargetRepository for PgTargetRepository {
    async fn find_by_field(
        &self,
        record_type: &str,
        field: &str,
        values: &[String],
    ) -> SyncResult<Vec<TargetRecord>> {
        let rows = TargetRecordRepo::find_by_field(&self.pool, record_type, field, values)
            .await
            .map_err(DbError::from)?;
        Ok(records(rows))
    }

    async fn find_by_title(&self, record_type: &str, title: &str) -> SyncResult<Vec<TargetRecord>> {
        let rows = TargetRecordRepo::find_by_title(&self.pool, record_type, title)
            .await
            .map_err(DbError::from)?;
        Ok(records(rows))
    }

    async fn load(&self, id: DbId) -> SyncResult<Option<TargetRecord>> {
        let row = TargetRecordRepo::find_by_id(&self.pool, id)
            .await
            .map_err(DbError::from)?;
        Ok(row.map(TargetRecord::from))
    }

    async fn list_linked(
        &self,
        record_type: &str,
        external_id_field: &str,
        min_id: DbId,
        offset: i64,
        limit: i64,
    ) -> SyncResult<Vec<TargetRecord>> {
        let rows = TargetRecordRepo::list_linked(
            &self.pool,
            record_type,
            external_id_field,
            min_id,
            offset,
            limit,
        )
        .await
        .map_err(DbError::from)?;
        Ok(records(rows))
    }

    async fn list_active_ids(
        &self,
        record_type: &str,
        external_id_field: &str,
    ) -> SyncResult<Vec<DbId>> {
        Ok(
            TargetRecordRepo::list_active_ids(&self.pool, record_type, external_id_field, DELETED_MARKER)
                .await
                .map_err(DbError::from)?,
        )
    }

    async fn create(&self, record_type: &str) -> SyncResult<TargetRecord> {
        let row = TargetRecordRepo::create(&self.pool, record_type, &placeholder_title(record_type))
            .await
            .map_err(DbError::from)?;
        tracing::debug!(target_id = row.id, record_type, "Target record created");
        Ok(row.into())
    }

    async fn save(&self, record: &TargetRecord) -> SyncResult<()> {
        let updated = TargetRecordRepo::update(
            &self.pool,
            record.id,
            &record.title,
            record.published,
            &record.fields,
        )
        .await
        .map_err(DbError::from)?;
        if updated == 0 {
            return Err(DbError::RecordMissing(record.id).into());
        }
        Ok(())
    }

    async fn delete(&self, id: DbId) -> SyncResult<()> {
        if !TargetRecordRepo::delete(&self.pool, id)
            .await
            .map_err(DbError::from)?
        {
            tracing::warn!(target_id = id, "Record to delete was already gone");
        }
        Ok(())
    }

    async fn store_asset(&self, record: &TargetRecord, asset: &Asset) -> SyncResult<String> {
        let dir = self.asset_dir.join(record.id.to_string());
        tokio::fs::create_dir_all(&dir).await.map_err(DbError::from)?;
        let path = dir.join(format!("headshot.{}", asset.extension()));
        tokio::fs::write(&path, &asset.bytes)
            .await
            .map_err(DbError::from)?;
        tracing::debug!(target_id = record.id, path = %path.display(), bytes = asset.bytes.len(), "Asset stored");
        Ok(path.to_string_lossy().into_owned())
    }
}

// ---------------------------------------------------------------------------
// PgStateStore
// ---------------------------------------------------------------------------

/// Engine state in the `sync_state` table.
#[derive(Debug, Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn get(&self, key: &str) -> SyncResult<Option<Value>> {
        let row = SyncStateRepo::find(&self.pool, key)
            .await
            .map_err(|e| DbError::from(e).into_state())?;
        Ok(row.map(|r| r.value))
    }

    async fn set(&self, key: &str, value: Value) -> SyncResult<()> {
        SyncStateRepo::upsert(&self.pool, key, &value)
            .await
            .map_err(|e| DbError::from(e).into_state())?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        SyncStateRepo::delete(&self.pool, key)
            .await
            .map_err(|e| DbError::from(e).into_state())?;
        Ok(())
    }
}
