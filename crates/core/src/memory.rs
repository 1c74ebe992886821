//! In-memory Source Client, Target Repository and State Store.
//!
//! Used by the engine tests and by hosts that want a dry run without a
//! database or network.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::repository::{placeholder_title, TargetRepository, DELETED_MARKER};
use crate::source::{Asset, SourceClient, SourcePage, MAX_OFFSET, PAGE_LIMIT};
use crate::state::StateStore;
use crate::target::TargetRecord;
use crate::types::DbId;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryRepository
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Records {
    next_id: DbId,
    by_id: BTreeMap<DbId, TargetRecord>,
    assets: Vec<(DbId, String, usize)>,
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: Mutex<Records>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, assigning the next ID. Returns the stored copy.
    pub fn insert(&self, mut record: TargetRecord) -> TargetRecord {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        record.id = inner.next_id;
        inner.by_id.insert(record.id, record.clone());
        record
    }

    pub fn all(&self) -> Vec<TargetRecord> {
        lock(&self.inner).by_id.values().cloned().collect()
    }

    pub fn get(&self, id: DbId) -> Option<TargetRecord> {
        lock(&self.inner).by_id.get(&id).cloned()
    }

    /// Stored asset references as `(record id, reference, byte length)`.
    pub fn assets(&self) -> Vec<(DbId, String, usize)> {
        lock(&self.inner).assets.clone()
    }
}

#[async_trait]
impl TargetRepository for MemoryRepository {
    async fn find_by_field(
        &self,
        record_type: &str,
        field: &str,
        values: &[String],
    ) -> SyncResult<Vec<TargetRecord>> {
        let inner = lock(&self.inner);
        Ok(inner
            .by_id
            .values()
            .filter(|r| r.record_type == record_type)
            .filter(|r| {
                let value = r.field_str(field);
                values.iter().any(|v| v == value)
            })
            .cloned()
            .collect())
    }

    async fn find_by_title(&self, record_type: &str, title: &str) -> SyncResult<Vec<TargetRecord>> {
        let inner = lock(&self.inner);
        Ok(inner
            .by_id
            .values()
            .filter(|r| r.record_type == record_type && r.title == title)
            .cloned()
            .collect())
    }

    async fn load(&self, id: DbId) -> SyncResult<Option<TargetRecord>> {
        Ok(self.get(id))
    }

    async fn list_linked(
        &self,
        record_type: &str,
        external_id_field: &str,
        min_id: DbId,
        offset: i64,
        limit: i64,
    ) -> SyncResult<Vec<TargetRecord>> {
        let inner = lock(&self.inner);
        Ok(inner
            .by_id
            .range(min_id..)
            .map(|(_, r)| r)
            .filter(|r| r.record_type == record_type && !r.field_str(external_id_field).is_empty())
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn list_active_ids(
        &self,
        record_type: &str,
        external_id_field: &str,
    ) -> SyncResult<Vec<DbId>> {
        let inner = lock(&self.inner);
        Ok(inner
            .by_id
            .values()
            .filter(|r| r.record_type == record_type && r.published)
            .filter(|r| {
                let id = r.field_str(external_id_field);
                !id.is_empty() && !id.contains(DELETED_MARKER)
            })
            .map(|r| r.id)
            .collect())
    }

    async fn create(&self, record_type: &str) -> SyncResult<TargetRecord> {
        Ok(self.insert(TargetRecord::new(0, record_type, placeholder_title(record_type))))
    }

    async fn save(&self, record: &TargetRecord) -> SyncResult<()> {
        let mut inner = lock(&self.inner);
        match inner.by_id.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(SyncError::Repository(format!(
                "record {} does not exist",
                record.id
            ))),
        }
    }

    async fn delete(&self, id: DbId) -> SyncResult<()> {
        lock(&self.inner).by_id.remove(&id);
        Ok(())
    }

    async fn store_asset(&self, record: &TargetRecord, asset: &Asset) -> SyncResult<String> {
        let mut inner = lock(&self.inner);
        let reference = format!("memory://{}/{}.{}", record.id, inner.assets.len(), asset.extension());
        inner.assets.push((record.id, reference.clone(), asset.bytes.len()));
        Ok(reference)
    }
}

// ---------------------------------------------------------------------------
// MemoryStateStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> SyncResult<Option<Value>> {
        Ok(lock(&self.values).get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> SyncResult<()> {
        lock(&self.values).insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        lock(&self.values).remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SourceData {
    items: Vec<Value>,
    assets: HashMap<String, Asset>,
    reported_count: Option<u64>,
    fail_at_offset: Option<u32>,
    requested_offsets: Vec<u32>,
    requested_filters: Vec<Vec<Value>>,
}

/// A source serving a fixed list of items in pages of [`PAGE_LIMIT`].
///
/// Filters are recorded but not applied.
#[derive(Debug, Default)]
pub struct MemorySource {
    inner: Mutex<SourceData>,
}

impl MemorySource {
    pub fn new(items: Vec<Value>) -> Self {
        let source = Self::default();
        lock(&source.inner).items = items;
        source
    }

    pub fn set_items(&self, items: Vec<Value>) {
        lock(&self.inner).items = items;
    }

    pub fn add_asset(&self, url: &str, content_type: &str, bytes: Vec<u8>) {
        lock(&self.inner).assets.insert(
            url.to_string(),
            Asset {
                url: url.to_string(),
                content_type: content_type.to_string(),
                bytes,
            },
        );
    }

    /// Report `count` as the total instead of the number of items.
    pub fn report_count(&self, count: u64) {
        lock(&self.inner).reported_count = Some(count);
    }

    /// Make page requests at `offset` fail with a transport error.
    pub fn fail_at_offset(&self, offset: Option<u32>) {
        lock(&self.inner).fail_at_offset = offset;
    }

    pub fn requested_offsets(&self) -> Vec<u32> {
        lock(&self.inner).requested_offsets.clone()
    }

    pub fn requested_filters(&self) -> Vec<Vec<Value>> {
        lock(&self.inner).requested_filters.clone()
    }
}

#[async_trait]
impl SourceClient for MemorySource {
    async fn fetch_page(&self, filters: &[Value], offset: u32) -> SyncResult<SourcePage> {
        if offset > MAX_OFFSET {
            return Err(SyncError::OffsetLimit {
                offset,
                max: MAX_OFFSET,
            });
        }
        let mut inner = lock(&self.inner);
        inner.requested_offsets.push(offset);
        inner.requested_filters.push(filters.to_vec());
        if inner.fail_at_offset == Some(offset) {
            return Err(SyncError::Transport(format!("injected failure at offset {offset}")));
        }
        let start = (offset as usize).min(inner.items.len());
        let end = (start + PAGE_LIMIT as usize).min(inner.items.len());
        Ok(SourcePage {
            count: inner.reported_count.unwrap_or(inner.items.len() as u64),
            items: inner.items[start..end].to_vec(),
        })
    }

    async fn fetch_by_id(&self, external_id: &str) -> SyncResult<Value> {
        lock(&self.inner)
            .items
            .iter()
            .find(|item| {
                item.get("id")
                    .map(crate::value::json_to_string)
                    .is_some_and(|id| id == external_id)
            })
            .cloned()
            .ok_or_else(|| SyncError::NotFound(external_id.to_string()))
    }

    async fn fetch_asset(&self, url: &str) -> SyncResult<Asset> {
        lock(&self.inner)
            .assets
            .get(url)
            .cloned()
            .ok_or_else(|| SyncError::AssetFetch(format!("{url} returned status 404")))
    }
}
