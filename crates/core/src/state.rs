//! Persisted engine state: crawl checkpoint, counters and the sweep cursor.
//!
//! The [`StateStore`] is a plain key/JSON store supplied by the host.
//! [`SyncState`] layers typed accessors over it, one per persisted key.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Keys and defaults
// ---------------------------------------------------------------------------

pub const KEY_NEXT_IMPORT: &str = "locsync.next_import";
pub const KEY_CHECKPOINT: &str = "locsync.checkpoint";
pub const KEY_IMPORTED: &str = "locsync.imported";
pub const KEY_FAILED: &str = "locsync.failed";
pub const KEY_LAST_CHECK: &str = "locsync.last_check";
pub const KEY_REMAINING: &str = "locsync.remaining";
pub const KEY_SWEEP_FIRST: &str = "locsync.sweep_first";
pub const KEY_SWEEP_BATCH_SIZE: &str = "locsync.sweep_batch_size";

/// Remaining estimate before the first crawl has measured anything.
pub const DEFAULT_REMAINING: u64 = 999_999;

/// Records checked per sweep invocation unless configured otherwise.
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 1;

/// First day the crawl asks the source about on a fresh install.
pub fn default_next_import() -> Timestamp {
    NaiveDate::from_ymd_opt(2017, 12, 10)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> SyncResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> SyncResult<()>;

    async fn delete(&self, key: &str) -> SyncResult<()>;
}

/// Crawl progress persisted before each page is processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCheckpoint {
    /// Window start, `YYYY-MM-DD`.
    pub start: String,
    /// Window end, `YYYY-MM-DD`.
    pub end: String,
    pub offset: u32,
}

// ---------------------------------------------------------------------------
// SyncState
// ---------------------------------------------------------------------------

/// Typed view over the persisted keys.
#[derive(Clone)]
pub struct SyncState {
    store: Arc<dyn StateStore>,
}

impl SyncState {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    async fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> SyncResult<T> {
        match self.store.get(key).await? {
            None | Some(Value::Null) => Ok(default),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| SyncError::State(format!("cannot decode state key '{key}': {e}"))),
        }
    }

    async fn put<T: Serialize>(&self, key: &str, value: &T) -> SyncResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| SyncError::State(format!("cannot encode state key '{key}': {e}")))?;
        self.store.set(key, value).await
    }

    // -- date cursor --------------------------------------------------------

    pub async fn next_import(&self) -> SyncResult<Timestamp> {
        let secs: Option<i64> = self.get_or(KEY_NEXT_IMPORT, None).await?;
        match secs {
            None => Ok(default_next_import()),
            Some(secs) => Utc
                .timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| SyncError::State(format!("next import time {secs} is out of range"))),
        }
    }

    pub async fn set_next_import(&self, at: Timestamp) -> SyncResult<()> {
        self.put(KEY_NEXT_IMPORT, &at.timestamp()).await
    }

    // -- checkpoint ---------------------------------------------------------

    pub async fn checkpoint(&self) -> SyncResult<Option<ImportCheckpoint>> {
        self.get_or(KEY_CHECKPOINT, None).await
    }

    pub async fn set_checkpoint(&self, checkpoint: &ImportCheckpoint) -> SyncResult<()> {
        self.put(KEY_CHECKPOINT, checkpoint).await
    }

    pub async fn clear_checkpoint(&self) -> SyncResult<()> {
        self.store.delete(KEY_CHECKPOINT).await
    }

    // -- counters -----------------------------------------------------------

    pub async fn imported(&self) -> SyncResult<u64> {
        self.get_or(KEY_IMPORTED, 0).await
    }

    pub async fn increment_imported(&self) -> SyncResult<u64> {
        let next = self.imported().await? + 1;
        self.put(KEY_IMPORTED, &next).await?;
        Ok(next)
    }

    /// Failed items keyed by external ID, holding the offending raw item.
    pub async fn failed(&self) -> SyncResult<BTreeMap<String, Value>> {
        self.get_or(KEY_FAILED, BTreeMap::new()).await
    }

    pub async fn record_failure(&self, key: &str, item: &Value) -> SyncResult<()> {
        let mut failed = self.failed().await?;
        failed.insert(key.to_string(), item.clone());
        self.put(KEY_FAILED, &failed).await
    }

    /// `None` until the first crawl has finished.
    pub async fn last_check(&self) -> SyncResult<Option<Timestamp>> {
        let secs: i64 = self.get_or(KEY_LAST_CHECK, 0).await?;
        if secs == 0 {
            return Ok(None);
        }
        Ok(Utc.timestamp_opt(secs, 0).single())
    }

    pub async fn set_last_check(&self, at: Timestamp) -> SyncResult<()> {
        self.put(KEY_LAST_CHECK, &at.timestamp()).await
    }

    pub async fn remaining(&self) -> SyncResult<u64> {
        self.get_or(KEY_REMAINING, DEFAULT_REMAINING).await
    }

    pub async fn set_remaining(&self, remaining: u64) -> SyncResult<()> {
        self.put(KEY_REMAINING, &remaining).await
    }

    // -- sweep cursor -------------------------------------------------------

    pub async fn sweep_first(&self) -> SyncResult<DbId> {
        self.get_or(KEY_SWEEP_FIRST, 0).await
    }

    pub async fn set_sweep_first(&self, first: DbId) -> SyncResult<()> {
        self.put(KEY_SWEEP_FIRST, &first).await
    }

    pub async fn sweep_batch_size(&self) -> SyncResult<usize> {
        self.get_or(KEY_SWEEP_BATCH_SIZE, DEFAULT_SWEEP_BATCH_SIZE).await
    }

    pub async fn set_sweep_batch_size(&self, size: usize) -> SyncResult<()> {
        self.put(KEY_SWEEP_BATCH_SIZE, &size).await
    }

    // -- reset --------------------------------------------------------------

    /// Restore every crawl key to its fresh-install value. The sweep cursor
    /// is left alone.
    pub async fn reset_all(&self) -> SyncResult<()> {
        self.set_remaining(DEFAULT_REMAINING).await?;
        self.put(KEY_IMPORTED, &0u64).await?;
        self.set_next_import(default_next_import()).await?;
        self.put(KEY_FAILED, &BTreeMap::<String, Value>::new()).await?;
        self.put(KEY_LAST_CHECK, &0i64).await?;
        self.clear_checkpoint().await
    }
}
