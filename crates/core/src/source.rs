//! Source Client contract consumed by the engine.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncResult;

/// Calls break the source API if the offset is greater than this.
pub const MAX_OFFSET: u32 = 9999;

/// Records requested per page.
pub const PAGE_LIMIT: u32 = 50;

/// One page of listing results.
#[derive(Debug, Clone, Default)]
pub struct SourcePage {
    /// Total number of records matching the filters, across all pages.
    pub count: u64,
    /// Records on this page, in source order.
    pub items: Vec<Value>,
}

/// A downloaded binary asset such as a headshot image.
#[derive(Debug, Clone)]
pub struct Asset {
    pub url: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Asset {
    /// File extension derived from the content type, e.g. `png`.
    pub fn extension(&self) -> &str {
        self.content_type
            .strip_prefix("image/")
            .unwrap_or("bin")
    }
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch one page of records matching `filters`, starting at `offset`.
    ///
    /// Implementations must refuse offsets above [`MAX_OFFSET`] with
    /// [`crate::error::SyncError::OffsetLimit`] before making any call.
    async fn fetch_page(&self, filters: &[Value], offset: u32) -> SyncResult<SourcePage>;

    /// Fetch a single record by external ID.
    ///
    /// Returns [`crate::error::SyncError::NotFound`] when the source no longer
    /// has the ID.
    async fn fetch_by_id(&self, external_id: &str) -> SyncResult<Value>;

    /// Download an asset. Bad status, unsupported content type or a
    /// truncated body are [`crate::error::SyncError::AssetFetch`] errors.
    async fn fetch_asset(&self, url: &str) -> SyncResult<Asset>;
}
