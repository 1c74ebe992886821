//! Crawl Cursor: pages through the source over a date window and imports
//! every record, resuming from a persisted checkpoint after a failure.

use chrono::Duration;
use serde::Serialize;
use serde_json::Value;

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::fields::FieldParserChain;
use crate::filters::{parse_filter_lines, window_filters};
use crate::migrate::{MigrationMode, Migrator};
use crate::record::{SourceRecord, KEY_ID};
use crate::repository::TargetRepository;
use crate::resolve::{RecordResolverChain, ResolveContext};
use crate::source::{SourceClient, MAX_OFFSET};
use crate::state::{ImportCheckpoint, SyncState};
use crate::store::EntityStore;
use crate::types::Timestamp;
use crate::value::json_to_string;

/// Format of window dates sent to the source.
pub const WINDOW_DATE_FORMAT: &str = "%Y-%m-%d";

/// Days covered by a fresh crawl window.
const WINDOW_DAYS: i64 = 2;

/// The remaining estimate looks this many days past the next import date.
const REMAINING_LOOKAHEAD_DAYS: i64 = 3;

/// Failure key for items that carry no ID.
pub const MISSING_ID_KEY: &str = "<missing id>";

pub fn format_window_date(at: Timestamp) -> String {
    at.format(WINDOW_DATE_FORMAT).to_string()
}

/// Outcome of one crawl invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub start: String,
    pub end: String,
    pub resumed: bool,
    pub pages: u32,
    /// Records whose migration applied changes.
    pub imported: u64,
    /// Records already current.
    pub skipped: u64,
    pub failed: u64,
    /// Offset of the last page fetched.
    pub last_offset: u32,
}

pub struct Importer<'a> {
    pub repo: &'a dyn TargetRepository,
    pub source: &'a dyn SourceClient,
    pub state: &'a SyncState,
    pub config: &'a SyncConfig,
    pub fields: &'a FieldParserChain,
    pub resolvers: &'a RecordResolverChain,
    pub clock: &'a dyn Clock,
}

impl Importer<'_> {
    /// Run one crawl invocation.
    ///
    /// On success the date cursor advances, the last-check time is stamped
    /// and the checkpoint is cleared. On failure the checkpoint is left for
    /// the next invocation and the error is returned.
    pub async fn import_some(&self) -> SyncResult<ImportReport> {
        tracing::info!("Starting import session");
        let mut report = ImportReport::default();

        let result = self.crawl(&mut report).await;
        if let Err(e) = result {
            tracing::error!(
                error = %e,
                start = %report.start,
                end = %report.end,
                offset = report.last_offset,
                "Import session failed, checkpoint kept for resumption"
            );
            return Err(e);
        }

        self.update_remaining().await;
        self.increment_cutoff().await?;
        self.state.set_last_check(self.clock.now()).await?;
        self.state.clear_checkpoint().await?;

        tracing::info!(
            imported = report.imported,
            skipped = report.skipped,
            failed = report.failed,
            pages = report.pages,
            "Import session finished"
        );
        Ok(report)
    }

    async fn crawl(&self, report: &mut ImportReport) -> SyncResult<()> {
        let mut checkpoint = match self.state.checkpoint().await? {
            Some(cp) => {
                tracing::info!(start = %cp.start, end = %cp.end, offset = cp.offset, "Resuming after a previous failure");
                report.resumed = true;
                cp
            }
            None => {
                let next = self.state.next_import().await?;
                ImportCheckpoint {
                    start: format_window_date(next),
                    end: format_window_date(next + Duration::days(WINDOW_DAYS)),
                    offset: 0,
                }
            }
        };
        checkpoint.offset = checkpoint.offset.min(MAX_OFFSET);
        report.start = checkpoint.start.clone();
        report.end = checkpoint.end.clone();

        let user_filters = parse_filter_lines(&self.config.filters);
        let filters = window_filters(&checkpoint.start, &checkpoint.end, &user_filters);

        loop {
            let offset = checkpoint.offset;
            report.last_offset = offset;
            tracing::debug!(start = %checkpoint.start, end = %checkpoint.end, offset, "Fetching page");

            let page = self.source.fetch_page(&filters, offset).await?;
            report.pages += 1;
            let returned = page.items.len() as u64;
            tracing::debug!(offset, count = page.count, returned, "Page received");

            self.state.set_checkpoint(&checkpoint).await?;
            self.import_page(&page.items, report).await?;

            let remaining = page.count.saturating_sub(u64::from(offset));
            if remaining <= returned {
                break;
            }
            let next = u64::from(offset) + returned;
            if next <= u64::from(offset) || next > u64::from(MAX_OFFSET) {
                tracing::warn!(offset, next, max = MAX_OFFSET, "Not advancing past the offset limit");
                break;
            }
            checkpoint.offset = next as u32;
        }
        Ok(())
    }

    /// Import one page. Per-record failures are logged and recorded; only
    /// duplicate-key violations found during preload and state errors abort
    /// the page.
    async fn import_page(&self, items: &[Value], report: &mut ImportReport) -> SyncResult<()> {
        let ids: Vec<String> = items
            .iter()
            .filter_map(|item| item.get(KEY_ID).map(json_to_string))
            .filter(|id| !id.is_empty())
            .collect();
        EntityStore::new(self.repo, self.config.auto_delete_duplicates)
            .preload(&self.config.record_type, &self.config.external_id_field, &ids)
            .await?;

        for item in items {
            match self.import_item(item).await {
                Ok(true) => {
                    report.imported += 1;
                    self.state.increment_imported().await?;
                }
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    let key = item
                        .get(KEY_ID)
                        .map(json_to_string)
                        .filter(|id| !id.is_empty())
                        .unwrap_or_else(|| MISSING_ID_KEY.to_string());
                    tracing::error!(external_id = %key, error = %e, "Failed to import record");
                    report.failed += 1;
                    self.state.record_failure(&key, item).await?;
                }
            }
        }
        Ok(())
    }

    async fn import_item(&self, item: &Value) -> SyncResult<bool> {
        let source = SourceRecord::parse(item.clone())?;
        let ctx = ResolveContext {
            repo: self.repo,
            config: self.config,
        };
        let mut target = self.resolvers.get_or_create(&ctx, &source).await?;
        let migrator = Migrator {
            repo: self.repo,
            source: self.source,
            config: self.config,
            fields: self.fields,
        };
        migrator
            .migrate(MigrationMode::AtCreation, &source, &mut target)
            .await
    }

    /// Refresh the remaining estimate. Failures are logged only.
    pub async fn update_remaining(&self) {
        if let Err(e) = self.try_update_remaining().await {
            tracing::warn!(error = %e, "Could not figure out the remaining records");
        }
    }

    async fn try_update_remaining(&self) -> SyncResult<()> {
        let next = self.state.next_import().await?;
        let start = format_window_date(next + Duration::days(REMAINING_LOOKAHEAD_DAYS));
        let end = format_window_date(self.clock.now() + Duration::days(1));
        let user_filters = parse_filter_lines(&self.config.filters);
        let page = self
            .source
            .fetch_page(&window_filters(&start, &end, &user_filters), 0)
            .await?;
        if page.count == 0 {
            tracing::info!(start = %start, end = %end, "No count reported, keeping remaining estimate");
            return Ok(());
        }
        tracing::info!(remaining = page.count, "Updating remaining estimate");
        self.state.set_remaining(page.count).await
    }

    /// Move the next import date forward one day, never past now.
    async fn increment_cutoff(&self) -> SyncResult<()> {
        let previous = self.state.next_import().await?;
        let next = (previous + Duration::days(1)).min(self.clock.now());
        tracing::info!(next = %next, "Cutoff date incremented");
        self.state.set_next_import(next).await
    }
}
