//! The synchronization engine: one explicitly constructed service object
//! holding the collaborators and configuration, exposing every job the host
//! can trigger.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::fields::FieldParserChain;
use crate::import::{ImportReport, Importer};
use crate::migrate::{MigrationMode, Migrator};
use crate::record::SourceRecord;
use crate::repository::{TargetRepository, DELETED_MARKER};
use crate::resolve::{RecordResolverChain, ResolveContext};
use crate::source::SourceClient;
use crate::state::{ImportCheckpoint, StateStore, SyncState};
use crate::sweep::{DeletionSweep, SweepReport};
use crate::target::TargetRecord;
use crate::types::{DbId, Timestamp};

/// Counters and cursors for the surrounding UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub imported: u64,
    pub failed: usize,
    pub remaining: u64,
    pub last_check: Option<Timestamp>,
    pub next_import: Timestamp,
    pub pending_checkpoint: Option<ImportCheckpoint>,
}

pub struct SyncEngine {
    source: Arc<dyn SourceClient>,
    repo: Arc<dyn TargetRepository>,
    state: SyncState,
    config: SyncConfig,
    fields: FieldParserChain,
    resolvers: RecordResolverChain,
    clock: Arc<dyn Clock>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn SourceClient>,
        repo: Arc<dyn TargetRepository>,
        state: Arc<dyn StateStore>,
        config: SyncConfig,
    ) -> Self {
        let resolvers = RecordResolverChain::for_config(&config);
        Self {
            source,
            repo,
            state: SyncState::new(state),
            config,
            fields: FieldParserChain::with_defaults(),
            resolvers,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the field parser chain, e.g. to register extra parsers.
    pub fn with_field_parsers(mut self, fields: FieldParserChain) -> Self {
        self.fields = fields;
        self
    }

    /// Replace the record resolver chain, e.g. to register extra resolvers.
    pub fn with_resolvers(mut self, resolvers: RecordResolverChain) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    fn importer(&self) -> Importer<'_> {
        Importer {
            repo: self.repo.as_ref(),
            source: self.source.as_ref(),
            state: &self.state,
            config: &self.config,
            fields: &self.fields,
            resolvers: &self.resolvers,
            clock: self.clock.as_ref(),
        }
    }

    fn migrator(&self) -> Migrator<'_> {
        Migrator {
            repo: self.repo.as_ref(),
            source: self.source.as_ref(),
            config: &self.config,
            fields: &self.fields,
        }
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    /// One crawl invocation.
    pub async fn import_some(&self) -> SyncResult<ImportReport> {
        self.importer().import_some().await
    }

    /// One deletion-sweep invocation.
    pub async fn sweep_deleted(&self) -> SyncResult<SweepReport> {
        DeletionSweep {
            repo: self.repo.as_ref(),
            source: self.source.as_ref(),
            state: &self.state,
            config: &self.config,
        }
        .run()
        .await
    }

    /// Migrate `item` straight into the record it resolves to, without
    /// touching counters or the checkpoint.
    pub async fn import_record(&self, item: serde_json::Value) -> SyncResult<(TargetRecord, bool)> {
        let source = SourceRecord::parse(item)?;
        let ctx = ResolveContext {
            repo: self.repo.as_ref(),
            config: &self.config,
        };
        let mut target = self.resolvers.get_or_create(&ctx, &source).await?;
        let changed = self
            .migrator()
            .migrate(MigrationMode::AtCreation, &source, &mut target)
            .await?;
        Ok((target, changed))
    }

    // -----------------------------------------------------------------------
    // On-save processing
    // -----------------------------------------------------------------------

    /// Processing to run on a record about to be saved by the host.
    ///
    /// Refreshes the raw mirror from the source when needed, then re-applies
    /// the stored raw JSON to the record's mapped fields. Problems are logged
    /// and never returned, so the host's save always proceeds.
    pub async fn presave(&self, record: &mut TargetRecord) {
        if record.record_type != self.config.record_type {
            return;
        }
        let external_id = record.field_str(&self.config.external_id_field).to_string();
        if external_id.is_empty() || external_id.contains(DELETED_MARKER) {
            return;
        }
        let Some(raw_field) = self.config.field_map.raw.clone() else {
            return;
        };

        if self.raw_updatable(record, &raw_field) {
            self.update_raw(record, &raw_field, &external_id).await;
        }

        let raw = record.field_str(&raw_field).to_string();
        if raw.is_empty() {
            return;
        }
        let source = match SourceRecord::from_json(&raw) {
            Ok(source) => source,
            Err(e) => {
                tracing::debug!(target_id = record.id, error = %e, "Raw mirror is not a source record, not re-applying");
                return;
            }
        };
        if let Err(e) = self
            .migrator()
            .migrate(MigrationMode::OnSave, &source, record)
            .await
        {
            tracing::error!(target_id = record.id, error = %e, "Re-applying raw mirror failed");
        }
    }

    fn raw_updatable(&self, record: &TargetRecord, raw_field: &str) -> bool {
        self.config.update_raw_on_save || record.field_str(raw_field).is_empty()
    }

    async fn update_raw(&self, record: &mut TargetRecord, raw_field: &str, external_id: &str) {
        if self.config.dry_run {
            tracing::debug!(target_id = record.id, "Dry run, not refreshing raw mirror");
            return;
        }
        tracing::info!(target_id = record.id, external_id, "Refreshing raw mirror from source");
        match self.source.fetch_by_id(external_id).await {
            Ok(item) => record.set_field(raw_field, item.to_string()),
            Err(e) => {
                tracing::error!(target_id = record.id, external_id, error = %e, "Could not refresh raw mirror");
                if self.config.unpublish_on_invalid_id {
                    let message = format!(
                        "Unpublishing record {} (source id {external_id}) because the source returned: {e}",
                        record.id
                    );
                    tracing::warn!(target_id = record.id, external_id, "Unpublishing record with invalid source ID");
                    record.set_field(raw_field, serde_json::Value::String(message).to_string());
                    record.unpublish();
                }
            }
        }
    }

    /// Run on-save processing over every linked record, in chunks of
    /// `chunk_size`, starting at record ID `start_at`. Returns the number of
    /// records saved.
    pub async fn resave_all_existing(&self, chunk_size: usize, start_at: DbId) -> SyncResult<usize> {
        let chunk = i64::try_from(chunk_size.max(1)).unwrap_or(i64::MAX);
        let mut offset = 0i64;
        let mut saved = 0usize;
        let mut chunk_no = 0usize;
        loop {
            let records = self
                .repo
                .list_linked(
                    &self.config.record_type,
                    &self.config.external_id_field,
                    start_at,
                    offset,
                    chunk,
                )
                .await?;
            if records.is_empty() {
                break;
            }
            tracing::info!(chunk = chunk_no, records = records.len(), "Processing chunk");
            for mut record in records {
                tracing::debug!(target_id = record.id, "Resaving existing record");
                self.presave(&mut record).await;
                self.repo.save(&record).await?;
                saved += 1;
            }
            chunk_no += 1;
            offset += chunk;
        }
        Ok(saved)
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    /// Restore counters and the date cursor to fresh-install values.
    pub async fn reset_all(&self) -> SyncResult<()> {
        tracing::info!("Resetting import state");
        self.state.reset_all().await
    }

    /// Set the next import date from `YYYY-MM-DD`.
    pub async fn set_next_date(&self, date: &str) -> SyncResult<()> {
        let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|e| SyncError::Config(format!("'{date}' is not a YYYY-MM-DD date: {e}")))?;
        let at = day
            .and_hms_opt(0, 0, 0)
            .map(|dt| Utc.from_utc_datetime(&dt))
            .ok_or_else(|| SyncError::Config(format!("'{date}' has no midnight")))?;
        tracing::info!(next_import = %at, "Next import date set");
        self.state.set_next_import(at).await
    }

    pub async fn status(&self) -> SyncResult<SyncStatus> {
        Ok(SyncStatus {
            imported: self.state.imported().await?,
            failed: self.state.failed().await?.len(),
            remaining: self.state.remaining().await?,
            last_check: self.state.last_check().await?,
            next_import: self.state.next_import().await?,
            pending_checkpoint: self.state.checkpoint().await?,
        })
    }

    /// External IDs of the failed items, for display.
    pub async fn failed_ids(&self) -> SyncResult<Vec<String>> {
        Ok(self.state.failed().await?.into_keys().collect())
    }
}
