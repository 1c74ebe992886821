//! Round-Robin Sweep Cursor and the deletion sweep built on it.

use serde::Serialize;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::repository::TargetRepository;
use crate::source::SourceClient;
use crate::state::SyncState;
use crate::target::TargetRecord;
use crate::types::DbId;

/// Prefix written in front of the external ID of a record that vanished
/// from the source.
pub const DELETED_PREFIX: &str = "DELETED FROM SOURCE";

/// Pick this run's batch from `ids`, starting at `first` and wrapping around.
///
/// Returns the batch and the cursor for the next run, or `None` when there
/// is nothing to sweep (the cursor must then be left untouched). A `first`
/// no longer present in `ids` restarts from the lowest ID.
pub fn select_batch(ids: &[DbId], first: DbId, batch_size: usize) -> Option<(Vec<DbId>, DbId)> {
    if ids.is_empty() {
        return None;
    }
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let position = sorted.iter().position(|id| *id == first).unwrap_or(0);
    sorted.rotate_left(position);

    let take = batch_size.min(sorted.len());
    let next_first = sorted.get(take).copied().unwrap_or(sorted[0]);
    sorted.truncate(take);
    Some((sorted, next_first))
}

/// External ID value marking a record as deleted from the source.
pub fn deleted_marker(old_id: &str) -> String {
    format!("{DELETED_PREFIX} {old_id}")
}

/// Outcome of one sweep invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: Vec<DbId>,
    pub deleted: Vec<DbId>,
    pub errors: usize,
    pub next_first: Option<DbId>,
}

pub struct DeletionSweep<'a> {
    pub repo: &'a dyn TargetRepository,
    pub source: &'a dyn SourceClient,
    pub state: &'a SyncState,
    pub config: &'a SyncConfig,
}

impl DeletionSweep<'_> {
    /// Check the next batch of active records against the source and mark
    /// the ones it no longer has. The cursor is persisted before any check
    /// so it advances whatever the outcome.
    pub async fn run(&self) -> SyncResult<SweepReport> {
        let ids = self
            .repo
            .list_active_ids(&self.config.record_type, &self.config.external_id_field)
            .await?;
        let first = self.state.sweep_first().await?;
        let batch_size = self.state.sweep_batch_size().await?;

        let Some((batch, next_first)) = select_batch(&ids, first, batch_size) else {
            tracing::info!("No active records to sweep");
            return Ok(SweepReport::default());
        };
        self.state.set_sweep_first(next_first).await?;
        tracing::info!(batch = ?batch, next_first, "Sweeping records for deletions");

        let mut report = SweepReport {
            next_first: Some(next_first),
            ..SweepReport::default()
        };
        for id in batch {
            report.checked.push(id);
            match self.check(id).await {
                Ok(true) => report.deleted.push(id),
                Ok(false) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(target_id = id, error = %e, "Sweep check failed, record left unchanged");
                }
            }
        }
        Ok(report)
    }

    async fn check(&self, id: DbId) -> SyncResult<bool> {
        let Some(mut record) = self.repo.load(id).await? else {
            tracing::warn!(target_id = id, "Record vanished before it could be checked");
            return Ok(false);
        };
        let external_id = record.field_str(&self.config.external_id_field).to_string();
        match self.source.fetch_by_id(&external_id).await {
            Ok(_) => {
                tracing::debug!(target_id = id, external_id = %external_id, "Still present in source");
                Ok(false)
            }
            Err(SyncError::NotFound(_)) => {
                self.mark_deleted(&mut record, &external_id).await?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    async fn mark_deleted(&self, record: &mut TargetRecord, old_id: &str) -> SyncResult<()> {
        let marker = deleted_marker(old_id);
        record.set_field(&self.config.external_id_field, marker.as_str());
        if let Some(raw_field) = self.config.field_map.raw.as_deref() {
            let raw = record.field_str(raw_field);
            if !raw.is_empty() {
                let rewritten = raw.replace(&format!("\"{old_id}\""), &format!("\"{marker}\""));
                record.set_field(raw_field, rewritten);
            }
        }
        record.unpublish();
        self.repo.save(record).await?;
        tracing::info!(target_id = record.id, external_id = %old_id, "Marked deleted from source");
        Ok(())
    }
}
