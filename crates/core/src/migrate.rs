//! Conditional Migrator: copies source fields onto a target record.
//!
//! Three modes share one field-copy routine and differ in gating, raw mirror
//! handling and persistence:
//!
//! | Mode | Gated on last-updated | Writes raw mirror | Saves |
//! |------|-----------------------|-------------------|-------|
//! | [`MigrationMode::AtCreation`] | yes | yes | yes |
//! | [`MigrationMode::Direct`]     | yes | yes | no  |
//! | [`MigrationMode::OnSave`]     | no  | no  | no  |
//!
//! `OnSave` re-applies a record's own stored raw JSON so newly added field
//! mappings reach records that were synced before the mapping existed.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::fields::FieldParserChain;
use crate::record::SourceRecord;
use crate::repository::TargetRepository;
use crate::source::SourceClient;
use crate::target::TargetRecord;
use crate::value::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationMode {
    /// Crawl import: overwrite when stale, then save.
    AtCreation,
    /// Overwrite when stale; the caller saves.
    Direct,
    /// Self re-application during on-save processing; the caller saves.
    OnSave,
}

impl MigrationMode {
    fn is_gated(self) -> bool {
        !matches!(self, Self::OnSave)
    }

    fn writes_raw(self) -> bool {
        !matches!(self, Self::OnSave)
    }

    fn saves(self) -> bool {
        matches!(self, Self::AtCreation)
    }
}

pub struct Migrator<'a> {
    pub repo: &'a dyn TargetRepository,
    pub source: &'a dyn SourceClient,
    pub config: &'a SyncConfig,
    pub fields: &'a FieldParserChain,
}

impl Migrator<'_> {
    /// Copy `from` onto `to`. Returns whether any change was applied.
    pub async fn migrate(
        &self,
        mode: MigrationMode,
        from: &SourceRecord,
        to: &mut TargetRecord,
    ) -> SyncResult<bool> {
        if mode.is_gated() && self.is_current(from, to) {
            tracing::debug!(
                external_id = from.external_id(),
                target_id = to.id,
                last_updated = from.last_updated(),
                "Target is current, skipping migration"
            );
            return Ok(false);
        }

        self.copy_fields(from, to).await;

        if mode.writes_raw() {
            if let Some(raw_field) = self.config.field_map.raw.as_deref() {
                to.set_field(raw_field, from.raw_json());
            }
        }

        if mode.saves() {
            self.repo.save(to).await?;
        }

        tracing::info!(
            external_id = from.external_id(),
            target_id = to.id,
            ?mode,
            "Migration occurred"
        );
        Ok(true)
    }

    /// Whether the stored last-synchronized timestamp is at or past the
    /// source's. Older snapshots never overwrite newer data.
    fn is_current(&self, from: &SourceRecord, to: &TargetRecord) -> bool {
        let stored = to.field_str(&self.config.last_updated_field);
        if stored.is_empty() {
            return false;
        }
        match stored.trim().parse::<i64>() {
            Ok(ts) => ts >= from.last_updated(),
            Err(_) => {
                tracing::warn!(
                    target_id = to.id,
                    stored,
                    "Stored last-updated value is not a timestamp, treating as stale"
                );
                false
            }
        }
    }

    async fn copy_fields(&self, from: &SourceRecord, to: &mut TargetRecord) {
        let map = &self.config.field_map;

        let name = from.name();
        if name.is_empty() {
            tracing::warn!(
                external_id = from.external_id(),
                target_id = to.id,
                "Source name is empty, keeping existing title"
            );
        } else {
            to.title = name;
        }

        if let Some(field) = map.bio.as_deref() {
            to.set_field(field, from.bio());
        }

        if let Some(field) = map.headshot.as_deref() {
            if let Err(e) = self.copy_headshot(from, to, field).await {
                tracing::error!(
                    external_id = from.external_id(),
                    target_id = to.id,
                    error = %e,
                    "Headshot not updated"
                );
            }
        }

        if let (Some(field), Some(geo)) = (map.geo.as_deref(), from.geo()) {
            to.set_field(field, vec![geo.lat, geo.lon]);
        }

        for custom in &map.custom {
            let values = self.fields.resolve(from, &custom.source_id);
            to.set_field(&custom.target_field, FieldValue::from_parsed(values));
        }

        // The external ID is never empty on a parsed record; keep the guard
        // for records built from stale raw mirrors.
        if from.external_id().is_empty() {
            tracing::warn!(target_id = to.id, "Refusing to clear the external ID");
        } else {
            to.set_field(&self.config.external_id_field, from.external_id());
        }

        to.set_field(
            &self.config.last_updated_field,
            from.last_updated().to_string(),
        );
    }

    async fn copy_headshot(
        &self,
        from: &SourceRecord,
        to: &mut TargetRecord,
        field: &str,
    ) -> SyncResult<()> {
        let url = from.headshot_url();
        if url.is_empty() {
            return Ok(());
        }
        if self.config.dry_run {
            tracing::debug!(target_id = to.id, url = %url, "Dry run, not downloading headshot");
            return Ok(());
        }
        let asset = self.source.fetch_asset(&url).await?;
        if asset.bytes.is_empty() {
            return Err(SyncError::AssetFetch(format!("{url} returned an empty body")));
        }
        let reference = self.repo.store_asset(to, &asset).await?;
        to.set_field(field, reference);
        Ok(())
    }
}
