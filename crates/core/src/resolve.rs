//! Record Resolution Pipeline.
//!
//! Decides which existing target record an incoming source record maps to.
//! Resolvers run in ascending weight and may only fill an empty slot; when
//! none binds a record, a new one is created and saved immediately.

use async_trait::async_trait;

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::record::SourceRecord;
use crate::repository::TargetRepository;
use crate::store::EntityStore;
use crate::target::TargetRecord;

/// Collaborators available to resolvers.
pub struct ResolveContext<'a> {
    pub repo: &'a dyn TargetRepository,
    pub config: &'a SyncConfig,
}

/// The target slot shared by all resolvers for one source record.
#[derive(Debug, Default)]
pub struct Resolution {
    target: Option<TargetRecord>,
}

impl Resolution {
    pub fn is_bound(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<&TargetRecord> {
        self.target.as_ref()
    }

    /// Bind `record` unless a target is already bound. Returns whether the
    /// record was bound.
    pub fn bind(&mut self, record: TargetRecord) -> bool {
        if self.target.is_some() {
            return false;
        }
        self.target = Some(record);
        true
    }

    pub fn into_target(self) -> Option<TargetRecord> {
        self.target
    }
}

#[async_trait]
pub trait RecordResolver: Send + Sync {
    fn id(&self) -> &'static str;

    fn weight(&self) -> i32;

    async fn alter(
        &self,
        ctx: &ResolveContext<'_>,
        resolution: &mut Resolution,
        source: &SourceRecord,
    ) -> SyncResult<()>;
}

// ---------------------------------------------------------------------------
// Built-in resolvers
// ---------------------------------------------------------------------------

/// Binds the record already linked to the incoming external ID.
#[derive(Debug, Default)]
pub struct ExistingByExternalId;

#[async_trait]
impl RecordResolver for ExistingByExternalId {
    fn id(&self) -> &'static str {
        "existing_by_external_id"
    }

    fn weight(&self) -> i32 {
        -1
    }

    async fn alter(
        &self,
        ctx: &ResolveContext<'_>,
        resolution: &mut Resolution,
        source: &SourceRecord,
    ) -> SyncResult<()> {
        if resolution.is_bound() {
            return Ok(());
        }
        let store = EntityStore::new(ctx.repo, ctx.config.auto_delete_duplicates);
        let mut found = store
            .preload(
                &ctx.config.record_type,
                &ctx.config.external_id_field,
                &[source.external_id().to_string()],
            )
            .await?;
        if let Some(record) = found.remove(source.external_id()) {
            tracing::debug!(external_id = source.external_id(), target_id = record.id, "Matched by external ID");
            resolution.bind(record);
        }
        Ok(())
    }
}

/// Binds an unlinked record whose title equals the source name, but only
/// when exactly one candidate exists.
#[derive(Debug, Default)]
pub struct ExistingByTitle;

#[async_trait]
impl RecordResolver for ExistingByTitle {
    fn id(&self) -> &'static str {
        "existing_by_title"
    }

    fn weight(&self) -> i32 {
        100
    }

    async fn alter(
        &self,
        ctx: &ResolveContext<'_>,
        resolution: &mut Resolution,
        source: &SourceRecord,
    ) -> SyncResult<()> {
        if resolution.is_bound() {
            return Ok(());
        }
        let name = source.name();
        if name.is_empty() {
            return Ok(());
        }
        let mut candidates: Vec<TargetRecord> = ctx
            .repo
            .find_by_title(&ctx.config.record_type, &name)
            .await?
            .into_iter()
            .filter(|r| r.field_str(&ctx.config.external_id_field).is_empty())
            .collect();

        match candidates.len() {
            1 => {
                if let Some(record) = candidates.pop() {
                    tracing::info!(
                        external_id = source.external_id(),
                        target_id = record.id,
                        title = %name,
                        "Matched unlinked record by title"
                    );
                    resolution.bind(record);
                }
            }
            0 => {}
            n => {
                tracing::info!(
                    external_id = source.external_id(),
                    title = %name,
                    candidates = n,
                    "Several unlinked records share this title, not guessing"
                );
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

pub struct RecordResolverChain {
    resolvers: Vec<Box<dyn RecordResolver>>,
}

impl RecordResolverChain {
    pub fn empty() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    /// External-ID matching always; title matching when enabled.
    pub fn for_config(config: &SyncConfig) -> Self {
        let mut chain = Self::empty();
        chain.register(Box::new(ExistingByExternalId));
        if config.find_by_title {
            chain.register(Box::new(ExistingByTitle));
        }
        chain
    }

    pub fn register(&mut self, resolver: Box<dyn RecordResolver>) {
        self.resolvers.push(resolver);
        self.resolvers.sort_by_key(|r| r.weight());
    }

    pub fn resolver_ids(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.id()).collect()
    }

    pub async fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
        source: &SourceRecord,
    ) -> SyncResult<Resolution> {
        let mut resolution = Resolution::default();
        for resolver in &self.resolvers {
            resolver.alter(ctx, &mut resolution, source).await?;
        }
        Ok(resolution)
    }

    /// Resolve, falling back to a new record linked to the source's external
    /// ID and persisted before returning.
    pub async fn get_or_create(
        &self,
        ctx: &ResolveContext<'_>,
        source: &SourceRecord,
    ) -> SyncResult<TargetRecord> {
        if let Some(record) = self.resolve(ctx, source).await?.into_target() {
            return Ok(record);
        }
        let mut record = ctx.repo.create(&ctx.config.record_type).await?;
        record.set_field(&ctx.config.external_id_field, source.external_id());
        ctx.repo.save(&record).await?;
        tracing::info!(external_id = source.external_id(), target_id = record.id, "Created target record");
        Ok(record)
    }
}
