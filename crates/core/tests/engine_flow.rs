//! End-to-end tests for the synchronization engine against the in-memory
//! source, repository and state store.

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use locsync_core::clock::FixedClock;
use locsync_core::config::{CustomFieldMapping, SyncConfig};
use locsync_core::error::SyncResult;
use locsync_core::memory::{MemoryRepository, MemorySource, MemoryStateStore};
use locsync_core::repository::TargetRepository;
use locsync_core::source::{Asset, MAX_OFFSET};
use locsync_core::state::{default_next_import, ImportCheckpoint};
use locsync_core::target::TargetRecord;
use locsync_core::types::{DbId, Timestamp};
use locsync_core::{SyncEngine, SyncError};

const ID_FIELD: &str = "field_yext_unique_id";
const RAW_FIELD: &str = "field_yext_raw";

struct Harness {
    source: Arc<MemorySource>,
    repo: Arc<MemoryRepository>,
    clock: Arc<FixedClock>,
    engine: SyncEngine,
}

fn now() -> Timestamp {
    Utc.with_ymd_and_hms(2018, 3, 1, 12, 0, 0).unwrap()
}

fn harness(config: SyncConfig, items: Vec<Value>) -> Harness {
    let source = Arc::new(MemorySource::new(items));
    let repo = Arc::new(MemoryRepository::new());
    let state = Arc::new(MemoryStateStore::new());
    let clock = Arc::new(FixedClock::new(now()));
    let engine = SyncEngine::new(source.clone(), repo.clone(), state, config)
        .with_clock(clock.clone());
    Harness {
        source,
        repo,
        clock,
        engine,
    }
}

fn item(id: &str, name: &str, ts: i64) -> Value {
    json!({"id": id, "locationName": name, "timestamp": ts})
}

fn numbered(n: usize) -> Vec<Value> {
    (0..n).map(|i| item(&format!("loc-{i}"), &format!("Location {i}"), 1)).collect()
}

fn linked(repo: &MemoryRepository, ext: &str, title: &str) -> TargetRecord {
    let mut record = TargetRecord::new(0, "article", title);
    record.set_field(ID_FIELD, ext);
    repo.insert(record)
}

// ---------------------------------------------------------------------------
// Test: monotonic overwrite scenario
// ---------------------------------------------------------------------------

/// Timestamps 2, 1, 3 for one ID: create, ignore the older snapshot, then
/// apply the newer one.
#[tokio::test]
async fn later_timestamps_win_and_older_ones_are_ignored() {
    let h = harness(SyncConfig::default(), vec![item("12345", "Hello World", 2)]);
    let report = h.engine.import_some().await.expect("first import");
    assert_eq!(report.imported, 1);

    let records = h.repo.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Hello World");
    assert_eq!(records[0].field_str(ID_FIELD), "12345");

    h.source.set_items(vec![item("12345", "Hello World2", 1)]);
    h.engine.import_some().await.expect("second import");
    assert_eq!(h.repo.all()[0].title, "Hello World");

    h.source.set_items(vec![item("12345", "Hello World2", 3)]);
    h.engine.import_some().await.expect("third import");
    let records = h.repo.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Hello World2");
}

/// Re-delivering the exact snapshot is skipped and not counted.
#[tokio::test]
async fn redelivered_snapshot_is_skipped() {
    let h = harness(SyncConfig::default(), vec![item("1", "One", 7)]);
    h.engine.import_some().await.expect("first import");
    let before = h.repo.all();

    let report = h.engine.import_some().await.expect("second import");
    assert_eq!(report.imported, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.repo.all(), before);
    assert_eq!(h.engine.state().imported().await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Test: pagination and cursors
// ---------------------------------------------------------------------------

/// Pages are fetched in increasing offset order; the remaining estimate
/// query follows at offset 0.
#[tokio::test]
async fn crawl_walks_every_page() {
    let h = harness(SyncConfig::default(), numbered(120));
    let report = h.engine.import_some().await.expect("import");

    assert_eq!(report.pages, 3);
    assert_eq!(report.imported, 120);
    assert_eq!(report.start, "2017-12-10");
    assert_eq!(report.end, "2017-12-12");
    assert_eq!(h.source.requested_offsets(), vec![0, 50, 100, 0]);
    assert_eq!(h.repo.all().len(), 120);

    let status = h.engine.status().await.unwrap();
    assert_eq!(status.imported, 120);
    assert_eq!(status.remaining, 120);
    assert_eq!(status.last_check, Some(now()));
    assert!(status.pending_checkpoint.is_none());
    assert_eq!(
        status.next_import,
        Utc.with_ymd_and_hms(2017, 12, 11, 0, 0, 0).unwrap()
    );
}

/// The window filter leads and user filters follow.
#[tokio::test]
async fn crawl_sends_window_and_user_filters() {
    let config = SyncConfig {
        filters: "[{\"locationType\":{\"is\":[2]}}]".into(),
        ..SyncConfig::default()
    };
    let h = harness(config, numbered(1));
    h.engine.import_some().await.expect("import");

    let filters = &h.source.requested_filters()[0];
    assert_eq!(
        filters,
        &vec![
            json!({"lastUpdated": {"between": ["2017-12-10", "2017-12-12"]}}),
            json!({"locationType": {"is": [2]}}),
        ]
    );
}

/// The date cursor never moves past now.
#[tokio::test]
async fn cutoff_is_capped_at_now() {
    let h = harness(SyncConfig::default(), numbered(1));
    let noon = Utc.with_ymd_and_hms(2017, 12, 10, 12, 0, 0).unwrap();
    h.clock.set(noon);

    h.engine.import_some().await.expect("import");
    assert_eq!(h.engine.state().next_import().await.unwrap(), noon);
    assert!(h.engine.state().next_import().await.unwrap() > default_next_import());
}

/// Offsets above the source limit are never requested, even when a stored
/// checkpoint asks for one.
#[tokio::test]
async fn offsets_never_exceed_the_limit() {
    let h = harness(SyncConfig::default(), numbered(10_050));
    h.engine
        .state()
        .set_checkpoint(&ImportCheckpoint {
            start: "2017-12-10".into(),
            end: "2017-12-12".into(),
            offset: 20_000,
        })
        .await
        .unwrap();

    let report = h.engine.import_some().await.expect("import");
    assert!(report.resumed);
    assert_eq!(report.pages, 1);
    assert_eq!(h.source.requested_offsets(), vec![MAX_OFFSET, 0]);
    assert!(h.source.requested_offsets().iter().all(|o| *o <= MAX_OFFSET));
}

// ---------------------------------------------------------------------------
// Test: crash-resume
// ---------------------------------------------------------------------------

/// A transport failure keeps the checkpoint and the date cursor; the next
/// run resumes at the failed page and does not recount earlier pages.
#[tokio::test]
async fn failed_crawl_resumes_from_checkpoint() {
    let h = harness(SyncConfig::default(), numbered(120));
    h.source.fail_at_offset(Some(50));

    let err = h.engine.import_some().await.unwrap_err();
    assert_matches!(err, SyncError::Transport(_));

    let status = h.engine.status().await.unwrap();
    assert_eq!(status.imported, 50);
    assert_eq!(status.next_import, default_next_import());
    assert!(status.last_check.is_none());
    let checkpoint = status.pending_checkpoint.expect("checkpoint kept");
    assert_eq!(checkpoint.offset, 0);

    h.source.fail_at_offset(None);
    let report = h.engine.import_some().await.expect("resumed import");
    assert!(report.resumed);
    assert_eq!(report.start, "2017-12-10");
    // The first page is replayed but already current, so not recounted.
    assert_eq!(report.skipped, 50);
    assert_eq!(report.imported, 70);
    assert_eq!(h.engine.state().imported().await.unwrap(), 120);
    assert_eq!(h.repo.all().len(), 120);
    assert!(h.engine.state().checkpoint().await.unwrap().is_none());
}

/// A checkpoint left mid-crawl is honoured instead of the date cursor.
#[tokio::test]
async fn stored_checkpoint_overrides_date_cursor() {
    let h = harness(SyncConfig::default(), numbered(120));
    h.engine
        .state()
        .set_checkpoint(&ImportCheckpoint {
            start: "2018-01-01".into(),
            end: "2018-01-03".into(),
            offset: 100,
        })
        .await
        .unwrap();

    let report = h.engine.import_some().await.expect("import");
    assert_eq!(report.start, "2018-01-01");
    assert_eq!(report.imported, 20);
    assert_eq!(h.source.requested_offsets()[0], 100);
}

// ---------------------------------------------------------------------------
// Test: per-record failures
// ---------------------------------------------------------------------------

/// Bad records are recorded and the rest of the page still imports.
#[tokio::test]
async fn bad_records_do_not_abort_the_page() {
    let items = vec![
        json!({"id": "no-timestamp", "locationName": "A"}),
        item("good", "Good", 4),
        json!({"locationName": "No id", "timestamp": 4}),
    ];
    let h = harness(SyncConfig::default(), items);
    let report = h.engine.import_some().await.expect("import");

    assert_eq!(report.imported, 1);
    assert_eq!(report.failed, 2);
    let failed = h.engine.state().failed().await.unwrap();
    assert!(failed.contains_key("no-timestamp"));
    assert!(failed.contains_key("<missing id>"));
    assert_eq!(failed["no-timestamp"]["locationName"], "A");
    assert_eq!(h.repo.all().len(), 1);
}

/// Repository whose saves fail for one external ID.
struct BrokenSaves {
    inner: Arc<MemoryRepository>,
    broken_id: &'static str,
}

#[async_trait]
impl TargetRepository for BrokenSaves {
    async fn find_by_field(
        &self,
        record_type: &str,
        field: &str,
        values: &[String],
    ) -> SyncResult<Vec<TargetRecord>> {
        self.inner.find_by_field(record_type, field, values).await
    }

    async fn find_by_title(&self, record_type: &str, title: &str) -> SyncResult<Vec<TargetRecord>> {
        self.inner.find_by_title(record_type, title).await
    }

    async fn load(&self, id: DbId) -> SyncResult<Option<TargetRecord>> {
        self.inner.load(id).await
    }

    async fn list_linked(
        &self,
        record_type: &str,
        external_id_field: &str,
        min_id: DbId,
        offset: i64,
        limit: i64,
    ) -> SyncResult<Vec<TargetRecord>> {
        self.inner
            .list_linked(record_type, external_id_field, min_id, offset, limit)
            .await
    }

    async fn list_active_ids(&self, record_type: &str, external_id_field: &str) -> SyncResult<Vec<DbId>> {
        self.inner.list_active_ids(record_type, external_id_field).await
    }

    async fn create(&self, record_type: &str) -> SyncResult<TargetRecord> {
        self.inner.create(record_type).await
    }

    async fn save(&self, record: &TargetRecord) -> SyncResult<()> {
        if record.field_str(ID_FIELD) == self.broken_id {
            return Err(SyncError::Repository("disk full".into()));
        }
        self.inner.save(record).await
    }

    async fn delete(&self, id: DbId) -> SyncResult<()> {
        self.inner.delete(id).await
    }

    async fn store_asset(&self, record: &TargetRecord, asset: &Asset) -> SyncResult<String> {
        self.inner.store_asset(record, asset).await
    }
}

/// A save failure is recorded against its item; the crawl still finishes
/// and advances.
#[tokio::test]
async fn save_failure_is_recorded_and_crawl_completes() {
    let source = Arc::new(MemorySource::new(vec![
        item("broken", "Broken", 4),
        item("fine", "Fine", 4),
    ]));
    let memory = Arc::new(MemoryRepository::new());
    let repo = Arc::new(BrokenSaves {
        inner: memory.clone(),
        broken_id: "broken",
    });
    let engine = SyncEngine::new(source, repo, Arc::new(MemoryStateStore::new()), SyncConfig::default())
        .with_clock(Arc::new(FixedClock::new(now())));

    let report = engine.import_some().await.expect("import");
    assert_eq!(report.imported, 1);
    assert_eq!(report.failed, 1);

    let status = engine.status().await.unwrap();
    assert!(status.pending_checkpoint.is_none());
    assert!(status.next_import > default_next_import());
    assert!(engine.state().failed().await.unwrap().contains_key("broken"));
    assert!(memory.all().iter().any(|r| r.title == "Fine"));
}

// ---------------------------------------------------------------------------
// Test: uniqueness
// ---------------------------------------------------------------------------

/// One external ID delivered twice on a page maps to a single record.
#[tokio::test]
async fn at_most_one_target_per_external_id() {
    let items = vec![item("x", "First", 1), item("x", "Second", 2)];
    let h = harness(SyncConfig::default(), items);
    h.engine.import_some().await.expect("import");

    let records = h.repo.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Second");
}

/// Pre-existing duplicates abort the crawl unless auto-deletion is on.
#[tokio::test]
async fn duplicate_keys_abort_or_are_cleaned_up() {
    let h = harness(SyncConfig::default(), vec![item("dup", "Dup", 5)]);
    let first = linked(&h.repo, "dup", "one");
    linked(&h.repo, "dup", "two");

    let err = h.engine.import_some().await.unwrap_err();
    assert_matches!(err, SyncError::DuplicateKey { kept_id, .. } if kept_id == first.id);
    assert!(h.engine.state().checkpoint().await.unwrap().is_some());

    let config = SyncConfig {
        auto_delete_duplicates: true,
        ..SyncConfig::default()
    };
    let h = harness(config, vec![item("dup", "Dup", 5)]);
    let first = linked(&h.repo, "dup", "one");
    linked(&h.repo, "dup", "two");

    h.engine.import_some().await.expect("import");
    let records = h.repo.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, first.id);
    assert_eq!(records[0].title, "Dup");
}

/// Title matching links a single unlinked record instead of creating one.
#[tokio::test]
async fn title_match_links_existing_record() {
    let config = SyncConfig {
        find_by_title: true,
        ..SyncConfig::default()
    };
    let h = harness(config, vec![item("t-1", "Clinic", 9)]);
    let existing = h.repo.insert(TargetRecord::new(0, "article", "Clinic"));

    h.engine.import_some().await.expect("import");
    let records = h.repo.all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, existing.id);
    assert_eq!(records[0].field_str(ID_FIELD), "t-1");
}

// ---------------------------------------------------------------------------
// Test: deletion sweep
// ---------------------------------------------------------------------------

/// Records the source no longer has are marked, unpublished and skipped by
/// later sweeps.
#[tokio::test]
async fn sweep_marks_vanished_records() {
    let h = harness(SyncConfig::default(), vec![item("a", "A", 1), item("c", "C", 1)]);
    linked(&h.repo, "a", "A");
    let mut gone = TargetRecord::new(0, "article", "B");
    gone.set_field(ID_FIELD, "b");
    gone.set_field(RAW_FIELD, "{\"id\":\"b\",\"timestamp\":1}");
    let gone = h.repo.insert(gone);
    linked(&h.repo, "c", "C");
    h.engine.state().set_sweep_batch_size(10).await.unwrap();

    let report = h.engine.sweep_deleted().await.expect("sweep");
    assert_eq!(report.checked.len(), 3);
    assert_eq!(report.deleted, vec![gone.id]);

    let marked = h.repo.get(gone.id).unwrap();
    assert!(!marked.published);
    assert_eq!(marked.field_str(ID_FIELD), "DELETED FROM SOURCE b");
    assert!(marked.field_str(RAW_FIELD).contains("DELETED FROM SOURCE b"));

    let active = h.repo.list_active_ids("article", ID_FIELD).await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(!active.contains(&gone.id));
}

/// With the default batch of one the cursor walks the records in turn.
#[tokio::test]
async fn sweep_cursor_advances_each_run() {
    let h = harness(SyncConfig::default(), vec![item("a", "A", 1), item("b", "B", 1)]);
    let a = linked(&h.repo, "a", "A");
    let b = linked(&h.repo, "b", "B");

    let first = h.engine.sweep_deleted().await.unwrap();
    assert_eq!(first.checked, vec![a.id]);
    let second = h.engine.sweep_deleted().await.unwrap();
    assert_eq!(second.checked, vec![b.id]);
    let third = h.engine.sweep_deleted().await.unwrap();
    assert_eq!(third.checked, vec![a.id]);
}

/// An empty repository leaves the cursor untouched.
#[tokio::test]
async fn sweep_with_no_records_keeps_cursor() {
    let h = harness(SyncConfig::default(), vec![]);
    h.engine.state().set_sweep_first(42).await.unwrap();
    let report = h.engine.sweep_deleted().await.unwrap();
    assert!(report.checked.is_empty());
    assert_eq!(h.engine.state().sweep_first().await.unwrap(), 42);
}

// ---------------------------------------------------------------------------
// Test: on-save processing
// ---------------------------------------------------------------------------

/// An empty raw mirror is refreshed from the source and re-applied.
#[tokio::test]
async fn presave_refreshes_empty_raw_and_reapplies() {
    let mut config = SyncConfig::default();
    config.field_map.bio = Some("field_bio".into());
    let source_item = json!({"id": "p-1", "locationName": "Fresh", "description": "Bio", "timestamp": 3});
    let h = harness(config, vec![source_item.clone()]);

    let mut record = linked(&h.repo, "p-1", "Stale");
    h.engine.presave(&mut record).await;

    assert_eq!(record.title, "Fresh");
    assert_eq!(record.field_str("field_bio"), "Bio");
    let raw: Value = serde_json::from_str(record.field_str(RAW_FIELD)).unwrap();
    assert_eq!(raw, source_item);
}

/// An ID the source rejects unpublishes the record when configured to.
#[tokio::test]
async fn presave_unpublishes_invalid_ids() {
    let config = SyncConfig {
        unpublish_on_invalid_id: true,
        ..SyncConfig::default()
    };
    let h = harness(config, vec![]);
    let mut record = linked(&h.repo, "missing", "Kept");
    h.engine.presave(&mut record).await;

    assert!(!record.published);
    assert_eq!(record.title, "Kept");
    assert!(record.field_str(RAW_FIELD).contains("Unpublishing record"));

    let h = harness(SyncConfig::default(), vec![]);
    let mut record = linked(&h.repo, "missing", "Kept");
    h.engine.presave(&mut record).await;
    assert!(record.published);
}

/// Resaving re-projects a newly added custom mapping from stored raw data.
#[tokio::test]
async fn resave_all_applies_new_mappings() {
    let h = harness(SyncConfig::default(), numbered(5));
    h.engine.import_some().await.expect("import");
    assert!(h.repo.all().iter().all(|r| r.field("field_city").is_none()));

    let mut config = SyncConfig::default();
    config.field_map.custom.push(CustomFieldMapping {
        source_id: "locationName".into(),
        target_field: "field_city".into(),
    });
    let engine = SyncEngine::new(
        h.source.clone(),
        h.repo.clone(),
        Arc::new(MemoryStateStore::new()),
        config,
    );

    let saved = engine.resave_all_existing(2, 0).await.expect("resave");
    assert_eq!(saved, 5);
    for record in h.repo.all() {
        assert_eq!(record.field_str("field_city"), record.title);
    }
}

// ---------------------------------------------------------------------------
// Test: administration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reset_and_set_next_date() {
    let h = harness(SyncConfig::default(), numbered(3));
    h.engine.import_some().await.expect("import");

    h.engine.set_next_date("2019-06-01").await.unwrap();
    assert_eq!(
        h.engine.status().await.unwrap().next_import,
        Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap()
    );
    assert_matches!(
        h.engine.set_next_date("June first").await,
        Err(SyncError::Config(_))
    );

    h.engine.reset_all().await.unwrap();
    let status = h.engine.status().await.unwrap();
    assert_eq!(status.imported, 0);
    assert_eq!(status.remaining, 999_999);
    assert_eq!(status.failed, 0);
    assert!(status.last_check.is_none());
    assert_eq!(status.next_import, default_next_import());
}
