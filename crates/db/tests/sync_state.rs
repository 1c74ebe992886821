//! Integration tests for the PostgreSQL state store and the engine running
//! on top of it.

use std::sync::Arc;

use locsync_core::config::SyncConfig;
use locsync_core::memory::MemorySource;
use locsync_core::repository::TargetRepository;
use locsync_core::state::{ImportCheckpoint, StateStore, SyncState};
use locsync_core::SyncEngine;
use locsync_db::{PgStateStore, PgTargetRepository};
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../db/migrations")]
async fn get_set_delete(pool: PgPool) {
    let store = PgStateStore::new(pool);
    assert!(store.get("k").await.unwrap().is_none());

    store.set("k", json!({"a": 1})).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));

    store.set("k", json!(2)).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));

    store.delete("k").await.unwrap();
    assert!(store.get("k").await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn typed_state_persists_checkpoint(pool: PgPool) {
    let state = SyncState::new(Arc::new(PgStateStore::new(pool.clone())));
    let checkpoint = ImportCheckpoint {
        start: "2017-12-10".into(),
        end: "2017-12-12".into(),
        offset: 150,
    };
    state.set_checkpoint(&checkpoint).await.unwrap();
    state.increment_imported().await.unwrap();

    let reopened = SyncState::new(Arc::new(PgStateStore::new(pool)));
    assert_eq!(reopened.checkpoint().await.unwrap(), Some(checkpoint));
    assert_eq!(reopened.imported().await.unwrap(), 1);
}

/// A full crawl against Postgres creates one record per external ID and
/// re-running it changes nothing.
#[sqlx::test(migrations = "../../db/migrations")]
async fn engine_imports_into_postgres(pool: PgPool) {
    let source = Arc::new(MemorySource::new(vec![
        json!({"id": "12345", "locationName": "Hello World", "timestamp": 2}),
        json!({"id": "67890", "locationName": "Second", "timestamp": 5}),
    ]));
    let repo = Arc::new(PgTargetRepository::new(pool.clone(), std::env::temp_dir()));
    let state = Arc::new(PgStateStore::new(pool));
    let engine = SyncEngine::new(source, repo.clone(), state, SyncConfig::default());

    let report = engine.import_some().await.unwrap();
    assert_eq!(report.imported, 2);

    let found = repo
        .find_by_field("article", "field_yext_unique_id", &["12345".into()])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "Hello World");
    assert_eq!(found[0].field_str("field_yext_last_updated"), "2");

    let again = engine.import_some().await.unwrap();
    assert_eq!(again.imported, 0);
    assert_eq!(again.skipped, 2);
    assert_eq!(engine.status().await.unwrap().imported, 2);
}
