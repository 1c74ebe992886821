//! Repository for the `sync_state` key/value table.

use sqlx::PgPool;

use crate::models::sync_state::SyncStateRow;

/// Column list for `sync_state` queries.
const COLUMNS: &str = "key, value, updated_at";

pub struct SyncStateRepo;

impl SyncStateRepo {
    pub async fn find(pool: &PgPool, key: &str) -> Result<Option<SyncStateRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sync_state WHERE key = $1");
        sqlx::query_as::<_, SyncStateRow>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Insert or replace the value stored under `key`.
    pub async fn upsert(
        pool: &PgPool,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<SyncStateRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO sync_state (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET \
                 value      = EXCLUDED.value, \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SyncStateRow>(&query)
            .bind(key)
            .bind(value)
            .fetch_one(pool)
            .await
    }

    /// Returns whether a row was removed.
    pub async fn delete(pool: &PgPool, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sync_state WHERE key = $1")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
