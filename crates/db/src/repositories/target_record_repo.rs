//! Repository for the `target_records` table.

use std::collections::BTreeMap;

use locsync_core::types::DbId;
use locsync_core::value::FieldValue;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::target_record::TargetRecordRow;

/// Column list for `target_records` queries.
const COLUMNS: &str = "id, record_type, title, published, fields, created_at, updated_at";

/// Text of the field named by `$2`: the first element for list values, the
/// value itself for scalars, `''` when absent.
const FIELD_FIRST_VALUE: &str = "COALESCE(CASE jsonb_typeof(fields->$2) \
     WHEN 'array' THEN fields->$2->>0 ELSE fields->>$2 END, '')";

/// Provides CRUD and lookup operations for target records.
pub struct TargetRecordRepo;

impl TargetRecordRepo {
    /// Insert a record with no fields, returning the created row.
    pub async fn create(
        pool: &PgPool,
        record_type: &str,
        title: &str,
    ) -> Result<TargetRecordRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO target_records (record_type, title) \
             VALUES ($1, $2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TargetRecordRow>(&query)
            .bind(record_type)
            .bind(title)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<TargetRecordRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM target_records WHERE id = $1");
        sqlx::query_as::<_, TargetRecordRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Records of a type whose `field` holds one of `values`, lowest ID first.
    pub async fn find_by_field(
        pool: &PgPool,
        record_type: &str,
        field: &str,
        values: &[String],
    ) -> Result<Vec<TargetRecordRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM target_records \
             WHERE record_type = $1 AND {FIELD_FIRST_VALUE} = ANY($3) \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, TargetRecordRow>(&query)
            .bind(record_type)
            .bind(field)
            .bind(values)
            .fetch_all(pool)
            .await
    }

    /// Records of a type with exactly this title, lowest ID first.
    pub async fn find_by_title(
        pool: &PgPool,
        record_type: &str,
        title: &str,
    ) -> Result<Vec<TargetRecordRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM target_records \
             WHERE record_type = $1 AND title = $2 \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, TargetRecordRow>(&query)
            .bind(record_type)
            .bind(title)
            .fetch_all(pool)
            .await
    }

    /// One chunk of records with a non-empty `field`, from `min_id` upward.
    pub async fn list_linked(
        pool: &PgPool,
        record_type: &str,
        field: &str,
        min_id: DbId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<TargetRecordRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM target_records \
             WHERE record_type = $1 AND {FIELD_FIRST_VALUE} <> '' AND id >= $3 \
             ORDER BY id ASC \
             OFFSET $4 LIMIT $5"
        );
        sqlx::query_as::<_, TargetRecordRow>(&query)
            .bind(record_type)
            .bind(field)
            .bind(min_id)
            .bind(offset)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// IDs of published records with a non-empty `field` that does not
    /// contain `marker`, ascending.
    pub async fn list_active_ids(
        pool: &PgPool,
        record_type: &str,
        field: &str,
        marker: &str,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let query = format!(
            "SELECT id FROM target_records \
             WHERE record_type = $1 AND published \
               AND {FIELD_FIRST_VALUE} <> '' \
               AND strpos({FIELD_FIRST_VALUE}, $3) = 0 \
             ORDER BY id ASC"
        );
        sqlx::query_scalar::<_, DbId>(&query)
            .bind(record_type)
            .bind(field)
            .bind(marker)
            .fetch_all(pool)
            .await
    }

    /// Overwrite title, status and fields. Returns the number of rows
    /// updated (0 when the record does not exist).
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        title: &str,
        published: bool,
        fields: &BTreeMap<String, FieldValue>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE target_records \
             SET title = $2, published = $3, fields = $4, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(title)
        .bind(published)
        .bind(Json(fields))
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Physically delete a record. Returns whether a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM target_records WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
