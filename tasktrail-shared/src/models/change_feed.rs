/// Change feed outbox
///
/// Row triggers on `users` and `tasks` append one row here for every
/// committed INSERT, UPDATE or DELETE, inside the same transaction as the
/// mutation. The relay claims unpublished rows, publishes them to the broker
/// and stamps `published_at`. A row is therefore published at least once.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE change_feed (
///     id BIGSERIAL PRIMARY KEY,
///     database_name TEXT NOT NULL DEFAULT current_database(),
///     table_name TEXT NOT NULL,
///     operation TEXT NOT NULL,
///     row_key TEXT NOT NULL,
///     row_data JSONB NOT NULL,
///     old_data JSONB,
///     committed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     published_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use tasktrail_shared::models::change_feed::ChangeRow;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let mut tx = pool.begin().await?;
/// let rows = ChangeRow::claim_unpublished(&mut tx, 100).await?;
/// // ... publish ...
/// let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
/// ChangeRow::mark_published(&mut tx, &ids).await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool};

/// One captured row change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChangeRow {
    /// Monotonic commit-order sequence
    pub id: i64,

    /// Database the change happened in
    pub database_name: String,

    /// Table the change happened in
    pub table_name: String,

    /// `INSERT`, `UPDATE` or `DELETE`
    pub operation: String,

    /// Primary key of the changed row, as text
    pub row_key: String,

    /// Row image after the change (before it, for deletes)
    pub row_data: JsonValue,

    /// Row image before an update
    pub old_data: Option<JsonValue>,

    /// Commit time of the mutating transaction
    pub committed_at: DateTime<Utc>,

    /// When the relay published the row
    pub published_at: Option<DateTime<Utc>>,
}

impl ChangeRow {
    /// Locks up to `limit` unpublished rows in sequence order
    ///
    /// Rows stay locked until the surrounding transaction ends; other relays
    /// skip them instead of blocking.
    pub async fn claim_unpublished(
        conn: &mut PgConnection,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT id, database_name, table_name, operation, row_key,
                   row_data, old_data, committed_at, published_at
            FROM change_feed
            WHERE published_at IS NULL
            ORDER BY id ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(conn)
        .await?;

        Ok(rows)
    }

    /// Stamps rows as published
    pub async fn mark_published(conn: &mut PgConnection, ids: &[i64]) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE change_feed SET published_at = NOW() WHERE id = ANY($1)",
        )
        .bind(ids)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Number of rows waiting to be published
    pub async fn pending_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM change_feed WHERE published_at IS NULL")
            .fetch_one(pool)
            .await
    }

    /// Rows captured for one table row, oldest first
    pub async fn list_for_row(
        pool: &PgPool,
        table_name: &str,
        row_key: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT id, database_name, table_name, operation, row_key,
                   row_data, old_data, committed_at, published_at
            FROM change_feed
            WHERE table_name = $1 AND row_key = $2
            ORDER BY id ASC
            "#,
        )
        .bind(table_name)
        .bind(row_key)
        .fetch_all(pool)
        .await
    }
}
