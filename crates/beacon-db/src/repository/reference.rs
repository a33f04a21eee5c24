//! # Reference Mirror Writes
//!
//! Batch upsert / full-replace primitives for the cloud-owned reference
//! tables. The pull engine hands this repository already-transformed rows
//! (store column name → JSON value); table and column names come from the
//! static pull plan, never from the wire.
//!
//! ## Write Modes
//! ```text
//! upsert_rows:   INSERT .. ON CONFLICT(id) DO UPDATE SET col = excluded.col
//!                (every column except the primary key is overwritten)
//!
//! replace_rows:  DELETE FROM table; INSERT ...
//!                (for tables whose cloud ids are recycled across syncs)
//! ```
//!
//! Per-row failures are logged and skipped; a bad row never aborts the
//! batch. SQLite statements are atomic individually, so the enclosing
//! transaction stays usable after a rejected row.

use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{query::Query, SqliteConnection, SqlitePool};
use tracing::warn;

use crate::error::DbResult;

/// Result of one batch write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Rows applied.
    pub applied: usize,
    /// Rows rejected (missing id, constraint failure) and skipped.
    pub skipped: usize,
}

/// Binds a JSON value to the next placeholder, coercing to SQLite's
/// vocabulary: booleans become 0/1, arrays and objects are stringified
/// for TEXT columns.
fn bind_json<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Option<&Value>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        None | Some(Value::Null) => query.bind(None::<String>),
        Some(Value::Bool(b)) => query.bind(if *b { 1i64 } else { 0i64 }),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Some(Value::String(s)) => query.bind(s.clone()),
        Some(other) => query.bind(other.to_string()),
    }
}

fn upsert_sql(table: &str, columns: &[&str]) -> String {
    let col_list = columns.join(", ");
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = columns
        .iter()
        .skip(1)
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    format!(
        "INSERT INTO {table} ({col_list}) VALUES ({}) ON CONFLICT (id) DO UPDATE SET {}",
        placeholders.join(", "),
        updates.join(", ")
    )
}

fn insert_sql(table: &str, columns: &[&str]) -> String {
    let col_list = columns.join(", ");
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {table} ({col_list}) VALUES ({})",
        placeholders.join(", ")
    )
}

/// Executes one prepared row write, reporting failures to the caller as a
/// skip decision.
async fn apply_row(
    conn: &mut SqliteConnection,
    sql: &str,
    columns: &[&str],
    row: &serde_json::Map<String, Value>,
    table: &str,
) -> bool {
    match row.get("id") {
        Some(Value::String(_)) | Some(Value::Number(_)) => {}
        _ => {
            warn!(table, "Skipping row without usable id");
            return false;
        }
    }

    let mut query = sqlx::query(sql);
    for column in columns {
        query = bind_json(query, row.get(*column));
    }

    match query.execute(conn).await {
        Ok(_) => true,
        Err(e) => {
            let id = row.get("id").map(|v| v.to_string()).unwrap_or_default();
            warn!(table, id = %id, error = %e, "Skipping rejected reference row");
            false
        }
    }
}

/// Repository for pull-engine writes to reference tables.
#[derive(Debug, Clone)]
pub struct ReferenceRepository {
    pool: SqlitePool,
}

impl ReferenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReferenceRepository { pool }
    }

    /// Upserts a batch on the caller's transaction.
    pub async fn upsert_rows(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
        columns: &[&str],
        rows: &[serde_json::Map<String, Value>],
    ) -> DbResult<UpsertOutcome> {
        let sql = upsert_sql(table, columns);
        let mut outcome = UpsertOutcome::default();
        for row in rows {
            if apply_row(conn, &sql, columns, row, table).await {
                outcome.applied += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        Ok(outcome)
    }

    /// Upserts a batch in its own transaction.
    pub async fn upsert_batch(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[serde_json::Map<String, Value>],
    ) -> DbResult<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = self.upsert_rows(&mut tx, table, columns, rows).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Full replace: deletes every row, then inserts the new set, all in
    /// one transaction. Used where the cloud recycles ids across syncs.
    pub async fn replace_rows(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
        columns: &[&str],
        rows: &[serde_json::Map<String, Value>],
    ) -> DbResult<UpsertOutcome> {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *conn)
            .await?;

        let sql = insert_sql(table, columns);
        let mut outcome = UpsertOutcome::default();
        for row in rows {
            if apply_row(conn, &sql, columns, row, table).await {
                outcome.applied += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        Ok(outcome)
    }

    /// Deletes rows by id on the caller's transaction (the `deletedIds`
    /// list of a pull response). Declared `ON DELETE CASCADE` children go
    /// with their parents. Returns the number of deleted parent rows.
    pub async fn delete_ids(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
        ids: &[String],
    ) -> DbResult<u64> {
        let mut deleted = 0;
        for id in ids {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = ?1"))
                .bind(id)
                .execute(&mut *conn)
                .await?;
            deleted += result.rows_affected();
        }
        Ok(deleted)
    }

    /// Row count of any table. Diagnostics and tests.
    pub async fn count(&self, table: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Fetches one column of one row, as JSON-ish text. Test aid.
    pub async fn get_text(
        &self,
        table: &str,
        id: &str,
        column: &str,
    ) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar(&format!("SELECT CAST({column} AS TEXT) FROM {table} WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .flatten();
        Ok(value)
    }
}
