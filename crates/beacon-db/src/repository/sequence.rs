//! Per-day receipt number sequences.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use beacon_core::{date_key, format_receipt_number};

use crate::error::DbResult;

/// Repository for the `order_sequences` table.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    /// Mints the next receipt number for today, formatted `YYYYMMDD-NNNN`.
    ///
    /// The upsert-increment-returning runs as one statement, so concurrent
    /// callers always observe distinct, contiguous values. Runs on the
    /// caller's transaction: a rolled-back sale does not consume a number
    /// that already reached the receipt printer.
    pub async fn next_receipt_number(&self, conn: &mut SqliteConnection) -> DbResult<String> {
        let key = date_key(Utc::now());
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO order_sequences (date_key, current_value)
            VALUES (?1, 1)
            ON CONFLICT (date_key) DO UPDATE SET current_value = current_value + 1
            RETURNING current_value
            "#,
        )
        .bind(&key)
        .fetch_one(conn)
        .await?;

        Ok(format_receipt_number(&key, value))
    }

    /// Current counter for a date key, for diagnostics. Zero when unused.
    pub async fn current_value(&self, key: &str) -> DbResult<i64> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT current_value FROM order_sequences WHERE date_key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_sequence_starts_at_one_and_increments() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let seq = db.sequences();

        let mut conn = db.pool().acquire().await.unwrap();
        let first = seq.next_receipt_number(&mut conn).await.unwrap();
        let second = seq.next_receipt_number(&mut conn).await.unwrap();

        assert!(first.ends_with("-0001"));
        assert!(second.ends_with("-0002"));
    }

    #[tokio::test]
    async fn test_sequence_contiguous_under_concurrency() {
        // File-backed DB so multiple pooled connections contend for real.
        let path = std::env::temp_dir().join(format!("beacon-seq-{}.db", beacon_core::new_id()));
        let db = Database::new(DbConfig::new(&path).max_connections(5))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let mut numbers = Vec::new();
                for _ in 0..50 {
                    let mut conn = db.pool().acquire().await.unwrap();
                    numbers.push(db.sequences().next_receipt_number(&mut conn).await.unwrap());
                }
                numbers
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }

        // 1000 distinct values forming a contiguous range from 1.
        assert_eq!(all.len(), 1000);
        let values: HashSet<i64> = all
            .iter()
            .map(|n| n.rsplit('-').next().unwrap().parse::<i64>().unwrap())
            .collect();
        assert_eq!(values.len(), 1000);
        assert_eq!(*values.iter().min().unwrap(), 1);
        assert_eq!(*values.iter().max().unwrap(), 1000);

        db.close_with_checkpoint().await;
        std::fs::remove_file(&path).ok();
    }
}
