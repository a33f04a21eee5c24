//! # Outbox Repository
//!
//! Durable FIFO-by-priority queue of writes the hub owes to the cloud.
//!
//! ## Row Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   enqueue()            claim_batch()           push outcome             │
//! │      │                      │                      │                    │
//! │      ▼                      ▼                      ▼                    │
//! │   PENDING ──────────▶ PROCESSING ──┬──▶ SYNCED            (terminal)   │
//! │      ▲                (attempts+1) ├──▶ DEAD_LETTER       (terminal)   │
//! │      │                             └──▶ PENDING again     (retriable)  │
//! │      └─────────── retry_dead_letters() ── DEAD_LETTER                  │
//! │                    (administrative; attempts reset to 0)               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `enqueue` is always called on the same transaction that writes the
//! business rows. `claim_batch` selects and flips to PROCESSING in one
//! transaction so two concurrent drains can never pick up the same row.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use beacon_core::{priority_for, OutboxItem, OutboxStats, OutboxStatus, DEFAULT_MAX_ATTEMPTS};

use crate::error::DbResult;

const SELECT_COLUMNS: &str = "id, entity_type, entity_id, action, payload, correlation_id, \
     priority, status, attempts, max_attempts, error, created_at, processed_at";

/// A pending outbox row before insertion.
#[derive(Debug, Clone)]
pub struct NewOutboxItem {
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub payload: String,
    pub correlation_id: Option<String>,
    pub priority: i64,
    pub max_attempts: i64,
}

impl NewOutboxItem {
    /// Builds an item with the conventional priority for its entity type
    /// and the entity id as correlation id.
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        action: impl Into<String>,
        payload: &serde_json::Value,
    ) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        NewOutboxItem {
            priority: priority_for(&entity_type),
            correlation_id: Some(entity_id.clone()),
            entity_type,
            entity_id,
            action: action.into(),
            payload: payload.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_attempts(mut self, max: i64) -> Self {
        self.max_attempts = max;
        self
    }
}

/// Repository for the `outbox_queue` table.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Inserts one pending row on the caller's transaction.
    ///
    /// Runs on the same transaction as the business write, always.
    pub async fn enqueue(&self, conn: &mut SqliteConnection, item: NewOutboxItem) -> DbResult<i64> {
        debug!(
            entity_type = %item.entity_type,
            entity_id = %item.entity_id,
            action = %item.action,
            "Enqueuing outbox item"
        );

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO outbox_queue (
                entity_type, entity_id, action, payload, correlation_id,
                priority, status, attempts, max_attempts, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)
            RETURNING id
            "#,
        )
        .bind(&item.entity_type)
        .bind(&item.entity_id)
        .bind(&item.action)
        .bind(&item.payload)
        .bind(&item.correlation_id)
        .bind(item.priority)
        .bind(OutboxStatus::Pending)
        .bind(item.max_attempts)
        .bind(Utc::now())
        .fetch_one(conn)
        .await?;

        Ok(id)
    }

    /// Claims up to `limit` pending rows for a drain pass.
    ///
    /// Selection and the flip to PROCESSING (with the attempt increment)
    /// happen in one transaction; the returned items already carry the
    /// incremented attempt count.
    pub async fn claim_batch(&self, limit: i64) -> DbResult<Vec<OutboxItem>> {
        let mut tx = self.pool.begin().await?;

        let mut items: Vec<OutboxItem> = sqlx::query_as(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM outbox_queue
            WHERE status = ?1 AND attempts < max_attempts
            ORDER BY priority DESC, created_at ASC
            LIMIT ?2
            "#
        ))
        .bind(OutboxStatus::Pending)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        for item in &mut items {
            sqlx::query(
                "UPDATE outbox_queue SET status = ?1, attempts = attempts + 1 WHERE id = ?2",
            )
            .bind(OutboxStatus::Processing)
            .bind(item.id)
            .execute(&mut *tx)
            .await?;
            item.status = OutboxStatus::Processing;
            item.attempts += 1;
        }

        tx.commit().await?;

        if !items.is_empty() {
            debug!(count = items.len(), "Claimed outbox batch");
        }
        Ok(items)
    }

    /// Terminal success. `note` records things like "duplicate" for 409s.
    pub async fn mark_synced(&self, id: i64, note: Option<&str>) -> DbResult<()> {
        sqlx::query(
            "UPDATE outbox_queue SET status = ?1, error = ?2, processed_at = ?3 WHERE id = ?4",
        )
        .bind(OutboxStatus::Synced)
        .bind(note)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Terminal failure; requires administrative retry to revive.
    pub async fn mark_dead_letter(&self, id: i64, error: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE outbox_queue SET status = ?1, error = ?2, processed_at = ?3 WHERE id = ?4",
        )
        .bind(OutboxStatus::DeadLetter)
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Retriable failure: back to PENDING for the next drain pass.
    pub async fn mark_pending_again(&self, id: i64, error: &str) -> DbResult<()> {
        sqlx::query("UPDATE outbox_queue SET status = ?1, error = ?2 WHERE id = ?3")
            .bind(OutboxStatus::Pending)
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Resets matching dead letters to PENDING with zero attempts.
    /// Returns the number of revived rows.
    pub async fn retry_dead_letters(&self, entity_type: Option<&str>) -> DbResult<u64> {
        let result = match entity_type {
            Some(et) => {
                sqlx::query(
                    "UPDATE outbox_queue SET status = ?1, attempts = 0, error = NULL \
                     WHERE status = ?2 AND entity_type = ?3",
                )
                .bind(OutboxStatus::Pending)
                .bind(OutboxStatus::DeadLetter)
                .bind(et)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "UPDATE outbox_queue SET status = ?1, attempts = 0, error = NULL \
                     WHERE status = ?2",
                )
                .bind(OutboxStatus::Pending)
                .bind(OutboxStatus::DeadLetter)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected())
    }

    /// Counts grouped by status.
    pub async fn stats(&self) -> DbResult<OutboxStats> {
        let rows: Vec<(OutboxStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM outbox_queue GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = OutboxStats::default();
        for (status, count) in rows {
            match status {
                OutboxStatus::Pending => stats.pending = count,
                OutboxStatus::Processing => stats.processing = count,
                OutboxStatus::Synced => stats.synced = count,
                OutboxStatus::DeadLetter => stats.dead_letter = count,
            }
        }
        Ok(stats)
    }

    /// Age in seconds of the oldest pending row, if any.
    pub async fn oldest_pending_age_secs(&self) -> DbResult<Option<i64>> {
        let oldest: Option<chrono::DateTime<Utc>> =
            sqlx::query_scalar("SELECT MIN(created_at) FROM outbox_queue WHERE status = ?1")
                .bind(OutboxStatus::Pending)
                .fetch_one(&self.pool)
                .await?;
        Ok(oldest.map(|at| (Utc::now() - at).num_seconds()))
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<OutboxItem>> {
        let item = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM outbox_queue WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    /// All rows for one business entity, oldest first. Test/diagnostic aid.
    pub async fn for_entity(&self, entity_type: &str, entity_id: &str) -> DbResult<Vec<OutboxItem>> {
        let items = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM outbox_queue \
             WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY id ASC"
        ))
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }
}
