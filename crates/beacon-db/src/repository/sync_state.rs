//! Per-entity pull bookkeeping.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use beacon_core::{SyncRunStatus, SyncState};

use crate::error::DbResult;

const SELECT_COLUMNS: &str =
    "entity_type, last_synced_at, cursor, record_count, status, updated_at";

/// Repository for the `sync_state` table. Rows are created lazily on first
/// pull and mutated only by the pull engine (plus the administrative
/// reset).
#[derive(Debug, Clone)]
pub struct SyncStateRepository {
    pool: SqlitePool,
}

impl SyncStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncStateRepository { pool }
    }

    pub async fn get(&self, entity_type: &str) -> DbResult<Option<SyncState>> {
        let state = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM sync_state WHERE entity_type = ?1"
        ))
        .bind(entity_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(state)
    }

    pub async fn list(&self) -> DbResult<Vec<SyncState>> {
        let states = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM sync_state ORDER BY entity_type"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(states)
    }

    /// Marks an entity as currently syncing (creating the row on first pull).
    pub async fn mark_syncing(&self, entity_type: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (entity_type, record_count, status, updated_at)
            VALUES (?1, 0, ?2, ?3)
            ON CONFLICT (entity_type) DO UPDATE SET status = excluded.status,
                                                    updated_at = excluded.updated_at
            "#,
        )
        .bind(entity_type)
        .bind(SyncRunStatus::Syncing)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records a successful pull: advances the cursor timestamp and count.
    pub async fn mark_success(
        &self,
        entity_type: &str,
        record_count: i64,
        synced_at: DateTime<Utc>,
        cursor: Option<&str>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (entity_type, last_synced_at, cursor, record_count, status, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (entity_type) DO UPDATE SET
                last_synced_at = excluded.last_synced_at,
                cursor = excluded.cursor,
                record_count = excluded.record_count,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(entity_type)
        .bind(synced_at)
        .bind(cursor)
        .bind(record_count)
        .bind(SyncRunStatus::Success)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records a skipped pull (404: endpoint not deployed yet). The cursor
    /// is left untouched so the first real pull still fetches everything.
    pub async fn mark_skipped(&self, entity_type: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (entity_type, record_count, status, updated_at)
            VALUES (?1, 0, ?2, ?3)
            ON CONFLICT (entity_type) DO UPDATE SET status = excluded.status,
                                                    updated_at = excluded.updated_at
            "#,
        )
        .bind(entity_type)
        .bind(SyncRunStatus::Success)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records a failed pull for this entity. The cycle continues.
    pub async fn mark_error(&self, entity_type: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (entity_type, record_count, status, updated_at)
            VALUES (?1, 0, ?2, ?3)
            ON CONFLICT (entity_type) DO UPDATE SET status = excluded.status,
                                                    updated_at = excluded.updated_at
            "#,
        )
        .bind(entity_type)
        .bind(SyncRunStatus::Error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Administrative reset: drops cursors so the next cycle full-fetches.
    /// With an entity type, resets only that row.
    pub async fn reset(&self, entity_type: Option<&str>) -> DbResult<u64> {
        let result = match entity_type {
            Some(et) => sqlx::query("DELETE FROM sync_state WHERE entity_type = ?1")
                .bind(et)
                .execute(&self.pool)
                .await?,
            None => sqlx::query("DELETE FROM sync_state").execute(&self.pool).await?,
        };
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_lazy_create_and_success() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sync_state();

        assert!(repo.get("products").await.unwrap().is_none());

        repo.mark_syncing("products").await.unwrap();
        let state = repo.get("products").await.unwrap().unwrap();
        assert_eq!(state.status, SyncRunStatus::Syncing);
        assert!(state.last_synced_at.is_none());

        let now = Utc::now();
        repo.mark_success("products", 42, now, None).await.unwrap();
        let state = repo.get("products").await.unwrap().unwrap();
        assert_eq!(state.status, SyncRunStatus::Success);
        assert_eq!(state.record_count, 42);
        assert!(state.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_skipped_keeps_cursor() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sync_state();

        let now = Utc::now();
        repo.mark_success("products", 5, now, None).await.unwrap();
        repo.mark_skipped("products").await.unwrap();

        let state = repo.get("products").await.unwrap().unwrap();
        assert_eq!(state.status, SyncRunStatus::Success);
        assert!(state.last_synced_at.is_some());
        // The cursor survives a 404 skip.
        assert_eq!(state.record_count, 5);
    }

    #[tokio::test]
    async fn test_reset_by_entity() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sync_state();

        repo.mark_success("products", 1, Utc::now(), None).await.unwrap();
        repo.mark_success("categories", 2, Utc::now(), None).await.unwrap();

        assert_eq!(repo.reset(Some("products")).await.unwrap(), 1);
        assert!(repo.get("products").await.unwrap().is_none());
        assert!(repo.get("categories").await.unwrap().is_some());
    }
}
