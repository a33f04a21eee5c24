//! Shift logs and breaks.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use beacon_core::{new_id, ShiftBreak, ShiftLog, ShiftStatus, SyncFlag};

use crate::error::{DbError, DbResult};

const SHIFT_COLUMNS: &str = "id, user_id, terminal_id, status, sync_status, started_at, ended_at";

#[derive(Debug, Clone)]
pub struct ShiftRepository {
    pool: SqlitePool,
}

impl ShiftRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ShiftRepository { pool }
    }

    pub async fn start(
        &self,
        conn: &mut SqliteConnection,
        user_id: &str,
        terminal_id: Option<&str>,
    ) -> DbResult<ShiftLog> {
        let shift = ShiftLog {
            id: new_id(),
            user_id: user_id.to_string(),
            terminal_id: terminal_id.map(str::to_string),
            status: ShiftStatus::Active,
            sync_status: SyncFlag::Pending,
            started_at: Utc::now(),
            ended_at: None,
        };

        sqlx::query(
            "INSERT INTO shift_logs (id, user_id, terminal_id, status, sync_status, started_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&shift.id)
        .bind(&shift.user_id)
        .bind(&shift.terminal_id)
        .bind(shift.status)
        .bind(shift.sync_status)
        .bind(shift.started_at)
        .execute(conn)
        .await?;

        Ok(shift)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<ShiftLog>> {
        let shift = sqlx::query_as(&format!(
            "SELECT {SHIFT_COLUMNS} FROM shift_logs WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(shift)
    }

    /// Ends an active shift; conflict when it is not active.
    pub async fn end(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE shift_logs SET status = ?1, ended_at = ?2, sync_status = ?3 \
             WHERE id = ?4 AND status = ?5",
        )
        .bind(ShiftStatus::Ended)
        .bind(Utc::now())
        .bind(SyncFlag::Pending)
        .bind(id)
        .bind(ShiftStatus::Active)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Shift (active)", id));
        }
        Ok(())
    }

    pub async fn start_break(
        &self,
        conn: &mut SqliteConnection,
        shift_id: &str,
    ) -> DbResult<ShiftBreak> {
        let brk = ShiftBreak {
            id: new_id(),
            shift_id: shift_id.to_string(),
            started_at: Utc::now(),
            ended_at: None,
        };

        sqlx::query("INSERT INTO shift_breaks (id, shift_id, started_at) VALUES (?1, ?2, ?3)")
            .bind(&brk.id)
            .bind(&brk.shift_id)
            .bind(brk.started_at)
            .execute(conn)
            .await?;

        Ok(brk)
    }

    pub async fn end_break(&self, conn: &mut SqliteConnection, break_id: &str) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE shift_breaks SET ended_at = ?1 WHERE id = ?2 AND ended_at IS NULL")
                .bind(Utc::now())
                .bind(break_id)
                .execute(conn)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Shift break (open)", break_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_shift_with_break() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let shifts = db.shifts();

        let mut tx = db.pool().begin().await.unwrap();
        let shift = shifts.start(&mut tx, "u1", Some("t1")).await.unwrap();
        let brk = shifts.start_break(&mut tx, &shift.id).await.unwrap();
        shifts.end_break(&mut tx, &brk.id).await.unwrap();
        shifts.end(&mut tx, &shift.id).await.unwrap();
        tx.commit().await.unwrap();

        let loaded = shifts.get(&shift.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ShiftStatus::Ended);
        assert!(loaded.ended_at.is_some());

        // Ending twice is a conflict.
        let mut tx = db.pool().begin().await.unwrap();
        assert!(shifts.end(&mut tx, &shift.id).await.is_err());
    }
}
