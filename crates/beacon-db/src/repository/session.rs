//! Terminal login sessions.

use chrono::Utc;
use sqlx::SqlitePool;

use beacon_core::{new_id, Session};

use crate::error::DbResult;

const SELECT_COLUMNS: &str = "id, terminal_id, user_id, is_active, started_at, ended_at";

/// Repository for the `sessions` table. Sessions have no timeout; they end
/// on explicit logout or administrative action.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    /// Mints a session bound to `(terminal, user)` after a PIN match.
    pub async fn create(&self, terminal_id: Option<&str>, user_id: &str) -> DbResult<Session> {
        let session = Session {
            id: new_id(),
            terminal_id: terminal_id.map(str::to_string),
            user_id: user_id.to_string(),
            is_active: true,
            started_at: Utc::now(),
            ended_at: None,
        };

        sqlx::query(
            "INSERT INTO sessions (id, terminal_id, user_id, is_active, started_at) \
             VALUES (?1, ?2, ?3, 1, ?4)",
        )
        .bind(&session.id)
        .bind(&session.terminal_id)
        .bind(&session.user_id)
        .bind(session.started_at)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    /// Looks up an active session by id. Inactive sessions are invisible.
    pub async fn get_active(&self, id: &str) -> DbResult<Option<Session>> {
        let session = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM sessions WHERE id = ?1 AND is_active = 1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// Ends a session. Idempotent.
    pub async fn end(&self, id: &str) -> DbResult<bool> {
        let result =
            sqlx::query("UPDATE sessions SET is_active = 0, ended_at = ?1 WHERE id = ?2 AND is_active = 1")
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Administrative: ends every active session for a user (e.g. after a
    /// PIN change).
    pub async fn end_for_user(&self, user_id: &str) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET is_active = 0, ended_at = ?1 WHERE user_id = ?2 AND is_active = 1",
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_session_lifecycle() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sessions = db.sessions();

        let session = sessions.create(Some("term-1"), "user-1").await.unwrap();
        assert!(sessions.get_active(&session.id).await.unwrap().is_some());

        assert!(sessions.end(&session.id).await.unwrap());
        assert!(sessions.get_active(&session.id).await.unwrap().is_none());

        // Second logout is a no-op.
        assert!(!sessions.end(&session.id).await.unwrap());
    }
}
