//! Locally registered POS/KDS terminals.

use chrono::Utc;
use sqlx::SqlitePool;

use beacon_core::{Terminal, TerminalRole, TerminalStatus};

use crate::error::DbResult;

const SELECT_COLUMNS: &str = "id, name, role, status, last_seen_at, created_at";

/// Repository for the `terminals` table. The realtime bus resolves a
/// peer's role from here at connect time; clients never supply it.
#[derive(Debug, Clone)]
pub struct TerminalRepository {
    pool: SqlitePool,
}

impl TerminalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TerminalRepository { pool }
    }

    /// Registers or updates a terminal. Name and role overwrite on
    /// re-registration; first-seen time is kept.
    pub async fn register(&self, id: &str, name: &str, role: TerminalRole) -> DbResult<Terminal> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO terminals (id, name, role, status, last_seen_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                role = excluded.role,
                last_seen_at = excluded.last_seen_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(role)
        .bind(TerminalStatus::Offline)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(self
            .get(id)
            .await?
            .expect("terminal row exists after upsert"))
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Terminal>> {
        let terminal = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM terminals WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(terminal)
    }

    pub async fn list(&self) -> DbResult<Vec<Terminal>> {
        let terminals = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM terminals ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(terminals)
    }

    pub async fn set_status(&self, id: &str, status: TerminalStatus) -> DbResult<()> {
        sqlx::query("UPDATE terminals SET status = ?1, last_seen_at = ?2 WHERE id = ?3")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM terminals")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_register_is_upsert() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let terminals = db.terminals();

        let t = terminals
            .register("t1", "Front Counter", TerminalRole::Pos)
            .await
            .unwrap();
        assert_eq!(t.status, TerminalStatus::Offline);

        // Re-register with a new role: the row updates in place.
        let t = terminals
            .register("t1", "Kitchen Display", TerminalRole::Kds)
            .await
            .unwrap();
        assert_eq!(t.role, TerminalRole::Kds);
        assert_eq!(terminals.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let terminals = db.terminals();

        terminals
            .register("t1", "Front", TerminalRole::Pos)
            .await
            .unwrap();
        terminals
            .set_status("t1", TerminalStatus::Online)
            .await
            .unwrap();

        let t = terminals.get("t1").await.unwrap().unwrap();
        assert_eq!(t.status, TerminalStatus::Online);
        assert!(t.last_seen_at.is_some());
    }
}
