//! Cash drawers and paid-in/paid-out movements.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use beacon_core::{new_id, CashDrawer, DrawerStatus, DrawerTransaction, SyncFlag};

use crate::error::{DbError, DbResult};

const DRAWER_COLUMNS: &str = "id, terminal_id, user_id, status, opening_amount, closing_amount, \
     expected_amount, notes, sync_status, opened_at, closed_at";

#[derive(Debug, Clone)]
pub struct DrawerRepository {
    pool: SqlitePool,
}

impl DrawerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DrawerRepository { pool }
    }

    /// The open drawer for a terminal, if one exists. At most one per
    /// terminal; the open route enforces this as a conflict.
    pub async fn open_for_terminal(&self, terminal_id: &str) -> DbResult<Option<CashDrawer>> {
        let drawer = sqlx::query_as(&format!(
            "SELECT {DRAWER_COLUMNS} FROM cash_drawers \
             WHERE terminal_id = ?1 AND status = ?2"
        ))
        .bind(terminal_id)
        .bind(DrawerStatus::Open)
        .fetch_optional(&self.pool)
        .await?;
        Ok(drawer)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<CashDrawer>> {
        let drawer = sqlx::query_as(&format!(
            "SELECT {DRAWER_COLUMNS} FROM cash_drawers WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(drawer)
    }

    pub async fn open(
        &self,
        conn: &mut SqliteConnection,
        terminal_id: Option<&str>,
        user_id: Option<&str>,
        opening_amount: f64,
        notes: Option<&str>,
    ) -> DbResult<CashDrawer> {
        let drawer = CashDrawer {
            id: new_id(),
            terminal_id: terminal_id.map(str::to_string),
            user_id: user_id.map(str::to_string),
            status: DrawerStatus::Open,
            opening_amount,
            closing_amount: None,
            expected_amount: None,
            notes: notes.map(str::to_string),
            sync_status: SyncFlag::Pending,
            opened_at: Utc::now(),
            closed_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO cash_drawers (id, terminal_id, user_id, status, opening_amount,
                                      notes, sync_status, opened_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&drawer.id)
        .bind(&drawer.terminal_id)
        .bind(&drawer.user_id)
        .bind(drawer.status)
        .bind(drawer.opening_amount)
        .bind(&drawer.notes)
        .bind(drawer.sync_status)
        .bind(drawer.opened_at)
        .execute(conn)
        .await?;

        Ok(drawer)
    }

    /// Closes an open drawer. Fails when the drawer is not open, which the
    /// route reports as a conflict.
    pub async fn close(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        closing_amount: f64,
        expected_amount: Option<f64>,
        notes: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE cash_drawers SET status = ?1, closing_amount = ?2, expected_amount = ?3, \
             notes = COALESCE(?4, notes), closed_at = ?5, sync_status = ?6 \
             WHERE id = ?7 AND status = ?8",
        )
        .bind(DrawerStatus::Closed)
        .bind(closing_amount)
        .bind(expected_amount)
        .bind(notes)
        .bind(Utc::now())
        .bind(SyncFlag::Pending)
        .bind(id)
        .bind(DrawerStatus::Open)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Cash drawer (open)", id));
        }
        Ok(())
    }

    pub async fn add_transaction(
        &self,
        conn: &mut SqliteConnection,
        drawer_id: &str,
        kind: &str,
        amount: f64,
        reason: Option<&str>,
        user_id: Option<&str>,
    ) -> DbResult<DrawerTransaction> {
        let txn = DrawerTransaction {
            id: new_id(),
            drawer_id: drawer_id.to_string(),
            kind: kind.to_string(),
            amount,
            reason: reason.map(str::to_string),
            user_id: user_id.map(str::to_string),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO cash_drawer_transactions (id, drawer_id, kind, amount, reason,
                                                  user_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&txn.id)
        .bind(&txn.drawer_id)
        .bind(&txn.kind)
        .bind(txn.amount)
        .bind(&txn.reason)
        .bind(&txn.user_id)
        .bind(txn.created_at)
        .execute(conn)
        .await?;

        Ok(txn)
    }

    pub async fn transactions(&self, drawer_id: &str) -> DbResult<Vec<DrawerTransaction>> {
        let txns = sqlx::query_as(
            "SELECT id, drawer_id, kind, amount, reason, user_id, created_at \
             FROM cash_drawer_transactions WHERE drawer_id = ?1 ORDER BY created_at",
        )
        .bind(drawer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(txns)
    }
}
