//! Refunds, guest checks, store-credit ledger entries and table sessions,
//! plus the sync-flag mirror the push engine writes back onto
//! transactional rows.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use beacon_core::{new_id, GuestCheck, Refund, StoreCreditEntry, SyncFlag, TableSession};

use crate::error::{DbError, DbResult};

/// Transactional tables carrying a `sync_status` mirror column, keyed by
/// outbox entity type. The push engine consults this after a terminal
/// outcome; unknown entity types simply have no mirror.
pub(crate) fn mirror_table(entity_type: &str) -> Option<&'static str> {
    match entity_type {
        "sale" => Some("sales"),
        "kitchen_order" => Some("kitchen_orders"),
        "cash_drawer" => Some("cash_drawers"),
        "shift" => Some("shift_logs"),
        "refund" => Some("refunds"),
        "guest_check" => Some("guest_checks"),
        "store_credit" => Some("store_credit_entries"),
        "table_session" => Some("table_sessions"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct MiscRepository {
    pool: SqlitePool,
}

impl MiscRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MiscRepository { pool }
    }

    /// Mirrors an outbox terminal state onto the business row, when the
    /// entity type has a mirror table. Best-effort observability only.
    pub async fn set_sync_flag(
        &self,
        entity_type: &str,
        entity_id: &str,
        flag: SyncFlag,
    ) -> DbResult<()> {
        let Some(table) = mirror_table(entity_type) else {
            return Ok(());
        };
        sqlx::query(&format!("UPDATE {table} SET sync_status = ?1 WHERE id = ?2"))
            .bind(flag)
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    pub async fn create_refund(
        &self,
        conn: &mut SqliteConnection,
        sale_id: &str,
        amount: f64,
        reason: Option<&str>,
        user_id: Option<&str>,
    ) -> DbResult<Refund> {
        let refund = Refund {
            id: new_id(),
            sale_id: sale_id.to_string(),
            amount,
            reason: reason.map(str::to_string),
            user_id: user_id.map(str::to_string),
            sync_status: SyncFlag::Pending,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO refunds (id, sale_id, amount, reason, user_id, sync_status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&refund.id)
        .bind(&refund.sale_id)
        .bind(refund.amount)
        .bind(&refund.reason)
        .bind(&refund.user_id)
        .bind(refund.sync_status)
        .bind(refund.created_at)
        .execute(conn)
        .await?;

        Ok(refund)
    }

    // =========================================================================
    // Guest checks
    // =========================================================================

    pub async fn create_guest_check(
        &self,
        conn: &mut SqliteConnection,
        table_id: Option<&str>,
        customer_id: Option<&str>,
        name: Option<&str>,
    ) -> DbResult<GuestCheck> {
        let check = GuestCheck {
            id: new_id(),
            table_id: table_id.map(str::to_string),
            customer_id: customer_id.map(str::to_string),
            name: name.map(str::to_string),
            status: "OPEN".to_string(),
            sync_status: SyncFlag::Pending,
            created_at: Utc::now(),
            closed_at: None,
        };

        sqlx::query(
            "INSERT INTO guest_checks (id, table_id, customer_id, name, status, sync_status, \
             created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&check.id)
        .bind(&check.table_id)
        .bind(&check.customer_id)
        .bind(&check.name)
        .bind(&check.status)
        .bind(check.sync_status)
        .bind(check.created_at)
        .execute(conn)
        .await?;

        Ok(check)
    }

    pub async fn close_guest_check(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE guest_checks SET status = 'CLOSED', closed_at = ?1, sync_status = ?2 \
             WHERE id = ?3 AND status = 'OPEN'",
        )
        .bind(Utc::now())
        .bind(SyncFlag::Pending)
        .bind(id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Guest check (open)", id));
        }
        Ok(())
    }

    // =========================================================================
    // Store credit
    // =========================================================================

    pub async fn create_store_credit(
        &self,
        conn: &mut SqliteConnection,
        customer_id: &str,
        delta: f64,
        reason: Option<&str>,
        sale_id: Option<&str>,
        user_id: Option<&str>,
    ) -> DbResult<StoreCreditEntry> {
        let entry = StoreCreditEntry {
            id: new_id(),
            customer_id: customer_id.to_string(),
            delta,
            reason: reason.map(str::to_string),
            sale_id: sale_id.map(str::to_string),
            user_id: user_id.map(str::to_string),
            sync_status: SyncFlag::Pending,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO store_credit_entries (id, customer_id, delta, reason, sale_id, \
             user_id, sync_status, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&entry.id)
        .bind(&entry.customer_id)
        .bind(entry.delta)
        .bind(&entry.reason)
        .bind(&entry.sale_id)
        .bind(&entry.user_id)
        .bind(entry.sync_status)
        .bind(entry.created_at)
        .execute(conn)
        .await?;

        Ok(entry)
    }

    /// Current balance: sum of signed deltas.
    pub async fn store_credit_balance(&self, customer_id: &str) -> DbResult<f64> {
        let balance: Option<f64> = sqlx::query_scalar(
            "SELECT SUM(delta) FROM store_credit_entries WHERE customer_id = ?1",
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(balance.unwrap_or(0.0))
    }

    // =========================================================================
    // Table sessions
    // =========================================================================

    pub async fn open_table_session(
        &self,
        conn: &mut SqliteConnection,
        table_id: &str,
        guest_count: Option<i64>,
    ) -> DbResult<TableSession> {
        let session = TableSession {
            id: new_id(),
            table_id: table_id.to_string(),
            guest_count,
            status: "OPEN".to_string(),
            sync_status: SyncFlag::Pending,
            opened_at: Utc::now(),
            closed_at: None,
        };

        sqlx::query(
            "INSERT INTO table_sessions (id, table_id, guest_count, status, sync_status, \
             opened_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&session.id)
        .bind(&session.table_id)
        .bind(session.guest_count)
        .bind(&session.status)
        .bind(session.sync_status)
        .bind(session.opened_at)
        .execute(conn)
        .await?;

        Ok(session)
    }

    pub async fn close_table_session(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<String>> {
        let table_id: Option<String> = sqlx::query_scalar(
            "UPDATE table_sessions SET status = 'CLOSED', closed_at = ?1, sync_status = ?2 \
             WHERE id = ?3 AND status = 'OPEN' RETURNING table_id",
        )
        .bind(Utc::now())
        .bind(SyncFlag::Pending)
        .bind(id)
        .fetch_optional(conn)
        .await?;
        Ok(table_id)
    }
}
