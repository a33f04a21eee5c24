//! # Domain Types
//!
//! Core domain types shared by the store, the sync engines and the HTTP
//! surface.
//!
//! ## Two Families of Data
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  REFERENCE entities (cloud-owned)      TRANSACTIONAL entities (hub)    │
//! │  ────────────────────────────────      ─────────────────────────────   │
//! │  products, categories, taxes,          sales, kitchen orders, cash     │
//! │  customers, deals, pizza config, …     drawers, shifts, refunds, …     │
//! │                                                                         │
//! │  Mirrored by the PULL engine.          Reach the cloud ONLY through    │
//! │  The hub never edits them.             the outbox + PUSH engine.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Monetary amounts are `f64` throughout: the hub mirrors the decimal JSON
//! the cloud emits and forwards terminal payloads verbatim, so it never
//! re-interprets amounts into a different unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Outbox
// =============================================================================

/// Lifecycle of an outbox row.
///
/// Transitions are monotonic except `Processing → Pending` on a retriable
/// failure. `Synced` and `DeadLetter` are terminal (barring administrative
/// retry of dead letters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Synced,
    DeadLetter,
}

/// Default number of delivery attempts before dead-lettering.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 5;

/// A durable record of one write the hub owes to the cloud.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxItem {
    /// Monotonic id assigned at insert.
    pub id: i64,
    /// Kind of business entity, e.g. `sale`, `kitchen_order`.
    pub entity_type: String,
    /// Id of the business row this item describes.
    pub entity_id: String,
    /// Action the cloud should apply: `create`, `update`, `void`, …
    pub action: String,
    /// Opaque JSON blob the cloud consumes.
    pub payload: String,
    /// Optional correlation id (by convention, the entity id).
    pub correlation_id: Option<String>,
    /// Higher drains first.
    pub priority: i64,
    pub status: OutboxStatus,
    pub attempts: i64,
    pub max_attempts: i64,
    /// Last failure message, if any.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Outbox counts grouped by status, for observability.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxStats {
    pub pending: i64,
    pub processing: i64,
    pub synced: i64,
    pub dead_letter: i64,
}

/// Push priority convention: sale and refund beat everything else so money
/// movements reach the cloud first.
pub fn priority_for(entity_type: &str) -> i64 {
    match entity_type {
        "sale" | "refund" => 10,
        "shift" | "shift_break" | "cash_drawer" | "cash_drawer_transaction" => 5,
        _ => 0,
    }
}

// =============================================================================
// Sync state
// =============================================================================

/// Pull status of one replicated entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncRunStatus {
    Idle,
    Syncing,
    Success,
    Error,
}

/// Per-entity pull bookkeeping. One row per replicated entity type,
/// created lazily on first pull and mutated only by the pull engine.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncState {
    pub entity_type: String,
    /// Wall time of the last successful pull; doubles as the
    /// `sinceVersion` cursor for delta requests.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Opaque cursor the cloud returned, when it uses one.
    pub cursor: Option<String>,
    pub record_count: i64,
    pub status: SyncRunStatus,
    pub updated_at: DateTime<Utc>,
}

/// Mirror of the outbox terminal state on transactional rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncFlag {
    Pending,
    Synced,
    DeadLetter,
}

// =============================================================================
// Sessions & terminals
// =============================================================================

/// A terminal login session minted by PIN authentication.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub terminal_id: Option<String>,
    pub user_id: String,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Terminal classification, resolved server-side from the terminal row.
/// Used to filter realtime broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TerminalRole {
    Pos,
    Kds,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    Online,
    Offline,
}

/// A POS/KDS terminal registered with this hub.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Terminal {
    pub id: String,
    pub name: String,
    pub role: TerminalRole,
    pub status: TerminalStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A staff member mirrored from the cloud. The hub only reads these;
/// `pin_hash` is an argon2 PHC string.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub tenant_id: Option<String>,
    pub name: String,
    pub role: Option<String>,
    pub pin_hash: Option<String>,
    /// JSON array of permission strings, stored as TEXT.
    pub permissions: Option<String>,
    pub max_discount: Option<f64>,
    pub is_active: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Sales
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Completed,
    Voided,
}

/// A completed sale originated at this hub.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sale {
    pub id: String,
    pub receipt_number: String,
    pub status: SaleStatus,
    pub subtotal: f64,
    pub tax_total: f64,
    pub discount_total: f64,
    pub total: f64,
    pub order_type: Option<String>,
    pub customer_id: Option<String>,
    pub table_id: Option<String>,
    pub user_id: Option<String>,
    pub terminal_id: Option<String>,
    pub notes: Option<String>,
    pub sync_status: SyncFlag,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: Option<String>,
    pub name: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    pub line_total: f64,
    /// JSON array of applied modifiers, stored as TEXT.
    pub modifiers: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: String,
    pub sale_id: String,
    pub method: String,
    pub amount: f64,
    pub tendered: Option<f64>,
    pub change_due: Option<f64>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Kitchen orders
// =============================================================================

/// Kitchen order lifecycle. The bump chain advances
/// `Pending → Preparing → Ready → Completed` and stops there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KitchenOrderStatus {
    Pending,
    Preparing,
    Ready,
    Completed,
    Cancelled,
}

impl KitchenOrderStatus {
    /// Next status on a bump, or `None` when the chain is exhausted.
    pub fn bumped(self) -> Option<KitchenOrderStatus> {
        match self {
            KitchenOrderStatus::Pending => Some(KitchenOrderStatus::Preparing),
            KitchenOrderStatus::Preparing => Some(KitchenOrderStatus::Ready),
            KitchenOrderStatus::Ready => Some(KitchenOrderStatus::Completed),
            KitchenOrderStatus::Completed | KitchenOrderStatus::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KitchenOrder {
    pub id: String,
    pub sale_id: Option<String>,
    pub table_id: Option<String>,
    pub order_type: Option<String>,
    pub status: KitchenOrderStatus,
    pub notes: Option<String>,
    pub sync_status: SyncFlag,
    pub created_at: DateTime<Utc>,
    /// Set when the order first moves to PREPARING.
    pub fired_at: Option<DateTime<Utc>>,
    /// Set when the order reaches COMPLETED.
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KitchenOrderItem {
    pub id: String,
    pub kitchen_order_id: String,
    pub product_id: Option<String>,
    pub name: Option<String>,
    pub quantity: f64,
    pub station: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Cash drawers & shifts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrawerStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CashDrawer {
    pub id: String,
    pub terminal_id: Option<String>,
    pub user_id: Option<String>,
    pub status: DrawerStatus,
    pub opening_amount: f64,
    pub closing_amount: Option<f64>,
    pub expected_amount: Option<f64>,
    pub notes: Option<String>,
    pub sync_status: SyncFlag,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DrawerTransaction {
    pub id: String,
    pub drawer_id: String,
    /// `PAID_IN` or `PAID_OUT`.
    pub kind: String,
    pub amount: f64,
    pub reason: Option<String>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShiftStatus {
    Active,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShiftLog {
    pub id: String,
    pub user_id: String,
    pub terminal_id: Option<String>,
    pub status: ShiftStatus,
    pub sync_status: SyncFlag,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShiftBreak {
    pub id: String,
    pub shift_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Refunds, guest checks, store credit, table sessions
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Refund {
    pub id: String,
    pub sale_id: String,
    pub amount: f64,
    pub reason: Option<String>,
    pub user_id: Option<String>,
    pub sync_status: SyncFlag,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GuestCheck {
    pub id: String,
    pub table_id: Option<String>,
    pub customer_id: Option<String>,
    pub name: Option<String>,
    /// `OPEN` or `CLOSED`.
    pub status: String,
    pub sync_status: SyncFlag,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// One signed entry in a customer's store-credit ledger.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoreCreditEntry {
    pub id: String,
    pub customer_id: String,
    pub delta: f64,
    pub reason: Option<String>,
    pub sale_id: Option<String>,
    pub user_id: Option<String>,
    pub sync_status: SyncFlag,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TableSession {
    pub id: String,
    pub table_id: String,
    pub guest_count: Option<i64>,
    /// `OPEN` or `CLOSED`.
    pub status: String,
    pub sync_status: SyncFlag,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_convention() {
        assert_eq!(priority_for("sale"), 10);
        assert_eq!(priority_for("refund"), 10);
        assert_eq!(priority_for("cash_drawer"), 5);
        assert_eq!(priority_for("shift"), 5);
        assert_eq!(priority_for("kitchen_order"), 0);
        assert_eq!(priority_for("table_session"), 0);
    }

    #[test]
    fn test_bump_chain() {
        assert_eq!(
            KitchenOrderStatus::Pending.bumped(),
            Some(KitchenOrderStatus::Preparing)
        );
        assert_eq!(
            KitchenOrderStatus::Preparing.bumped(),
            Some(KitchenOrderStatus::Ready)
        );
        assert_eq!(
            KitchenOrderStatus::Ready.bumped(),
            Some(KitchenOrderStatus::Completed)
        );
        assert_eq!(KitchenOrderStatus::Completed.bumped(), None);
        assert_eq!(KitchenOrderStatus::Cancelled.bumped(), None);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&OutboxStatus::DeadLetter).unwrap(),
            "\"DEAD_LETTER\""
        );
        assert_eq!(
            serde_json::to_string(&TerminalRole::Kds).unwrap(),
            "\"kds\""
        );
    }
}
