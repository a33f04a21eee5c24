//! Refunds, guest checks, store credit and table sessions.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use beacon_core::Session;
use beacon_db::repository::NewOutboxItem;

use crate::error::{ApiError, ApiResult};
use crate::realtime::BroadcastFilter;
use crate::state::SharedState;

// =============================================================================
// Refunds
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundBody {
    pub sale_id: String,
    pub amount: f64,
    pub reason: Option<String>,
}

/// `POST /api/refunds`
pub async fn create_refund(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
    Json(body): Json<RefundBody>,
) -> ApiResult<Json<Value>> {
    if body.amount <= 0.0 {
        return Err(ApiError::BadRequest("Refund amount must be positive".to_string()));
    }
    state
        .db
        .sales()
        .get(&body.sale_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Sale not found: {}", body.sale_id)))?;

    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    let refund = state
        .db
        .misc()
        .create_refund(
            &mut tx,
            &body.sale_id,
            body.amount,
            body.reason.as_deref(),
            Some(&session.user_id),
        )
        .await?;

    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new(
                "refund",
                &refund.id,
                "create",
                &json!({
                    "id": refund.id,
                    "saleId": body.sale_id,
                    "amount": body.amount,
                    "reason": body.reason,
                    "userId": session.user_id,
                }),
            ),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "id": refund.id, "saleId": body.sale_id })))
}

// =============================================================================
// Guest checks
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestCheckBody {
    pub table_id: Option<String>,
    pub customer_id: Option<String>,
    pub name: Option<String>,
}

/// `POST /api/guest-checks`
pub async fn create_guest_check(
    State(state): State<SharedState>,
    Json(body): Json<GuestCheckBody>,
) -> ApiResult<Json<Value>> {
    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    let check = state
        .db
        .misc()
        .create_guest_check(
            &mut tx,
            body.table_id.as_deref(),
            body.customer_id.as_deref(),
            body.name.as_deref(),
        )
        .await?;

    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new(
                "guest_check",
                &check.id,
                "create",
                &json!({
                    "id": check.id,
                    "tableId": body.table_id,
                    "customerId": body.customer_id,
                    "name": body.name,
                }),
            ),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "id": check.id, "status": "OPEN" })))
}

/// `POST /api/guest-checks/{id}/close`
pub async fn close_guest_check(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    state
        .db
        .misc()
        .close_guest_check(&mut tx, &id)
        .await
        .map_err(|_| ApiError::Conflict(format!("Guest check {id} is not open")))?;

    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new("guest_check", &id, "close", &json!({ "id": id })),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "id": id, "status": "CLOSED" })))
}

// =============================================================================
// Store credit
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCreditBody {
    pub customer_id: String,
    pub delta: f64,
    pub reason: Option<String>,
    pub sale_id: Option<String>,
}

/// `POST /api/store-credits` — one signed ledger entry.
pub async fn create_store_credit(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
    Json(body): Json<StoreCreditBody>,
) -> ApiResult<Json<Value>> {
    if body.delta == 0.0 {
        return Err(ApiError::BadRequest("Store credit delta cannot be zero".to_string()));
    }

    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    let entry = state
        .db
        .misc()
        .create_store_credit(
            &mut tx,
            &body.customer_id,
            body.delta,
            body.reason.as_deref(),
            body.sale_id.as_deref(),
            Some(&session.user_id),
        )
        .await?;

    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new(
                "store_credit",
                &entry.id,
                "create",
                &json!({
                    "id": entry.id,
                    "customerId": body.customer_id,
                    "delta": body.delta,
                    "reason": body.reason,
                    "saleId": body.sale_id,
                }),
            ),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    let balance = state.db.misc().store_credit_balance(&body.customer_id).await?;
    Ok(Json(json!({ "id": entry.id, "balance": balance })))
}

/// `GET /api/store-credits/{customer_id}`
pub async fn store_credit_balance(
    State(state): State<SharedState>,
    Path(customer_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let balance = state.db.misc().store_credit_balance(&customer_id).await?;
    Ok(Json(json!({ "customerId": customer_id, "balance": balance })))
}

// =============================================================================
// Table sessions
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTableBody {
    pub table_id: String,
    pub guest_count: Option<i64>,
}

/// `POST /api/table-sessions/open`
pub async fn open_table_session(
    State(state): State<SharedState>,
    Json(body): Json<OpenTableBody>,
) -> ApiResult<Json<Value>> {
    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    let session = state
        .db
        .misc()
        .open_table_session(&mut tx, &body.table_id, body.guest_count)
        .await?;

    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new(
                "table_session",
                &session.id,
                "open",
                &json!({
                    "id": session.id,
                    "tableId": body.table_id,
                    "guestCount": body.guest_count,
                }),
            ),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    state
        .bus
        .broadcast(
            "table:updated",
            json!({ "tableId": body.table_id, "status": "OCCUPIED" }),
            BroadcastFilter::default(),
        )
        .await;

    Ok(Json(json!({ "id": session.id, "tableId": body.table_id })))
}

/// `POST /api/table-sessions/{id}/close`
pub async fn close_table_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    let table_id = state
        .db
        .misc()
        .close_table_session(&mut tx, &id)
        .await?
        .ok_or_else(|| ApiError::Conflict(format!("Table session {id} is not open")))?;

    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new("table_session", &id, "close", &json!({ "id": id })),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    state
        .bus
        .broadcast(
            "table:updated",
            json!({ "tableId": table_id, "status": "AVAILABLE" }),
            BroadcastFilter::default(),
        )
        .await;

    Ok(Json(json!({ "id": id, "status": "CLOSED" })))
}
