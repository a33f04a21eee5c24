//! Cash drawer routes.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use beacon_core::Session;
use beacon_db::repository::NewOutboxItem;

use crate::error::{ApiError, ApiResult};
use crate::realtime::BroadcastFilter;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDrawerBody {
    pub terminal_id: Option<String>,
    pub opening_amount: f64,
    pub notes: Option<String>,
}

/// `POST /api/cash-drawers/open`
pub async fn open_drawer(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
    Json(body): Json<OpenDrawerBody>,
) -> ApiResult<Json<Value>> {
    if body.opening_amount < 0.0 {
        return Err(ApiError::BadRequest("Opening amount cannot be negative".to_string()));
    }

    let terminal_id = body
        .terminal_id
        .clone()
        .or_else(|| {
            headers
                .get("x-terminal-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .or_else(|| session.terminal_id.clone());

    if let Some(ref terminal) = terminal_id {
        if state.db.drawers().open_for_terminal(terminal).await?.is_some() {
            return Err(ApiError::Conflict(format!(
                "Terminal {terminal} already has an open drawer"
            )));
        }
    }

    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    let drawer = state
        .db
        .drawers()
        .open(
            &mut tx,
            terminal_id.as_deref(),
            Some(&session.user_id),
            body.opening_amount,
            body.notes.as_deref(),
        )
        .await?;

    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new(
                "cash_drawer",
                &drawer.id,
                "open",
                &json!({
                    "id": drawer.id,
                    "terminalId": terminal_id,
                    "openingAmount": body.opening_amount,
                    "openedAt": drawer.opened_at.to_rfc3339(),
                }),
            ),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    state
        .bus
        .broadcast(
            "drawer:opened",
            json!({ "id": drawer.id, "terminalId": terminal_id }),
            BroadcastFilter::default(),
        )
        .await;

    Ok(Json(json!({ "id": drawer.id, "status": "OPEN" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseDrawerBody {
    pub closing_amount: f64,
    pub expected_amount: Option<f64>,
    pub notes: Option<String>,
}

/// `POST /api/cash-drawers/{id}/close`
pub async fn close_drawer(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<CloseDrawerBody>,
) -> ApiResult<Json<Value>> {
    let drawer = state
        .db
        .drawers()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Cash drawer not found: {id}")))?;
    if drawer.status == beacon_core::DrawerStatus::Closed {
        return Err(ApiError::Conflict(format!("Cash drawer {id} is not open")));
    }

    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    state
        .db
        .drawers()
        .close(
            &mut tx,
            &id,
            body.closing_amount,
            body.expected_amount,
            body.notes.as_deref(),
        )
        .await?;

    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new(
                "cash_drawer",
                &id,
                "close",
                &json!({
                    "id": id,
                    "closingAmount": body.closing_amount,
                    "expectedAmount": body.expected_amount,
                }),
            ),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "id": id, "status": "CLOSED" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawerTransactionBody {
    pub kind: String,
    pub amount: f64,
    pub reason: Option<String>,
}

/// `POST /api/cash-drawers/{id}/transactions` — paid-in / paid-out.
pub async fn add_transaction(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(body): Json<DrawerTransactionBody>,
) -> ApiResult<Json<Value>> {
    if !matches!(body.kind.as_str(), "PAID_IN" | "PAID_OUT") {
        return Err(ApiError::BadRequest(format!(
            "Transaction kind must be PAID_IN or PAID_OUT, got: {}",
            body.kind
        )));
    }
    if body.amount <= 0.0 {
        return Err(ApiError::BadRequest("Amount must be positive".to_string()));
    }

    let drawer = state
        .db
        .drawers()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Cash drawer not found: {id}")))?;
    if drawer.status != beacon_core::DrawerStatus::Open {
        return Err(ApiError::Conflict(format!("Cash drawer {id} is not open")));
    }

    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    let txn = state
        .db
        .drawers()
        .add_transaction(
            &mut tx,
            &id,
            &body.kind,
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
                "cash_drawer_transaction",
                &txn.id,
                "create",
                &json!({
                    "id": txn.id,
                    "drawerId": id,
                    "kind": body.kind,
                    "amount": body.amount,
                    "reason": body.reason,
                }),
            ),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "id": txn.id, "drawerId": id })))
}
