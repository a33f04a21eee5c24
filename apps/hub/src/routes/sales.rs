//! Sale routes.
//!
//! The canonical mutation shape: validate, one transaction for business
//! rows plus the outbox row, commit, respond. The outbox payload is the
//! inbound body enriched with the hub-assigned identifiers — the cloud is
//! the schema authority, so the hub forwards what it was sent.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use beacon_core::{SaleStatus, Session};
use beacon_db::repository::{NewOutboxItem, NewPayment, NewSale, NewSaleItem};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaleItemBody {
    product_id: Option<String>,
    name: Option<String>,
    #[serde(default = "default_quantity")]
    quantity: f64,
    unit_price: f64,
    line_total: Option<f64>,
    modifiers: Option<Value>,
}

fn default_quantity() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentBody {
    method: String,
    amount: f64,
    tendered: Option<f64>,
    change_due: Option<f64>,
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSaleBody {
    total: f64,
    #[serde(default)]
    subtotal: Option<f64>,
    #[serde(default)]
    tax_total: Option<f64>,
    #[serde(default)]
    discount_total: Option<f64>,
    order_type: Option<String>,
    customer_id: Option<String>,
    table_id: Option<String>,
    notes: Option<String>,
    items: Vec<SaleItemBody>,
    #[serde(default)]
    payments: Vec<PaymentBody>,
}

fn terminal_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-terminal-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `POST /api/sales`
pub async fn create_sale(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
    Json(raw): Json<Value>,
) -> ApiResult<Json<Value>> {
    let body: CreateSaleBody = serde_json::from_value(raw.clone())
        .map_err(|e| ApiError::BadRequest(format!("Invalid sale body: {e}")))?;

    if body.items.is_empty() {
        return Err(ApiError::BadRequest("A sale requires at least one item".to_string()));
    }
    if body.total < 0.0 {
        return Err(ApiError::BadRequest("Sale total cannot be negative".to_string()));
    }

    let terminal_id = terminal_from_headers(&headers).or_else(|| session.terminal_id.clone());

    let new_sale = NewSale {
        subtotal: body.subtotal.unwrap_or(body.total),
        tax_total: body.tax_total.unwrap_or(0.0),
        discount_total: body.discount_total.unwrap_or(0.0),
        total: body.total,
        order_type: body.order_type.clone(),
        customer_id: body.customer_id.clone(),
        table_id: body.table_id.clone(),
        user_id: Some(session.user_id.clone()),
        terminal_id,
        notes: body.notes.clone(),
        items: body
            .items
            .iter()
            .map(|item| NewSaleItem {
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total.unwrap_or(item.quantity * item.unit_price),
                modifiers: item.modifiers.as_ref().map(Value::to_string),
            })
            .collect(),
        payments: body
            .payments
            .iter()
            .map(|payment| NewPayment {
                method: payment.method.clone(),
                amount: payment.amount,
                tendered: payment.tendered,
                change_due: payment.change_due,
                reference: payment.reference.clone(),
            })
            .collect(),
    };

    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    let receipt_number = state.db.sequences().next_receipt_number(&mut tx).await?;
    let sale = state.db.sales().create(&mut tx, &new_sale, &receipt_number).await?;

    let mut payload = raw;
    if let Some(object) = payload.as_object_mut() {
        object.insert("id".to_string(), json!(sale.id));
        object.insert("receiptNumber".to_string(), json!(sale.receipt_number));
        object.insert("createdAt".to_string(), json!(sale.created_at.to_rfc3339()));
        object.insert("userId".to_string(), json!(session.user_id));
    }

    state
        .db
        .outbox()
        .enqueue(&mut tx, NewOutboxItem::new("sale", &sale.id, "create", &payload))
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({
        "id": sale.id,
        "receiptNumber": sale.receipt_number,
        "status": "COMPLETED",
        "total": sale.total,
    })))
}

/// `GET /api/sales/{id}`
pub async fn get_sale(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let sale = state
        .db
        .sales()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Sale not found: {id}")))?;

    let items = state.db.sales().get_items(&id).await?;
    let payments = state.db.sales().get_payments(&id).await?;

    Ok(Json(json!({
        "sale": sale,
        "items": items,
        "payments": payments,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidSaleBody {
    pub reason: Option<String>,
}

/// `POST /api/sales/{id}/void`
pub async fn void_sale(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Option<Json<VoidSaleBody>>,
) -> ApiResult<Json<Value>> {
    let reason = body.and_then(|Json(b)| b.reason);

    let sale = state
        .db
        .sales()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Sale not found: {id}")))?;
    if sale.status == SaleStatus::Voided {
        return Err(ApiError::Conflict(format!("Sale {id} is already voided")));
    }

    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    state.db.sales().mark_voided(&mut tx, &id, reason.as_deref()).await?;
    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new("sale", &id, "void", &json!({ "id": id, "reason": reason })),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "id": id, "status": "VOIDED" })))
}
