//! Kitchen order routes and KDS fan-out.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use beacon_core::{KitchenOrderStatus, TerminalRole};
use beacon_db::repository::{NewKitchenItem, NewOutboxItem};

use crate::error::{ApiError, ApiResult};
use crate::realtime::BroadcastFilter;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KitchenItemBody {
    product_id: Option<String>,
    name: Option<String>,
    #[serde(default = "default_quantity")]
    quantity: f64,
    station: Option<String>,
    notes: Option<String>,
}

fn default_quantity() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderBody {
    sale_id: Option<String>,
    table_id: Option<String>,
    order_type: Option<String>,
    notes: Option<String>,
    items: Vec<KitchenItemBody>,
}

/// `POST /api/kitchen-orders`
pub async fn create_order(
    State(state): State<SharedState>,
    Json(raw): Json<Value>,
) -> ApiResult<Json<Value>> {
    let body: CreateOrderBody = serde_json::from_value(raw.clone())
        .map_err(|e| ApiError::BadRequest(format!("Invalid kitchen order body: {e}")))?;

    if body.items.is_empty() {
        return Err(ApiError::BadRequest(
            "A kitchen order requires at least one item".to_string(),
        ));
    }

    let items: Vec<NewKitchenItem> = body
        .items
        .iter()
        .map(|item| NewKitchenItem {
            product_id: item.product_id.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            station: item.station.clone(),
            notes: item.notes.clone(),
        })
        .collect();

    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    let order = state
        .db
        .kitchen()
        .create(
            &mut tx,
            body.sale_id.as_deref(),
            body.table_id.as_deref(),
            body.order_type.as_deref(),
            body.notes.as_deref(),
            &items,
        )
        .await?;

    let mut payload = raw;
    if let Some(object) = payload.as_object_mut() {
        object.insert("id".to_string(), json!(order.id));
        object.insert("createdAt".to_string(), json!(order.created_at.to_rfc3339()));
    }

    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new("kitchen_order", &order.id, "create", &payload),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    // Fan-out only after the transaction is durable.
    state
        .bus
        .broadcast(
            "order:created",
            json!({ "id": order.id, "tableId": order.table_id, "status": order.status }),
            BroadcastFilter::role(TerminalRole::Kds),
        )
        .await;

    Ok(Json(json!({ "id": order.id, "status": order.status })))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<String>,
}

/// `GET /api/kitchen-orders?status=`
pub async fn list_orders(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(parse_status(raw)?),
        None => None,
    };

    let orders = state.db.kitchen().list(status).await?;
    Ok(Json(json!({ "orders": orders })))
}

/// `POST /api/kitchen-orders/{id}/bump`
///
/// Advances PENDING → PREPARING → READY → COMPLETED. A bump past the end
/// of the chain answers `{"success": false}` rather than erroring — the
/// KDS treats it as a no-op.
pub async fn bump_order(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let order = state
        .db
        .kitchen()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Kitchen order not found: {id}")))?;

    let Some(next) = order.status.bumped() else {
        return Ok(Json(json!({ "success": false, "status": order.status })));
    };

    apply_transition(&state, &id, next).await?;
    Ok(Json(json!({ "success": true, "status": next })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStatusBody {
    pub status: String,
}

/// `POST /api/kitchen-orders/{id}/status`
pub async fn set_status(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<SetStatusBody>,
) -> ApiResult<Json<Value>> {
    let status = parse_status(&body.status)?;

    state
        .db
        .kitchen()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Kitchen order not found: {id}")))?;

    apply_transition(&state, &id, status).await?;
    Ok(Json(json!({ "success": true, "status": status })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderBody {
    pub notes: Option<String>,
}

/// `PATCH /api/kitchen-orders/{id}` — edit; notifies the kitchen displays.
pub async fn update_order(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateOrderBody>,
) -> ApiResult<Json<Value>> {
    state
        .db
        .kitchen()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Kitchen order not found: {id}")))?;

    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    sqlx::query("UPDATE kitchen_orders SET notes = ?1 WHERE id = ?2")
        .bind(&body.notes)
        .bind(&id)
        .execute(&mut *tx)
        .await
        .map_err(beacon_db::DbError::from)?;

    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new(
                "kitchen_order",
                &id,
                "update",
                &json!({ "id": id, "notes": body.notes }),
            ),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    state
        .bus
        .broadcast(
            "order:updated",
            json!({ "id": id, "notes": body.notes }),
            BroadcastFilter::role(TerminalRole::Kds),
        )
        .await;

    Ok(Json(json!({ "success": true })))
}

async fn apply_transition(
    state: &SharedState,
    id: &str,
    status: KitchenOrderStatus,
) -> ApiResult<()> {
    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    state.db.kitchen().set_status(&mut tx, id, status).await?;
    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new(
                "kitchen_order",
                id,
                "status",
                &json!({ "id": id, "status": status }),
            ),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    state
        .bus
        .broadcast(
            "order:status",
            json!({ "id": id, "status": status }),
            BroadcastFilter::default(),
        )
        .await;

    Ok(())
}

fn parse_status(raw: &str) -> ApiResult<KitchenOrderStatus> {
    serde_json::from_value(json!(raw))
        .map_err(|_| ApiError::BadRequest(format!("Unknown kitchen order status: {raw}")))
}
