//! Health and diagnostics.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::SharedState;

/// `GET /health`
pub async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": if state.db.health_check().await { "ok" } else { "degraded" },
    }))
}

/// Tables worth counting in the diagnostics summary.
const COUNTED_TABLES: &[&str] = &[
    "products",
    "categories",
    "customers",
    "users",
    "sales",
    "sale_items",
    "payments",
    "kitchen_orders",
    "cash_drawers",
    "shift_logs",
];

/// `GET /api/diagnostics`
pub async fn diagnostics(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let reference = state.db.reference();

    let mut tables = serde_json::Map::new();
    for table in COUNTED_TABLES {
        tables.insert((*table).to_string(), json!(reference.count(table).await?));
    }

    let outbox = state.db.outbox().stats().await?;
    let oldest_pending_secs = state.db.outbox().oldest_pending_age_secs().await?;
    let db_size = state.db.file_size_bytes().await?;
    let terminal_count = state.db.terminals().count().await?;
    let peers = state.bus.peer_count().await;

    Ok(Json(json!({
        "configured": state.cloud.is_configured(),
        "tables": tables,
        "outbox": {
            "depth": outbox.pending + outbox.processing,
            "oldestPendingSecs": oldest_pending_secs,
            "deadLetters": outbox.dead_letter,
            "stats": outbox,
        },
        "dbSizeBytes": db_size,
        "terminals": terminal_count,
        "realtimePeers": peers,
    })))
}
