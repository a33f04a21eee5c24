//! Sync observability and manual controls.
//!
//! These routes never run sync work inline with terminal traffic beyond
//! the explicitly requested manual cycle; engine errors surface here as
//! data, not as HTTP failures.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::SharedState;

/// `GET /api/sync/status` — every SyncState row plus outbox stats.
pub async fn status(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let states = state.db.sync_state().list().await?;
    let outbox = state.db.outbox().stats().await?;

    Ok(Json(json!({
        "configured": state.cloud.is_configured(),
        "entities": states,
        "outbox": outbox,
    })))
}

/// `POST /api/sync/pull` — run one pull cycle now.
pub async fn trigger_pull(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    match state.pull.run_cycle_now().await? {
        Some(summary) => Ok(Json(json!({ "ran": true, "summary": summary }))),
        None => Ok(Json(json!({
            "ran": false,
            "reason": "cycle already running or cloud not configured",
        }))),
    }
}

/// `POST /api/sync/push` — drain the outbox now.
pub async fn trigger_push(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    match state.push.drain_now().await? {
        Some(summary) => Ok(Json(json!({ "ran": true, "summary": summary }))),
        None => Ok(Json(json!({
            "ran": false,
            "reason": "drain already running or cloud not configured",
        }))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityFilterBody {
    pub entity_type: Option<String>,
}

/// `POST /api/sync/retry-dead-letters`
pub async fn retry_dead_letters(
    State(state): State<SharedState>,
    body: Option<Json<EntityFilterBody>>,
) -> ApiResult<Json<Value>> {
    let entity_type = body.and_then(|Json(b)| b.entity_type);
    let revived = state
        .db
        .outbox()
        .retry_dead_letters(entity_type.as_deref())
        .await?;

    tracing::info!(revived, entity_type = ?entity_type, "Dead letters reset to pending");
    Ok(Json(json!({ "revived": revived })))
}

/// `POST /api/sync/reset` — administrative cursor reset; the next cycle
/// full-fetches.
pub async fn reset(
    State(state): State<SharedState>,
    body: Option<Json<EntityFilterBody>>,
) -> ApiResult<Json<Value>> {
    let entity_type = body.and_then(|Json(b)| b.entity_type);
    let reset = state.db.sync_state().reset(entity_type.as_deref()).await?;

    tracing::info!(reset, entity_type = ?entity_type, "Sync cursors reset");
    Ok(Json(json!({ "reset": reset })))
}
