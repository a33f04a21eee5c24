//! Shift routes.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use beacon_core::Session;
use beacon_db::repository::NewOutboxItem;

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartShiftBody {
    pub terminal_id: Option<String>,
}

/// `POST /api/shifts/start`
pub async fn start_shift(
    State(state): State<SharedState>,
    Extension(session): Extension<Session>,
    body: Option<Json<StartShiftBody>>,
) -> ApiResult<Json<Value>> {
    let terminal_id = body
        .and_then(|Json(b)| b.terminal_id)
        .or_else(|| session.terminal_id.clone());

    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    let shift = state
        .db
        .shifts()
        .start(&mut tx, &session.user_id, terminal_id.as_deref())
        .await?;

    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new(
                "shift",
                &shift.id,
                "start",
                &json!({
                    "id": shift.id,
                    "userId": session.user_id,
                    "terminalId": terminal_id,
                    "startedAt": shift.started_at.to_rfc3339(),
                }),
            ),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "id": shift.id, "status": shift.status })))
}

/// `POST /api/shifts/{id}/end`
pub async fn end_shift(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let shift = state
        .db
        .shifts()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Shift not found: {id}")))?;
    if shift.status == beacon_core::ShiftStatus::Ended {
        return Err(ApiError::Conflict(format!("Shift {id} has already ended")));
    }

    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    state.db.shifts().end(&mut tx, &id).await?;
    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new("shift", &id, "end", &json!({ "id": id })),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "id": id, "status": "ENDED" })))
}

/// `POST /api/shifts/{id}/breaks`
pub async fn start_break(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .db
        .shifts()
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Shift not found: {id}")))?;

    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    let brk = state.db.shifts().start_break(&mut tx, &id).await?;
    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new(
                "shift_break",
                &brk.id,
                "start",
                &json!({ "id": brk.id, "shiftId": id }),
            ),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "id": brk.id, "shiftId": id })))
}

/// `POST /api/shifts/{id}/breaks/{break_id}/end`
pub async fn end_break(
    State(state): State<SharedState>,
    Path((shift_id, break_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    state
        .db
        .shifts()
        .end_break(&mut tx, &break_id)
        .await
        .map_err(|_| ApiError::Conflict(format!("Break {break_id} is not open")))?;

    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new(
                "shift_break",
                &break_id,
                "end",
                &json!({ "id": break_id, "shiftId": shift_id }),
            ),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "success": true })))
}
