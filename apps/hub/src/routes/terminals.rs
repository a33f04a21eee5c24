//! Terminal registry routes.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use beacon_core::{new_id, TerminalRole};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "default_role")]
    pub role: TerminalRole,
}

fn default_role() -> TerminalRole {
    TerminalRole::Pos
}

/// `POST /api/terminals/register` — public: a factory-fresh terminal has
/// no session yet. Re-registration updates name and role in place.
pub async fn register(
    State(state): State<SharedState>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<Json<Value>> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Terminal name is required".to_string()));
    }

    let id = body.id.unwrap_or_else(new_id);
    let terminal = state.db.terminals().register(&id, body.name.trim(), body.role).await?;

    Ok(Json(json!({ "terminal": terminal })))
}

/// `GET /api/terminals`
pub async fn list(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let terminals = state.db.terminals().list().await?;
    Ok(Json(json!({ "terminals": terminals })))
}
