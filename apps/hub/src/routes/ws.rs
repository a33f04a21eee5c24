//! WebSocket endpoint.
//!
//! The peer's role comes from its terminal row, looked up before the
//! upgrade — a client cannot claim to be a kitchen display by asking.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{info, warn};

use beacon_core::{new_id, TerminalRole, TerminalStatus};

use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub terminal_id: Option<String>,
}

/// `GET /ws?terminalId=`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let terminal_id = query.terminal_id;

    // Unregistered terminals still connect; they just get the default
    // role and miss role-filtered events.
    let role = match terminal_id.as_deref() {
        Some(id) => match state.db.terminals().get(id).await {
            Ok(Some(terminal)) => terminal.role,
            Ok(None) => {
                warn!(terminal_id = id, "WebSocket from unregistered terminal");
                TerminalRole::Pos
            }
            Err(e) => {
                warn!(error = %e, "Terminal lookup failed on WS connect");
                TerminalRole::Pos
            }
        },
        None => TerminalRole::Pos,
    };

    let client_id = new_id();
    info!(client_id = %client_id, ?terminal_id, ?role, "WebSocket upgrade");

    ws.on_upgrade(move |socket| async move {
        if let Some(ref id) = terminal_id {
            state
                .db
                .terminals()
                .set_status(id, TerminalStatus::Online)
                .await
                .ok();
        }

        state
            .bus
            .run_connection(socket, client_id, terminal_id.clone(), role)
            .await;

        if let Some(ref id) = terminal_id {
            state
                .db
                .terminals()
                .set_status(id, TerminalStatus::Offline)
                .await
                .ok();
        }
    })
}
