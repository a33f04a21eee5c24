//! # Realtime Bus
//!
//! In-memory registry of connected WebSocket peers and the role-filtered
//! broadcast primitive.
//!
//! ## Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  • One endpoint (/ws); frame shape {event, data, timestamp}            │
//! │  • Role is resolved from the terminal row at connect time — never     │
//! │    client-supplied                                                     │
//! │  • Best-effort fire-and-forget: a dead or slow peer is skipped and    │
//! │    cleaned up when its connection task ends                            │
//! │  • No replay. Clients re-read state over HTTP on reconnect.           │
//! │  • Broadcasts run AFTER the originating transaction commits.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use beacon_core::TerminalRole;

/// Per-peer outgoing queue depth. A peer that falls this far behind
/// starts losing frames (it will re-sync over HTTP).
const OUTGOING_BUFFER: usize = 64;

/// The wire frame.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub event: String,
    pub data: Value,
    pub timestamp: String,
}

impl Frame {
    fn new(event: &str, data: Value) -> Self {
        Frame {
            event: event.to_string(),
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// A connected peer.
#[derive(Debug, Clone)]
struct Peer {
    terminal_id: Option<String>,
    role: TerminalRole,
    tx: mpsc::Sender<Message>,
    #[allow(dead_code)]
    connected_at: Instant,
}

/// Broadcast filter: by role, and/or excluding the originating client.
#[derive(Debug, Clone, Default)]
pub struct BroadcastFilter {
    pub role: Option<TerminalRole>,
    pub exclude_client: Option<String>,
}

impl BroadcastFilter {
    pub fn role(role: TerminalRole) -> Self {
        BroadcastFilter {
            role: Some(role),
            ..Default::default()
        }
    }
}

/// Registry of live WebSocket peers. Cheap to clone; all clones share the
/// same peer table.
#[derive(Clone, Default)]
pub struct RealtimeBus {
    peers: Arc<RwLock<HashMap<String, Peer>>>,
}

impl RealtimeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Sends `{event, data, timestamp}` to every matching open socket.
    /// Returns how many peers the frame was queued for.
    pub async fn broadcast(&self, event: &str, data: Value, filter: BroadcastFilter) -> usize {
        let frame = Frame::new(event, data);
        let json = match serde_json::to_string(&frame) {
            Ok(j) => j,
            Err(e) => {
                warn!(event, error = %e, "Failed to serialize frame");
                return 0;
            }
        };

        // Snapshot the senders so slow peers never hold the registry lock.
        let targets: Vec<(String, mpsc::Sender<Message>)> = {
            let peers = self.peers.read().await;
            peers
                .iter()
                .filter(|(id, peer)| {
                    if let Some(role) = filter.role {
                        if peer.role != role {
                            return false;
                        }
                    }
                    if let Some(ref excluded) = filter.exclude_client {
                        if id.as_str() == excluded.as_str() {
                            return false;
                        }
                    }
                    true
                })
                .map(|(id, peer)| (id.clone(), peer.tx.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (client_id, tx) in targets {
            match tx.try_send(Message::Text(json.clone().into())) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(client_id = %client_id, error = %e, "Dropping frame for peer"),
            }
        }

        debug!(event, delivered, "Broadcast");
        delivered
    }

    /// Targeted send to every connection of one terminal.
    pub async fn send_to_terminal(&self, terminal_id: &str, event: &str, data: Value) -> usize {
        let frame = Frame::new(event, data);
        let Ok(json) = serde_json::to_string(&frame) else {
            return 0;
        };

        let targets: Vec<mpsc::Sender<Message>> = {
            let peers = self.peers.read().await;
            peers
                .values()
                .filter(|p| p.terminal_id.as_deref() == Some(terminal_id))
                .map(|p| p.tx.clone())
                .collect()
        };

        let mut delivered = 0;
        for tx in targets {
            if tx.try_send(Message::Text(json.clone().into())).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    async fn register(&self, client_id: &str, peer: Peer) {
        self.peers.write().await.insert(client_id.to_string(), peer);
    }

    async fn unregister(&self, client_id: &str) {
        if self.peers.write().await.remove(client_id).is_some() {
            info!(client_id, "Peer removed");
        }
    }

    /// Drives one accepted WebSocket until it closes. The role comes from
    /// the terminal record, resolved by the route before the upgrade.
    pub async fn run_connection(
        &self,
        socket: WebSocket,
        client_id: String,
        terminal_id: Option<String>,
        role: TerminalRole,
    ) {
        let (mut sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::channel::<Message>(OUTGOING_BUFFER);

        self.register(
            &client_id,
            Peer {
                terminal_id: terminal_id.clone(),
                role,
                tx: tx.clone(),
                connected_at: Instant::now(),
            },
        )
        .await;
        info!(client_id = %client_id, ?terminal_id, ?role, "Peer connected");

        let outgoing = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
        });

        // Inbound loop. Terminals do not push state over the socket; only
        // control frames matter.
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Ping(payload)) => {
                    let _ = tx.try_send(Message::Pong(payload));
                }
                Ok(Message::Close(_)) => {
                    debug!(client_id = %client_id, "Peer requested close");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(client_id = %client_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }

        outgoing.abort();
        self.unregister(&client_id).await;
    }
}
