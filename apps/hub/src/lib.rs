//! # beacon-hub: The Edge Hub Server
//!
//! Terminal-facing HTTP/WebSocket server for one location, wired to the
//! local store and the cloud sync engines.
//!
//! ## Process Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          beacon-hub process                             │
//! │                                                                         │
//! │   terminals ──HTTP──▶ axum Router ──▶ routes/* ──▶ beacon-db Store     │
//! │   terminals ──WS────▶ RealtimeBus                      │               │
//! │                                                        ▼               │
//! │   PushEngine (5 s) ◀── outbox_queue ◀──────── outbox rows              │
//! │   PullEngine (60 s) ──▶ reference mirrors                              │
//! │                                                                         │
//! │   Both engines are owned by AppState and controlled via the            │
//! │   /api/sync routes. Shutdown stops them, checkpoints the WAL and       │
//! │   closes the listener.                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod realtime;
pub mod routes;
pub mod state;

use std::sync::Arc;

use beacon_core::ConfigStore;
use beacon_db::Database;
use beacon_sync::{CloudClient, PullEngine, PushEngine};

use crate::auth::RecentUserCache;
use crate::rate_limit::RateLimiter;
use crate::realtime::RealtimeBus;
use crate::state::{AppState, SharedState};

/// Wires the full application state: one cloud client, one engine of
/// each kind (started), one realtime bus.
pub fn build_state(db: Database, config: ConfigStore) -> SharedState {
    let cloud = CloudClient::new(config.clone());
    let push = PushEngine::new(db.clone(), cloud.clone()).start();
    let pull = PullEngine::new(db.clone(), cloud.clone()).start();

    Arc::new(AppState {
        db,
        config,
        cloud,
        push,
        pull,
        bus: RealtimeBus::new(),
        rate_limiter: RateLimiter::default(),
        recent_users: RecentUserCache::new(),
    })
}
