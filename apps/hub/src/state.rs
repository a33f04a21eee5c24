//! Shared application state.
//!
//! The push and pull engines are owned values wired at startup and handed
//! to the routes that control them — no module-level globals.

use std::sync::Arc;

use beacon_core::ConfigStore;
use beacon_db::Database;
use beacon_sync::{CloudClient, PullHandle, PushHandle};

use crate::auth::RecentUserCache;
use crate::rate_limit::RateLimiter;
use crate::realtime::RealtimeBus;

pub struct AppState {
    pub db: Database,
    pub config: ConfigStore,
    pub cloud: CloudClient,
    pub push: PushHandle,
    pub pull: PullHandle,
    pub bus: RealtimeBus,
    pub rate_limiter: RateLimiter,
    pub recent_users: RecentUserCache,
}

pub type SharedState = Arc<AppState>;
