//! # PIN Authentication & Sessions
//!
//! The minimum contract a terminal must satisfy before mutating state:
//! a PIN login minting a session, and the `x-session-id` check on every
//! protected request.
//!
//! ## The MRU Shortcut
//! PIN hashes are argon2 — deliberately slow. Verifying a PIN against a
//! hundred staff hashes serially would cost over a second, but in a
//! restaurant the same few people log in all day. A bounded most-recently
//! -used list (≤5 ids) is tried first, cutting the common case to one
//! hash check. Correctness never depends on the cache; a miss falls back
//! to the full scan. PIN updates clear it.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Mutex;

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use beacon_core::{Session, TerminalStatus, User};
use beacon_db::repository::NewOutboxItem;

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Bound on the most-recently-used user list.
const MRU_CAPACITY: usize = 5;

/// Routes reachable without a session.
const PUBLIC_PATHS: &[&str] = &[
    "/health",
    "/api/auth/pin-login",
    "/api/terminals/register",
    "/api/admin/pairing",
    "/ws",
];

// =============================================================================
// MRU user cache
// =============================================================================

/// Bounded list of recently authenticated user ids, most recent first.
#[derive(Default)]
pub struct RecentUserCache {
    ids: Mutex<Vec<String>>,
}

impl RecentUserCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `user_id` to the front, evicting the oldest beyond capacity.
    pub fn promote(&self, user_id: &str) {
        let mut ids = self.ids.lock().expect("mru lock poisoned");
        ids.retain(|id| id != user_id);
        ids.insert(0, user_id.to_string());
        ids.truncate(MRU_CAPACITY);
    }

    /// Invalidate everything (after any PIN change).
    pub fn clear(&self) {
        self.ids.lock().expect("mru lock poisoned").clear();
    }

    /// Reorders candidates so cached ids come first, preserving their
    /// recency order.
    pub fn prioritize(&self, candidates: Vec<User>) -> Vec<User> {
        let ids = self.ids.lock().expect("mru lock poisoned").clone();
        if ids.is_empty() {
            return candidates;
        }

        let recent: HashSet<&String> = ids.iter().collect();
        let mut front: Vec<User> = Vec::new();
        let mut rest: Vec<User> = Vec::new();
        for user in candidates {
            if recent.contains(&user.id) {
                front.push(user);
            } else {
                rest.push(user);
            }
        }
        front.sort_by_key(|u| ids.iter().position(|id| *id == u.id).unwrap_or(usize::MAX));
        front.extend(rest);
        front
    }
}

// =============================================================================
// Hashing
// =============================================================================

fn pin_matches(pin: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(pin.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "Unparseable PIN hash in users table");
            false
        }
    }
}

/// Hashes a new PIN for storage (admin PIN update route).
pub fn hash_pin(pin: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("PIN hashing failed: {e}")))
}

fn validate_pin(pin: &str) -> ApiResult<()> {
    if pin.len() < 4 || pin.len() > 10 {
        return Err(ApiError::BadRequest(
            "PIN must be between 4 and 10 characters".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// Session middleware
// =============================================================================

/// Rejects protected requests without an active session; stashes the
/// session in request extensions for handlers that attribute writes.
pub async fn require_session(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path();
    if PUBLIC_PATHS.contains(&path) {
        return Ok(next.run(request).await);
    }

    let session_id = request
        .headers()
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing x-session-id header".to_string()))?;

    let session = state
        .db
        .sessions()
        .get_active(session_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))?;

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

// =============================================================================
// Routes
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinLoginRequest {
    pub pin: String,
    pub terminal_id: Option<String>,
}

/// `POST /api/auth/pin-login`
pub async fn pin_login(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<PinLoginRequest>,
) -> ApiResult<Json<Value>> {
    validate_pin(&body.pin)?;

    // The limiter counts every attempt, valid PIN or not.
    if !state.rate_limiter.check(addr.ip()) {
        warn!(ip = %addr.ip(), "PIN attempts rate-limited");
        return Err(ApiError::RateLimited);
    }

    let candidates = state.db.users().list_pin_candidates().await?;
    let ordered = state.recent_users.prioritize(candidates);

    for user in ordered {
        let Some(ref hash) = user.pin_hash else { continue };
        if !pin_matches(&body.pin, hash) {
            continue;
        }

        state.recent_users.promote(&user.id);
        let session = state
            .db
            .sessions()
            .create(body.terminal_id.as_deref(), &user.id)
            .await?;

        if let Some(ref terminal_id) = body.terminal_id {
            state
                .db
                .terminals()
                .set_status(terminal_id, TerminalStatus::Online)
                .await?;
        }

        info!(user_id = %user.id, terminal_id = ?body.terminal_id, "PIN login");

        let permissions: Value = user
            .permissions
            .as_deref()
            .and_then(|p| serde_json::from_str(p).ok())
            .unwrap_or_else(|| json!([]));

        return Ok(Json(json!({
            "sessionId": session.id,
            "user": {
                "id": user.id,
                "name": user.name,
                "role": user.role,
                "permissions": permissions,
                "maxDiscount": user.max_discount,
            }
        })));
    }

    debug!(ip = %addr.ip(), "PIN login failed");
    Err(ApiError::Unauthorized("Invalid PIN".to_string()))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(state): State<SharedState>,
    session: axum::Extension<Session>,
) -> ApiResult<Json<Value>> {
    let ended = state.db.sessions().end(&session.id).await?;
    Ok(Json(json!({ "success": ended })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePinRequest {
    pub pin: String,
}

/// `POST /api/users/{id}/pin` — admin PIN update. Writes the new hash
/// with an outbox row in one transaction and clears the MRU cache.
pub async fn update_pin(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Json(body): Json<UpdatePinRequest>,
) -> ApiResult<Json<Value>> {
    validate_pin(&body.pin)?;
    let pin_hash = hash_pin(&body.pin)?;

    let mut tx = state.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

    let updated = state
        .db
        .users()
        .set_pin_hash(&mut tx, &user_id, &pin_hash)
        .await?;
    if !updated {
        return Err(ApiError::NotFound(format!("User not found: {user_id}")));
    }

    state
        .db
        .outbox()
        .enqueue(
            &mut tx,
            NewOutboxItem::new(
                "user",
                &user_id,
                "update_pin",
                &json!({ "userId": user_id, "pinHash": pin_hash }),
            ),
        )
        .await?;

    tx.commit().await.map_err(beacon_db::DbError::from)?;

    state.recent_users.clear();
    info!(user_id = %user_id, "PIN updated; MRU cache cleared");

    Ok(Json(json!({ "success": true })))
}
