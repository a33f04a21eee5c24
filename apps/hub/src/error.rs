//! HTTP error type for the hub surface.
//!
//! One enum, one mapping to status codes, one JSON body shape
//! (`{"error": "..."}`). Sync-engine failures never pass through here;
//! they surface via `/api/sync/status` instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed body, missing required field.
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid session.
    #[error("{0}")]
    Unauthorized(String),

    /// Resource by id does not exist.
    #[error("{0}")]
    NotFound(String),

    /// State conflict (voiding a voided sale, closing a closed drawer).
    /// Reported as 400 with a descriptive message.
    #[error("{0}")]
    Conflict(String),

    /// Too many PIN attempts from this address.
    #[error("Too many attempts, try again later")]
    RateLimited,

    #[error("Internal error")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(m) | ApiError::Conflict(m) => {
                (StatusCode::BAD_REQUEST, m.clone())
            }
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many attempts, try again later".to_string(),
            ),
            ApiError::Internal(detail) => {
                // Detail goes to the log, not the wire.
                tracing::error!(detail = %detail, "Internal error serving request");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<beacon_db::DbError> for ApiError {
    fn from(err: beacon_db::DbError) -> Self {
        match err {
            beacon_db::DbError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{entity} not found: {id}"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<beacon_sync::SyncError> for ApiError {
    fn from(err: beacon_sync::SyncError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<beacon_core::ConfigError> for ApiError {
    fn from(err: beacon_core::ConfigError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("x".into()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::RateLimited.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
