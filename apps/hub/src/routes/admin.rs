//! Pairing / cloud credential administration.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingBody {
    pub cloud_base_url: String,
    pub api_key: String,
    pub tenant_id: Option<String>,
    pub location_id: Option<String>,
}

/// `POST /api/admin/pairing`
///
/// Persists cloud credentials through the live config store. The cloud
/// client reads config on every call, so the new identity takes effect
/// immediately — no restart.
pub async fn pairing(
    State(state): State<SharedState>,
    Json(body): Json<PairingBody>,
) -> ApiResult<Json<Value>> {
    if body.cloud_base_url.trim().is_empty() || body.api_key.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "cloudBaseUrl and apiKey are required".to_string(),
        ));
    }
    if !body.cloud_base_url.starts_with("http://") && !body.cloud_base_url.starts_with("https://") {
        return Err(ApiError::BadRequest(
            "cloudBaseUrl must start with http:// or https://".to_string(),
        ));
    }

    state.config.update(|config| {
        config.cloud_base_url = Some(body.cloud_base_url.trim().trim_end_matches('/').to_string());
        config.cloud_api_key = Some(body.api_key.trim().to_string());
        if body.tenant_id.is_some() {
            config.tenant_id = body.tenant_id.clone();
        }
        if body.location_id.is_some() {
            config.location_id = body.location_id.clone();
        }
    })?;

    tracing::info!("Cloud pairing updated");
    Ok(Json(json!({ "configured": state.cloud.is_configured() })))
}
