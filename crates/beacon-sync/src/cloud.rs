//! # Cloud HTTP Client
//!
//! Small JSON client for the cloud API. Credentials are read through the
//! live [`ConfigStore`] on **every call**, so a re-pair through the admin
//! route takes effect without restarting the hub.
//!
//! The client never retries; retry policy belongs to the engines calling
//! it. Every outcome — including timeouts and connection failures — is
//! folded into the uniform [`CloudResponse`] envelope so callers branch on
//! data, not on error types.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use beacon_core::ConfigStore;

/// Per-call timeout; the request is cancelled on expiry.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How much of an error body makes it into logs.
const MAX_LOG_BODY_CHARS: usize = 512;

/// Uniform response envelope. `ok` is true iff the HTTP status was 2xx.
/// Network failures and timeouts surface as `ok = false, status = 0`.
#[derive(Debug, Clone)]
pub struct CloudResponse {
    pub ok: bool,
    pub status: u16,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl CloudResponse {
    fn network_failure(message: String) -> Self {
        CloudResponse {
            ok: false,
            status: 0,
            data: None,
            error: Some(message),
        }
    }
}

/// The push envelope POSTed for each outbox item.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEnvelope {
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub payload: Value,
    pub correlation_id: Option<String>,
}

/// HTTP/JSON client for the cloud API.
#[derive(Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    config: ConfigStore,
}

impl CloudClient {
    pub fn new(config: ConfigStore) -> Self {
        // Timeouts are applied per request so a future per-call override
        // does not need a new client.
        let http = reqwest::Client::builder()
            .build()
            .expect("reqwest client construction cannot fail with default TLS");
        CloudClient { http, config }
    }

    /// True iff base URL and API key are both present. Engines gate on
    /// this before doing any work.
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// GET `{base}/api/hub/sync/{entity}`, optionally with a
    /// `sinceVersion` delta cursor.
    pub async fn get_sync(&self, entity: &str, since_version: Option<&str>) -> CloudResponse {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(since) = since_version {
            query.push(("sinceVersion", since.to_string()));
        }
        self.get(&format!("/api/hub/sync/{entity}"), &query).await
    }

    /// POST `{base}/api/hub/push/{endpoint}` with the push envelope.
    pub async fn post_push(&self, endpoint: &str, envelope: &PushEnvelope) -> CloudResponse {
        self.post_json(&format!("/api/hub/push/{endpoint}"), envelope).await
    }

    /// Generic GET under the configured base URL.
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> CloudResponse {
        let config = self.config.get();
        let Some(base) = config.cloud_base_url.as_deref() else {
            return CloudResponse::network_failure("cloud base URL not configured".into());
        };

        let request = self
            .http
            .get(format!("{}{}", base.trim_end_matches('/'), path))
            .query(query)
            .timeout(REQUEST_TIMEOUT);

        self.send(self.identity_headers(request, &config)).await
    }

    /// Generic POST of a JSON body under the configured base URL.
    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> CloudResponse {
        let config = self.config.get();
        let Some(base) = config.cloud_base_url.as_deref() else {
            return CloudResponse::network_failure("cloud base URL not configured".into());
        };

        let request = self
            .http
            .post(format!("{}{}", base.trim_end_matches('/'), path))
            .json(body)
            .timeout(REQUEST_TIMEOUT);

        self.send(self.identity_headers(request, &config)).await
    }

    fn identity_headers(
        &self,
        mut request: reqwest::RequestBuilder,
        config: &beacon_core::HubConfig,
    ) -> reqwest::RequestBuilder {
        if let Some(ref key) = config.cloud_api_key {
            request = request.header("X-API-Key", key);
        }
        if let Some(ref tenant) = config.tenant_id {
            request = request.header("X-Tenant-ID", tenant);
        }
        if let Some(ref location) = config.location_id {
            request = request.header("X-Location-ID", location);
        }
        request
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> CloudResponse {
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "Cloud request failed before a response");
                return CloudResponse::network_failure(e.to_string());
            }
        };

        let status = response.status().as_u16();
        let ok = response.status().is_success();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return CloudResponse::network_failure(e.to_string()),
        };

        let data = if is_json && !body.is_empty() {
            serde_json::from_str(&body).ok()
        } else {
            None
        };

        let error = if ok {
            None
        } else {
            let mut preview: String = body.chars().take(MAX_LOG_BODY_CHARS).collect();
            if body.chars().count() > MAX_LOG_BODY_CHARS {
                preview.push_str("...");
            }
            debug!(status, body = %preview, "Cloud responded with an error status");
            Some(preview)
        };

        CloudResponse { ok, status, data, error }
    }
}
