//! End-to-end scenarios over a live hub instance.
//!
//! Each test boots its own hub (in-memory store, ephemeral port) and,
//! where the flow reaches the cloud, its own stub push endpoint.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use beacon_core::{ConfigStore, HubConfig, OutboxStatus, User};
use beacon_db::{Database, DbConfig};
use beacon_hub::{auth::hash_pin, build_state, routes::build_router, state::SharedState};

// =============================================================================
// Stub cloud (push side only)
// =============================================================================

#[derive(Clone)]
struct StubCloud {
    status: Arc<Mutex<u16>>,
    hits: Arc<Mutex<usize>>,
}

impl StubCloud {
    fn set_status(&self, status: u16) {
        *self.status.lock().unwrap() = status;
    }
}

async fn stub_push(
    State(stub): State<StubCloud>,
    Path(_endpoint): Path<String>,
    Json(_body): Json<Value>,
) -> impl IntoResponse {
    *stub.hits.lock().unwrap() += 1;
    let status = *stub.status.lock().unwrap();
    (StatusCode::from_u16(status).unwrap(), Json(json!({})))
}

async fn spawn_stub_cloud() -> (SocketAddr, StubCloud) {
    let stub = StubCloud {
        status: Arc::new(Mutex::new(201)),
        hits: Arc::new(Mutex::new(0)),
    };
    let app = Router::new()
        .route("/api/hub/push/{endpoint}", post(stub_push))
        .with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (addr, stub)
}

// =============================================================================
// Hub harness
// =============================================================================

struct Hub {
    base: String,
    state: SharedState,
    client: reqwest::Client,
}

impl Hub {
    async fn post(&self, path: &str, session: Option<&str>, body: Value) -> reqwest::Response {
        let mut request = self.client.post(format!("{}{}", self.base, path)).json(&body);
        if let Some(session_id) = session {
            request = request.header("x-session-id", session_id);
        }
        request.send().await.unwrap()
    }

    async fn get(&self, path: &str, session: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(format!("{}{}", self.base, path));
        if let Some(session_id) = session {
            request = request.header("x-session-id", session_id);
        }
        request.send().await.unwrap()
    }

    async fn login(&self, pin: &str) -> String {
        let response = self
            .post("/api/auth/pin-login", None, json!({ "pin": pin }))
            .await;
        assert_eq!(response.status(), 200, "login should succeed");
        let body: Value = response.json().await.unwrap();
        body["sessionId"].as_str().unwrap().to_string()
    }

    /// Drains the outbox until the given row reaches a terminal state.
    async fn drain_until_terminal(&self, session: &str, outbox_id: i64) -> beacon_core::OutboxItem {
        for _ in 0..20 {
            let _ = self.post("/api/sync/push", Some(session), json!({})).await;
            let row = self.state.db.outbox().get(outbox_id).await.unwrap().unwrap();
            if matches!(row.status, OutboxStatus::Synced | OutboxStatus::DeadLetter) {
                return row;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("outbox row {outbox_id} never reached a terminal state");
    }
}

async fn seed_user(db: &Database, id: &str, pin: &str) {
    db.users()
        .insert(&User {
            id: id.to_string(),
            tenant_id: Some("t1".to_string()),
            name: format!("Staff {id}"),
            role: Some("cashier".to_string()),
            pin_hash: Some(hash_pin(pin).unwrap()),
            permissions: Some(r#"["sell","refund"]"#.to_string()),
            max_discount: Some(0.2),
            is_active: true,
            updated_at: Some(chrono::Utc::now()),
        })
        .await
        .unwrap();
}

async fn spawn_hub(cloud: Option<SocketAddr>) -> Hub {
    let mut config = HubConfig::default();
    if let Some(addr) = cloud {
        config.cloud_base_url = Some(format!("http://{addr}"));
        config.cloud_api_key = Some("test-key".to_string());
        config.tenant_id = Some("t1".to_string());
        config.location_id = Some("loc1".to_string());
    }

    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    seed_user(&db, "u1", "1234").await;

    let state = build_state(db, ConfigStore::new(config, None));
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .ok();
    });

    Hub {
        base: format!("http://{addr}"),
        state,
        client: reqwest::Client::new(),
    }
}

fn sale_body() -> Value {
    json!({
        "total": 10.0,
        "items": [{ "productId": "p1", "quantity": 1, "unitPrice": 10.0 }],
        "payments": [{ "method": "CASH", "amount": 10.0 }]
    })
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn sale_create_then_push_then_ack() {
    let (cloud_addr, _stub) = spawn_stub_cloud().await;
    let hub = spawn_hub(Some(cloud_addr)).await;
    let session = hub.login("1234").await;

    let response = hub.post("/api/sales", Some(&session), sale_body()).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    let sale_id = body["id"].as_str().unwrap().to_string();
    let receipt = body["receiptNumber"].as_str().unwrap();
    assert!(receipt.ends_with("-0001"), "first receipt of the day: {receipt}");
    assert_eq!(body["status"], json!("COMPLETED"));

    // Store contains the sale, its item, its payment, and exactly one
    // PENDING outbox row with sale priority.
    let db = &hub.state.db;
    assert_eq!(db.sales().get_items(&sale_id).await.unwrap().len(), 1);
    assert_eq!(db.sales().get_payments(&sale_id).await.unwrap().len(), 1);

    let rows = db.outbox().for_entity("sale", &sale_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].action, "create");
    assert_eq!(rows[0].priority, 10);

    // Stubbed cloud answers 201; the row terminates SYNCED and the sale
    // mirror follows.
    let row = hub.drain_until_terminal(&session, rows[0].id).await;
    assert_eq!(row.status, OutboxStatus::Synced);

    let sale = db.sales().get(&sale_id).await.unwrap().unwrap();
    assert_eq!(sale.sync_status, beacon_core::SyncFlag::Synced);
}

#[tokio::test]
async fn duplicate_push_409_terminates_synced() {
    let (cloud_addr, stub) = spawn_stub_cloud().await;
    // The cloud already has this sale (e.g. a previous delivery whose ack
    // was lost) and reports an idempotent duplicate.
    stub.set_status(409);

    let hub = spawn_hub(Some(cloud_addr)).await;
    let session = hub.login("1234").await;

    let response = hub.post("/api/sales", Some(&session), sale_body()).await;
    let body: Value = response.json().await.unwrap();
    let sale_id = body["id"].as_str().unwrap().to_string();

    let rows = hub.state.db.outbox().for_entity("sale", &sale_id).await.unwrap();
    let row = hub.drain_until_terminal(&session, rows[0].id).await;
    assert_eq!(row.status, OutboxStatus::Synced);
    assert_eq!(row.error.as_deref(), Some("duplicate"));
}

#[tokio::test]
async fn pin_rate_limit_returns_429() {
    let hub = spawn_hub(None).await;

    for _ in 0..10 {
        let response = hub
            .post("/api/auth/pin-login", None, json!({ "pin": "9999" }))
            .await;
        assert_eq!(response.status(), 401);
    }

    // The eleventh attempt is limited even with the correct PIN.
    let response = hub
        .post("/api/auth/pin-login", None, json!({ "pin": "1234" }))
        .await;
    assert_eq!(response.status(), 429);
}

#[tokio::test]
async fn malformed_pin_is_rejected() {
    let hub = spawn_hub(None).await;
    let response = hub
        .post("/api/auth/pin-login", None, json!({ "pin": "99" }))
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn protected_routes_require_session() {
    let hub = spawn_hub(None).await;

    let response = hub.post("/api/sales", None, sale_body()).await;
    assert_eq!(response.status(), 401);

    let response = hub
        .post("/api/sales", Some("not-a-session"), sale_body())
        .await;
    assert_eq!(response.status(), 401);

    // Public routes stay open.
    assert_eq!(hub.get("/health", None).await.status(), 200);
}

#[tokio::test]
async fn logout_invalidates_session() {
    let hub = spawn_hub(None).await;
    let session = hub.login("1234").await;

    assert_eq!(
        hub.post("/api/auth/logout", Some(&session), json!({})).await.status(),
        200
    );
    assert_eq!(
        hub.post("/api/sales", Some(&session), sale_body()).await.status(),
        401
    );
}

#[tokio::test]
async fn kitchen_order_bump_chain() {
    let hub = spawn_hub(None).await;
    let session = hub.login("1234").await;

    let response = hub
        .post(
            "/api/kitchen-orders",
            Some(&session),
            json!({
                "tableId": "tbl-4",
                "items": [{ "name": "Margherita", "quantity": 1 }]
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let order_id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["status"], json!("PENDING"));

    for expected in ["PREPARING", "READY", "COMPLETED"] {
        let response = hub
            .post(
                &format!("/api/kitchen-orders/{order_id}/bump"),
                Some(&session),
                json!({}),
            )
            .await;
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["status"], json!(expected));
    }

    // Fourth bump: the chain is exhausted.
    let response = hub
        .post(
            &format!("/api/kitchen-orders/{order_id}/bump"),
            Some(&session),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], json!(false));

    // Timestamps and outbox trail: one create + three status rows.
    let order = hub.state.db.kitchen().get(&order_id).await.unwrap().unwrap();
    assert!(order.fired_at.is_some());
    assert!(order.completed_at.is_some());

    let rows = hub
        .state
        .db
        .outbox()
        .for_entity("kitchen_order", &order_id)
        .await
        .unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].action, "create");
    assert!(rows[1..].iter().all(|r| r.action == "status"));
}

#[tokio::test]
async fn void_sale_conflicts_on_second_attempt() {
    let hub = spawn_hub(None).await;
    let session = hub.login("1234").await;

    let response = hub.post("/api/sales", Some(&session), sale_body()).await;
    let body: Value = response.json().await.unwrap();
    let sale_id = body["id"].as_str().unwrap().to_string();

    let response = hub
        .post(
            &format!("/api/sales/{sale_id}/void"),
            Some(&session),
            json!({ "reason": "test" }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = hub
        .post(&format!("/api/sales/{sale_id}/void"), Some(&session), json!({}))
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("already voided"));
}

#[tokio::test]
async fn dead_letter_and_administrative_retry() {
    let (cloud_addr, stub) = spawn_stub_cloud().await;
    stub.set_status(500);
    let hub = spawn_hub(Some(cloud_addr)).await;
    let session = hub.login("1234").await;

    let response = hub.post("/api/sales", Some(&session), sale_body()).await;
    let body: Value = response.json().await.unwrap();
    let sale_id = body["id"].as_str().unwrap().to_string();

    let rows = hub.state.db.outbox().for_entity("sale", &sale_id).await.unwrap();
    let row = hub.drain_until_terminal(&session, rows[0].id).await;
    assert_eq!(row.status, OutboxStatus::DeadLetter);
    assert_eq!(row.attempts, row.max_attempts);

    // Administrative retry flips it back to PENDING with zero attempts.
    let response = hub
        .post(
            "/api/sync/retry-dead-letters",
            Some(&session),
            json!({ "entityType": "sale" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["revived"], json!(1));

    let row = hub.state.db.outbox().get(row.id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Pending);
    assert_eq!(row.attempts, 0);

    // Cloud recovers; the revived row eventually syncs.
    stub.set_status(201);
    let row = hub.drain_until_terminal(&session, row.id).await;
    assert_eq!(row.status, OutboxStatus::Synced);
}

#[tokio::test]
async fn receipt_numbers_increment_within_a_day() {
    let hub = spawn_hub(None).await;
    let session = hub.login("1234").await;

    let mut receipts = Vec::new();
    for _ in 0..3 {
        let response = hub.post("/api/sales", Some(&session), sale_body()).await;
        let body: Value = response.json().await.unwrap();
        receipts.push(body["receiptNumber"].as_str().unwrap().to_string());
    }

    assert!(receipts[0].ends_with("-0001"));
    assert!(receipts[1].ends_with("-0002"));
    assert!(receipts[2].ends_with("-0003"));
}

#[tokio::test]
async fn diagnostics_reports_store_shape() {
    let hub = spawn_hub(None).await;
    let session = hub.login("1234").await;

    hub.post("/api/sales", Some(&session), sale_body()).await;

    let response = hub.get("/api/diagnostics", Some(&session)).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["tables"]["sales"], json!(1));
    assert_eq!(body["tables"]["users"], json!(1));
    assert!(body["dbSizeBytes"].as_i64().unwrap() > 0);
    assert!(body["outbox"]["depth"].as_i64().unwrap() >= 1);
}

#[tokio::test]
async fn pairing_configures_cloud_live() {
    // Pin the config file to a temp location so the update persists there.
    let dir = std::env::temp_dir().join(format!("beacon-hub-test-{}", beacon_core::new_id()));
    std::fs::create_dir_all(&dir).unwrap();
    let config_path = dir.join("hub-config.json");

    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    seed_user(&db, "u1", "1234").await;
    let state = build_state(
        db,
        ConfigStore::new(HubConfig::default(), Some(config_path.clone())),
    );
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .ok();
    });
    let client = reqwest::Client::new();

    assert!(!state.cloud.is_configured());

    let response = client
        .post(format!("http://{addr}/api/admin/pairing"))
        .json(&json!({
            "cloudBaseUrl": "https://cloud.example.com",
            "apiKey": "key-123",
            "tenantId": "t1",
            "locationId": "loc1"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Takes effect live and persisted atomically.
    assert!(state.cloud.is_configured());
    let saved = HubConfig::load(Some(config_path)).unwrap();
    assert!(saved.is_configured());
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn sync_status_lists_outbox_stats() {
    let hub = spawn_hub(None).await;
    let session = hub.login("1234").await;

    hub.post("/api/sales", Some(&session), sale_body()).await;

    let response = hub.get("/api/sync/status", Some(&session)).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["configured"], json!(false));
    assert_eq!(body["outbox"]["pending"], json!(1));
}

#[tokio::test]
async fn drawer_open_close_conflicts() {
    let hub = spawn_hub(None).await;
    let session = hub.login("1234").await;

    let response = hub
        .post(
            "/api/cash-drawers/open",
            Some(&session),
            json!({ "terminalId": "t1", "openingAmount": 100.0 }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let drawer_id = body["id"].as_str().unwrap().to_string();

    // A second open on the same terminal is a conflict.
    let response = hub
        .post(
            "/api/cash-drawers/open",
            Some(&session),
            json!({ "terminalId": "t1", "openingAmount": 50.0 }),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = hub
        .post(
            &format!("/api/cash-drawers/{drawer_id}/close"),
            Some(&session),
            json!({ "closingAmount": 180.0 }),
        )
        .await;
    assert_eq!(response.status(), 200);

    // Closing a closed drawer is a conflict.
    let response = hub
        .post(
            &format!("/api/cash-drawers/{drawer_id}/close"),
            Some(&session),
            json!({ "closingAmount": 180.0 }),
        )
        .await;
    assert_eq!(response.status(), 400);
}
