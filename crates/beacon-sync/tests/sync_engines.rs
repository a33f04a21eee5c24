//! Engine tests against a stub cloud.
//!
//! The stub is a minimal axum server bound to an ephemeral port; tests
//! steer it per entity (response bodies, forced status codes) and inspect
//! what the engines sent.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use beacon_core::{ConfigStore, HubConfig, OutboxStatus};
use beacon_db::repository::NewOutboxItem;
use beacon_db::{Database, DbConfig};
use beacon_sync::{CloudClient, PullEngine, PushEngine};

// =============================================================================
// Stub cloud
// =============================================================================

#[derive(Clone, Default)]
struct StubCloud {
    /// Push endpoint segment → status code to return (default 201).
    push_status: Arc<Mutex<HashMap<String, u16>>>,
    /// Every push received: (endpoint, envelope body).
    push_hits: Arc<Mutex<Vec<(String, Value)>>>,
    /// Sync entity → response body. Absent entities return 404.
    sync_data: Arc<Mutex<HashMap<String, Value>>>,
    /// Sync entity → forced error status.
    sync_errors: Arc<Mutex<HashMap<String, u16>>>,
    /// Sync entity → the `sinceVersion` values observed, in order.
    since_seen: Arc<Mutex<HashMap<String, Vec<Option<String>>>>>,
}

impl StubCloud {
    fn set_push_status(&self, endpoint: &str, status: u16) {
        self.push_status.lock().unwrap().insert(endpoint.to_string(), status);
    }

    fn set_sync_data(&self, entity: &str, body: Value) {
        self.sync_data.lock().unwrap().insert(entity.to_string(), body);
    }

    fn set_sync_error(&self, entity: &str, status: u16) {
        self.sync_errors.lock().unwrap().insert(entity.to_string(), status);
    }

    fn push_count(&self, endpoint: &str) -> usize {
        self.push_hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .count()
    }

    fn since_values(&self, entity: &str) -> Vec<Option<String>> {
        self.since_seen
            .lock()
            .unwrap()
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }
}

async fn push_handler(
    State(stub): State<StubCloud>,
    Path(endpoint): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let status = stub
        .push_status
        .lock()
        .unwrap()
        .get(&endpoint)
        .copied()
        .unwrap_or(201);
    stub.push_hits.lock().unwrap().push((endpoint, body));
    (
        StatusCode::from_u16(status).unwrap(),
        Json(json!({ "ok": status < 300 })),
    )
}

async fn sync_handler(
    State(stub): State<StubCloud>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    stub.since_seen
        .lock()
        .unwrap()
        .entry(entity.clone())
        .or_default()
        .push(params.get("sinceVersion").cloned());

    if let Some(status) = stub.sync_errors.lock().unwrap().get(&entity) {
        return (
            StatusCode::from_u16(*status).unwrap(),
            Json(json!({ "error": "stubbed failure" })),
        );
    }

    match stub.sync_data.lock().unwrap().get(&entity) {
        Some(body) => (StatusCode::OK, Json(body.clone())),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "no such entity" }))),
    }
}

async fn spawn_stub() -> (SocketAddr, StubCloud) {
    let stub = StubCloud::default();
    let app = Router::new()
        .route("/api/hub/push/{endpoint}", post(push_handler))
        .route("/api/hub/sync/{entity}", get(sync_handler))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (addr, stub)
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    db: Database,
    cloud: CloudClient,
    stub: StubCloud,
}

async fn harness() -> Harness {
    let (addr, stub) = spawn_stub().await;
    let mut config = HubConfig::default();
    config.cloud_base_url = Some(format!("http://{addr}"));
    config.cloud_api_key = Some("test-key".into());
    config.tenant_id = Some("tenant-1".into());
    config.location_id = Some("loc-1".into());

    let cloud = CloudClient::new(ConfigStore::new(config, None));
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    Harness { db, cloud, stub }
}

async fn enqueue(db: &Database, item: NewOutboxItem) -> i64 {
    let mut tx = db.pool().begin().await.unwrap();
    let id = db.outbox().enqueue(&mut tx, item).await.unwrap();
    tx.commit().await.unwrap();
    id
}

// =============================================================================
// Push engine
// =============================================================================

#[tokio::test]
async fn push_success_marks_synced() {
    let h = harness().await;
    let id = enqueue(
        &h.db,
        NewOutboxItem::new("sale", "s1", "create", &json!({ "total": 10.0 })),
    )
    .await;

    let engine = PushEngine::new(h.db.clone(), h.cloud.clone());
    let summary = engine.process_outbox().await.unwrap().unwrap();
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.synced, 1);

    let row = h.db.outbox().get(id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Synced);
    assert!(row.processed_at.is_some());

    // The cloud received the full envelope.
    let hits = h.stub.push_hits.lock().unwrap().clone();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, "sales");
    assert_eq!(hits[0].1["entityType"], json!("sale"));
    assert_eq!(hits[0].1["entityId"], json!("s1"));
    assert_eq!(hits[0].1["action"], json!("create"));
    assert_eq!(hits[0].1["payload"]["total"], json!(10.0));
}

#[tokio::test]
async fn push_409_is_idempotent_success() {
    let h = harness().await;
    h.stub.set_push_status("sales", 409);
    let id = enqueue(
        &h.db,
        NewOutboxItem::new("sale", "s1", "create", &json!({ "total": 10.0 })),
    )
    .await;

    let engine = PushEngine::new(h.db.clone(), h.cloud.clone());
    let summary = engine.process_outbox().await.unwrap().unwrap();
    assert_eq!(summary.synced, 1);

    let row = h.db.outbox().get(id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Synced);
    assert_eq!(row.error.as_deref(), Some("duplicate"));
    assert_eq!(row.attempts, 1);
}

#[tokio::test]
async fn push_4xx_dead_letters_immediately() {
    let h = harness().await;
    h.stub.set_push_status("sales", 422);
    let id = enqueue(
        &h.db,
        NewOutboxItem::new("sale", "s1", "create", &json!({ "total": 10.0 })),
    )
    .await;

    let engine = PushEngine::new(h.db.clone(), h.cloud.clone());
    engine.process_outbox().await.unwrap().unwrap();

    let row = h.db.outbox().get(id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::DeadLetter);
    assert_eq!(row.attempts, 1);
    assert!(row.error.unwrap().contains("422"));
}

#[tokio::test]
async fn push_500_retries_then_dead_letters_at_max_attempts() {
    let h = harness().await;
    h.stub.set_push_status("sales", 500);
    let id = enqueue(
        &h.db,
        NewOutboxItem::new("sale", "s1", "create", &json!({ "total": 10.0 })).max_attempts(3),
    )
    .await;

    let engine = PushEngine::new(h.db.clone(), h.cloud.clone());

    for expected_attempts in 1..=2 {
        engine.process_outbox().await.unwrap().unwrap();
        let row = h.db.outbox().get(id).await.unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Pending);
        assert_eq!(row.attempts, expected_attempts);
    }

    // Third pass consumes the final attempt.
    engine.process_outbox().await.unwrap().unwrap();
    let row = h.db.outbox().get(id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::DeadLetter);
    assert_eq!(row.attempts, 3);
    assert!(row.error.unwrap().contains("max attempts"));

    // Exhausted rows are never claimed again.
    engine.process_outbox().await.unwrap().unwrap();
    assert_eq!(h.stub.push_count("sales"), 3);
}

#[tokio::test]
async fn push_unknown_entity_type_dead_letters_without_http() {
    let h = harness().await;
    let id = enqueue(
        &h.db,
        NewOutboxItem::new("mystery", "m1", "create", &json!({})),
    )
    .await;

    let engine = PushEngine::new(h.db.clone(), h.cloud.clone());
    let summary = engine.process_outbox().await.unwrap().unwrap();
    assert_eq!(summary.dead_lettered, 1);

    let row = h.db.outbox().get(id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::DeadLetter);
    assert!(row.error.unwrap().contains("unknown entity type"));
    assert!(h.stub.push_hits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn push_invalid_payload_dead_letters() {
    let h = harness().await;
    let mut item = NewOutboxItem::new("sale", "s1", "create", &json!({}));
    item.payload = "{definitely not json".to_string();
    let id = enqueue(&h.db, item).await;

    let engine = PushEngine::new(h.db.clone(), h.cloud.clone());
    engine.process_outbox().await.unwrap().unwrap();

    let row = h.db.outbox().get(id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::DeadLetter);
    assert!(row.error.unwrap().contains("invalid payload"));
}

#[tokio::test]
async fn push_skips_when_not_configured() {
    let (_, _stub) = spawn_stub().await;
    let cloud = CloudClient::new(ConfigStore::new(HubConfig::default(), None));
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let id = enqueue(
        &db,
        NewOutboxItem::new("sale", "s1", "create", &json!({})),
    )
    .await;

    let engine = PushEngine::new(db.clone(), cloud);
    assert!(engine.process_outbox().await.unwrap().is_none());

    let row = db.outbox().get(id).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Pending);
    assert_eq!(row.attempts, 0);
}

#[tokio::test]
async fn push_item_failure_does_not_abort_batch() {
    let h = harness().await;
    enqueue(&h.db, NewOutboxItem::new("mystery", "m1", "create", &json!({}))).await;
    let good = enqueue(
        &h.db,
        NewOutboxItem::new("sale", "s1", "create", &json!({ "total": 5.0 })),
    )
    .await;

    let engine = PushEngine::new(h.db.clone(), h.cloud.clone());
    let summary = engine.process_outbox().await.unwrap().unwrap();
    assert_eq!(summary.claimed, 2);
    assert_eq!(summary.synced, 1);
    assert_eq!(summary.dead_lettered, 1);

    let row = h.db.outbox().get(good).await.unwrap().unwrap();
    assert_eq!(row.status, OutboxStatus::Synced);
}

// =============================================================================
// Pull engine
// =============================================================================

fn categories_body() -> Value {
    json!({ "items": [
        { "id": "c1", "name": "Pizza", "sortOrder": 1, "isActive": true },
        { "id": "c2", "name": "Drinks", "sortOrder": 2, "isActive": true },
        { "id": "c3", "name": "Sides", "sortOrder": 3, "isActive": true }
    ]})
}

fn products_body() -> Value {
    json!({ "items": [
        { "id": "p1", "categoryId": "c1", "name": "Margherita", "price": 10.0, "isActive": true },
        { "id": "p2", "categoryId": "c1", "name": "Pepperoni", "price": 12.0, "isActive": true },
        { "id": "p3", "categoryId": "c2", "name": "Cola", "price": 2.5, "isActive": true },
        { "id": "p4", "categoryId": "c2", "name": "Water", "price": 1.5, "isActive": true },
        { "id": "p5", "categoryId": "c3", "name": "Garlic Bread", "price": 4.0, "isActive": true }
    ]})
}

#[tokio::test]
async fn pull_cold_start_respects_dependencies() {
    let h = harness().await;
    h.stub.set_sync_data("categories", categories_body());
    h.stub.set_sync_data("products", products_body());

    let engine = PullEngine::new(h.db.clone(), h.cloud.clone());
    let summary = engine.run_cycle().await.unwrap().unwrap();
    assert_eq!(summary.total_pulled, 8);

    let categories = h.db.sync_state().get("categories").await.unwrap().unwrap();
    assert_eq!(categories.record_count, 3);
    let products = h.db.sync_state().get("products").await.unwrap().unwrap();
    assert_eq!(products.record_count, 5);

    // Foreign keys are on; every product resolved its category.
    let orphans: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM products p LEFT JOIN categories c ON p.category_id = c.id \
         WHERE c.id IS NULL",
    )
    .fetch_one(h.db.pool())
    .await
    .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn pull_delta_sends_previous_cursor() {
    let h = harness().await;
    h.stub.set_sync_data("categories", categories_body());
    h.stub.set_sync_data("products", products_body());

    let engine = PullEngine::new(h.db.clone(), h.cloud.clone());
    engine.run_cycle().await.unwrap().unwrap();

    // Cloud now has one changed product; delta response carries only it.
    h.stub.set_sync_data(
        "products",
        json!({ "items": [
            { "id": "p1", "categoryId": "c1", "name": "Margherita DOP", "price": 11.0, "isActive": true }
        ]}),
    );
    engine.run_cycle().await.unwrap().unwrap();

    let since = h.stub.since_values("products");
    assert_eq!(since.len(), 2);
    assert!(since[0].is_none(), "cold start has no cursor");
    assert!(since[1].is_some(), "second cycle passes sinceVersion");

    let name: String = sqlx::query_scalar("SELECT name FROM products WHERE id = 'p1'")
        .fetch_one(h.db.pool())
        .await
        .unwrap();
    assert_eq!(name, "Margherita DOP");

    // The other four rows were not rewritten.
    let untouched: String = sqlx::query_scalar("SELECT name FROM products WHERE id = 'p5'")
        .fetch_one(h.db.pool())
        .await
        .unwrap();
    assert_eq!(untouched, "Garlic Bread");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(h.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn pull_404_is_tolerated() {
    let h = harness().await;
    // Only categories exist; every other endpoint 404s.
    h.stub.set_sync_data("categories", categories_body());

    let engine = PullEngine::new(h.db.clone(), h.cloud.clone());
    let summary = engine.run_cycle().await.unwrap().unwrap();
    assert_eq!(summary.total_pulled, 3);
    assert!(summary.entities.iter().all(|e| e.error.is_none()));

    let products = h.db.sync_state().get("products").await.unwrap().unwrap();
    assert_eq!(products.status, beacon_core::SyncRunStatus::Success);
    assert_eq!(products.record_count, 0);
    assert!(products.last_synced_at.is_none(), "404 must not advance the cursor");
}

#[tokio::test]
async fn pull_fault_isolation() {
    let h = harness().await;
    h.stub.set_sync_data("categories", categories_body());
    h.stub.set_sync_data("products", products_body());
    h.stub.set_sync_error("products", 500);

    let engine = PullEngine::new(h.db.clone(), h.cloud.clone());
    let summary = engine.run_cycle().await.unwrap().unwrap();

    let categories = h.db.sync_state().get("categories").await.unwrap().unwrap();
    assert_eq!(categories.status, beacon_core::SyncRunStatus::Success);
    assert_eq!(categories.record_count, 3);

    let products = h.db.sync_state().get("products").await.unwrap().unwrap();
    assert_eq!(products.status, beacon_core::SyncRunStatus::Error);

    let failed: Vec<_> = summary
        .entities
        .iter()
        .filter(|e| e.error.is_some())
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].entity_type, "products");
}

#[tokio::test]
async fn pull_back_to_back_is_idempotent() {
    let h = harness().await;
    h.stub.set_sync_data("categories", categories_body());
    h.stub.set_sync_data("products", products_body());

    async fn snapshot(db: &Database) -> Vec<(String, Option<String>, Option<f64>)> {
        sqlx::query_as("SELECT id, name, price FROM products ORDER BY id")
            .fetch_all(db.pool())
            .await
            .unwrap()
    }

    let engine = PullEngine::new(h.db.clone(), h.cloud.clone());
    engine.run_cycle().await.unwrap().unwrap();

    let first = snapshot(&h.db).await;
    engine.run_cycle().await.unwrap().unwrap();
    let second = snapshot(&h.db).await;

    assert_eq!(first, second);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(h.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn pull_full_replace_handles_recycled_ids() {
    let h = harness().await;
    h.stub.set_sync_data(
        "pizza_cheese_prices",
        json!({ "items": [
            { "id": "x1", "pizzaSizeId": "small", "price": 1.0 },
            { "id": "x2", "sizeId": "large", "price": 2.0 }
        ]}),
    );

    let engine = PullEngine::new(h.db.clone(), h.cloud.clone());
    engine.run_cycle().await.unwrap().unwrap();

    // Same ids, different rows: the matrix is replaced wholesale.
    h.stub.set_sync_data(
        "pizza_cheese_prices",
        json!({ "items": [
            { "id": "x1", "sizeId": "medium", "price": 1.5 }
        ]}),
    );
    engine.run_cycle().await.unwrap().unwrap();

    let rows: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT id, size_id FROM pizza_cheese_prices ORDER BY id")
            .fetch_all(h.db.pool())
            .await
            .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1.as_deref(), Some("medium"));

    let state = h.db.sync_state().get("pizza_cheese_prices").await.unwrap().unwrap();
    assert_eq!(state.record_count, 1);
}

#[tokio::test]
async fn pull_extracts_product_companions() {
    let h = harness().await;
    h.stub.set_sync_data("categories", categories_body());
    h.stub.set_sync_data(
        "products",
        json!({ "items": [{
            "id": "p1",
            "categoryId": "c1",
            "name": "Margherita",
            "price": 10.0,
            "isPizza": true,
            "orderTypePrices": [
                { "orderType": "DELIVERY", "price": 12.0 },
                { "orderType": "DINE_IN", "price": 10.0 }
            ],
            "pizzaProductConfig": {
                "allowedSizes": ["small", "large"],
                "allowedCrusts": ["thin"]
            }
        }]}),
    );

    let engine = PullEngine::new(h.db.clone(), h.cloud.clone());
    engine.run_cycle().await.unwrap().unwrap();

    let price_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM product_order_type_prices WHERE product_id = 'p1'")
            .fetch_one(h.db.pool())
            .await
            .unwrap();
    assert_eq!(price_count, 2);

    let sizes: String =
        sqlx::query_scalar("SELECT allowed_sizes FROM product_pizza_configs WHERE product_id = 'p1'")
            .fetch_one(h.db.pool())
            .await
            .unwrap();
    assert!(sizes.contains("small"));

    // Companion extraction is idempotent across cycles.
    engine.run_cycle().await.unwrap().unwrap();
    let price_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM product_order_type_prices WHERE product_id = 'p1'")
            .fetch_one(h.db.pool())
            .await
            .unwrap();
    assert_eq!(price_count, 2);
}

#[tokio::test]
async fn pull_applies_deleted_ids() {
    let h = harness().await;
    h.stub.set_sync_data(
        "customers",
        json!({ "items": [
            { "id": "cu1", "name": "Ada" },
            { "id": "cu2", "name": "Grace" }
        ]}),
    );

    let engine = PullEngine::new(h.db.clone(), h.cloud.clone());
    engine.run_cycle().await.unwrap().unwrap();

    h.stub.set_sync_data(
        "customers",
        json!({ "items": [], "deletedIds": ["cu1"] }),
    );
    engine.run_cycle().await.unwrap().unwrap();

    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM customers")
        .fetch_all(h.db.pool())
        .await
        .unwrap();
    assert_eq!(names, vec!["Grace".to_string()]);
}

#[tokio::test]
async fn pull_bad_row_skipped_batch_continues() {
    let h = harness().await;
    h.stub.set_sync_data(
        "categories",
        json!({ "items": [
            { "id": "c1", "name": "Good" },
            "not an object",
            { "name": "missing id" },
            { "id": "c2", "name": "Also Good" }
        ]}),
    );

    let engine = PullEngine::new(h.db.clone(), h.cloud.clone());
    let summary = engine.run_cycle().await.unwrap().unwrap();

    let categories = summary
        .entities
        .iter()
        .find(|e| e.entity_type == "categories")
        .unwrap();
    assert_eq!(categories.skipped_rows, 2);
    assert!(categories.error.is_none());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(h.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 2);
}
