//! # Pull Engine
//!
//! Periodic worker that replicates reference entities from the cloud in
//! dependency order.
//!
//! ## One Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for each entity in PULL_PLAN (same order every cycle):                 │
//! │                                                                         │
//! │    1. sync_state → SYNCING (row created lazily on first pull)          │
//! │    2. GET /api/hub/sync/{entity}?sinceVersion={last_synced_at}         │
//! │         404          → record zero pulled, next entity (not an error)  │
//! │         other non-2xx → sync_state ERROR, next entity (fault isolated) │
//! │    3. items from {items:[…]} or a bare array                           │
//! │    4. transform: renames + camelCase→snake_case, keep known columns    │
//! │    5. one transaction: upsert (or full replace) + companions +         │
//! │       deletedIds cascade; per-row failures logged and skipped          │
//! │    6. sync_state → SUCCESS, last_synced_at = now, record_count         │
//! │                                                                         │
//! │  A cycle already in flight drops the tick (single-flight).             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use beacon_db::Database;
use sqlx::SqliteConnection;

use crate::cloud::CloudClient;
use crate::error::{SyncError, SyncResult};
use crate::plan::{EntityPlan, WriteMode, PULL_PLAN};
use crate::transform::transform_item;

/// Default cycle interval.
pub const DEFAULT_PULL_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one entity within a cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPullResult {
    pub entity_type: String,
    pub pulled: i64,
    pub skipped_rows: usize,
    pub deleted: u64,
    pub error: Option<String>,
}

/// Outcome of one full cycle.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullSummary {
    pub total_pulled: i64,
    pub entities: Vec<EntityPullResult>,
}

/// The reference replicator. One instance per hub.
pub struct PullEngine {
    db: Database,
    cloud: CloudClient,
    interval: Duration,
    syncing: AtomicBool,
}

/// Handle held by the HTTP server: manual cycles and shutdown.
#[derive(Clone)]
pub struct PullHandle {
    engine: Arc<PullEngine>,
    shutdown_tx: mpsc::Sender<()>,
}

impl PullHandle {
    /// Runs one cycle immediately (the manual pull route). Returns `None`
    /// when a cycle was already in flight.
    pub async fn run_cycle_now(&self) -> SyncResult<Option<PullSummary>> {
        self.engine.run_cycle().await
    }

    pub async fn stop(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelClosed("pull shutdown".into()))
    }
}

impl PullEngine {
    pub fn new(db: Database, cloud: CloudClient) -> Self {
        PullEngine {
            db,
            cloud,
            interval: DEFAULT_PULL_INTERVAL,
            syncing: AtomicBool::new(false),
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawns the periodic cycle task and returns its handle.
    pub fn start(self) -> PullHandle {
        let engine = Arc::new(self);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let handle = PullHandle {
            engine: engine.clone(),
            shutdown_tx,
        };

        tokio::spawn(async move {
            info!(interval_secs = engine.interval.as_secs(), "Pull engine starting");
            let mut interval = tokio::time::interval(engine.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = engine.run_cycle().await {
                            error!(error = %e, "Pull cycle failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Pull engine stopping");
                        break;
                    }
                }
            }
        });

        handle
    }

    /// One cycle over the whole plan. Returns `None` when another cycle
    /// holds the single-flight guard or the cloud is not configured.
    pub async fn run_cycle(&self) -> SyncResult<Option<PullSummary>> {
        if !self.cloud.is_configured() {
            debug!("Cloud not configured; skipping pull cycle");
            return Ok(None);
        }
        if self.syncing.swap(true, Ordering::SeqCst) {
            debug!("Pull cycle already in flight; dropping tick");
            return Ok(None);
        }

        let result = self.cycle().await;
        self.syncing.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    async fn cycle(&self) -> SyncResult<PullSummary> {
        let mut summary = PullSummary::default();

        for plan in PULL_PLAN {
            // The plan is fault-isolated: an entity failing never stops
            // the entities after it.
            let result = match self.pull_entity(plan).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(entity = plan.entity_type, error = %e, "Entity pull failed");
                    self.db.sync_state().mark_error(plan.entity_type).await.ok();
                    EntityPullResult {
                        entity_type: plan.entity_type.to_string(),
                        pulled: 0,
                        skipped_rows: 0,
                        deleted: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            summary.total_pulled += result.pulled;
            summary.entities.push(result);
        }

        info!(total = summary.total_pulled, "Pull cycle complete");
        Ok(summary)
    }

    async fn pull_entity(&self, plan: &EntityPlan) -> SyncResult<EntityPullResult> {
        let sync_state = self.db.sync_state();
        sync_state.mark_syncing(plan.entity_type).await?;

        let since = sync_state
            .get(plan.entity_type)
            .await?
            .and_then(|s| s.last_synced_at)
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true));

        let response = self
            .cloud
            .get_sync(plan.entity_type, since.as_deref())
            .await;

        if response.status == 404 {
            // Endpoint not deployed on this cloud yet; not an error.
            debug!(entity = plan.entity_type, "Sync endpoint unavailable (404)");
            sync_state.mark_skipped(plan.entity_type).await?;
            return Ok(EntityPullResult {
                entity_type: plan.entity_type.to_string(),
                pulled: 0,
                skipped_rows: 0,
                deleted: 0,
                error: None,
            });
        }

        if !response.ok {
            sync_state.mark_error(plan.entity_type).await?;
            return Ok(EntityPullResult {
                entity_type: plan.entity_type.to_string(),
                pulled: 0,
                skipped_rows: 0,
                deleted: 0,
                error: Some(format!(
                    "HTTP {}: {}",
                    response.status,
                    response.error.unwrap_or_default()
                )),
            });
        }

        let data = response.data.unwrap_or(Value::Null);
        let (items, deleted_ids, next_cursor) = extract_items(&data, plan.has_deleted_ids);

        let mut rows = Vec::with_capacity(items.len());
        let mut skipped_rows = 0usize;
        for item in &items {
            match transform_item(item, plan.columns, plan.renames) {
                Some(row) => rows.push(row),
                None => {
                    warn!(entity = plan.entity_type, "Skipping non-object item");
                    skipped_rows += 1;
                }
            }
        }

        let synced_at = Utc::now();
        let reference = self.db.reference();

        let mut tx = self.db.pool().begin().await.map_err(beacon_db::DbError::from)?;

        let outcome = match plan.mode {
            WriteMode::Upsert => {
                reference
                    .upsert_rows(&mut tx, plan.table, plan.columns, &rows)
                    .await?
            }
            WriteMode::Replace => {
                reference
                    .replace_rows(&mut tx, plan.table, plan.columns, &rows)
                    .await?
            }
        };
        skipped_rows += outcome.skipped;

        if plan.entity_type == "products" {
            self.apply_product_companions(&mut tx, &items).await;
        }

        let mut deleted = 0;
        if !deleted_ids.is_empty() {
            deleted = reference
                .delete_ids(&mut tx, plan.table, &deleted_ids)
                .await?;
        }

        tx.commit().await.map_err(beacon_db::DbError::from)?;

        sync_state
            .mark_success(
                plan.entity_type,
                items.len() as i64,
                synced_at,
                next_cursor.as_deref(),
            )
            .await?;

        debug!(
            entity = plan.entity_type,
            pulled = items.len(),
            skipped = skipped_rows,
            deleted,
            "Entity pull complete"
        );

        Ok(EntityPullResult {
            entity_type: plan.entity_type.to_string(),
            pulled: items.len() as i64,
            skipped_rows,
            deleted,
            error: None,
        })
    }

    /// A product payload may embed per-order-type prices and a pizza
    /// configuration; both land in companion tables on the same
    /// transaction as the product batch. Companion failures are per-row
    /// data errors: logged, never fatal.
    async fn apply_product_companions(&self, conn: &mut SqliteConnection, items: &[Value]) {
        for item in items {
            let Some(product_id) = item.get("id").and_then(Value::as_str) else {
                continue;
            };

            if let Some(prices) = item.get("orderTypePrices").and_then(Value::as_array) {
                // The cloud sends the complete set each time; replace per
                // product.
                if let Err(e) =
                    sqlx::query("DELETE FROM product_order_type_prices WHERE product_id = ?1")
                        .bind(product_id)
                        .execute(&mut *conn)
                        .await
                {
                    warn!(product_id, error = %e, "Failed to clear order-type prices");
                    continue;
                }

                for price in prices {
                    let Some(order_type) = price.get("orderType").and_then(Value::as_str) else {
                        warn!(product_id, "Order-type price without orderType");
                        continue;
                    };
                    let id = price
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("{product_id}:{order_type}"));
                    let amount = price.get("price").and_then(Value::as_f64);

                    if let Err(e) = sqlx::query(
                        "INSERT INTO product_order_type_prices (id, product_id, order_type, price) \
                         VALUES (?1, ?2, ?3, ?4)",
                    )
                    .bind(&id)
                    .bind(product_id)
                    .bind(order_type)
                    .bind(amount)
                    .execute(&mut *conn)
                    .await
                    {
                        warn!(product_id, order_type, error = %e, "Skipping order-type price");
                    }
                }
            }

            if let Some(config) = item.get("pizzaProductConfig").and_then(Value::as_object) {
                let allowed_sizes = config.get("allowedSizes").map(Value::to_string);
                let allowed_crusts = config.get("allowedCrusts").map(Value::to_string);
                let updated_at = item.get("updatedAt").and_then(Value::as_str);

                if let Err(e) = sqlx::query(
                    r#"
                    INSERT INTO product_pizza_configs (product_id, allowed_sizes, allowed_crusts, updated_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT (product_id) DO UPDATE SET
                        allowed_sizes = excluded.allowed_sizes,
                        allowed_crusts = excluded.allowed_crusts,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(product_id)
                .bind(allowed_sizes)
                .bind(allowed_crusts)
                .bind(updated_at)
                .execute(&mut *conn)
                .await
                {
                    warn!(product_id, error = %e, "Skipping pizza product config");
                }
            }
        }
    }
}

/// Pulls apart a sync response body: `{items:[…], deletedIds?, nextCursor?}`
/// or a bare array.
fn extract_items(data: &Value, want_deleted: bool) -> (Vec<Value>, Vec<String>, Option<String>) {
    match data {
        Value::Array(items) => (items.clone(), Vec::new(), None),
        Value::Object(object) => {
            let items = object
                .get("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let deleted = if want_deleted {
                object
                    .get("deletedIds")
                    .and_then(Value::as_array)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default()
            } else {
                Vec::new()
            };
            let cursor = object
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            (items, deleted, cursor)
        }
        _ => (Vec::new(), Vec::new(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_items_bare_array() {
        let (items, deleted, cursor) = extract_items(&json!([{"id": "a"}, {"id": "b"}]), true);
        assert_eq!(items.len(), 2);
        assert!(deleted.is_empty());
        assert!(cursor.is_none());
    }

    #[test]
    fn test_extract_items_envelope() {
        let data = json!({
            "items": [{"id": "a"}],
            "deletedIds": ["x", "y"],
            "nextCursor": "abc",
            "hasMore": false
        });
        let (items, deleted, cursor) = extract_items(&data, true);
        assert_eq!(items.len(), 1);
        assert_eq!(deleted, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn test_extract_items_ignores_deleted_when_not_wanted() {
        let data = json!({ "items": [], "deletedIds": ["x"] });
        let (_, deleted, _) = extract_items(&data, false);
        assert!(deleted.is_empty());
    }
}
