//! # Push Engine
//!
//! Periodic worker that drains the outbox to the cloud.
//!
//! ## Outcome Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  HTTP outcome           │  Outbox transition                            │
//! │  ───────────────────────┼────────────────────────────────────────────── │
//! │  2xx                    │  SYNCED                                       │
//! │  409 Conflict           │  SYNCED, note "duplicate" (already applied)   │
//! │  other 4xx              │  DEAD_LETTER (non-retriable)                  │
//! │  5xx / network failure  │  PENDING again; DEAD_LETTER once the claim    │
//! │                         │  consumed the final attempt                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Items are independent: one failure never aborts the rest of the batch.
//! The cloud treats a repeated `entityId + action` as idempotent (409 maps
//! to success), which is how at-least-once delivery becomes exactly-once
//! effect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use beacon_core::{OutboxItem, SyncFlag};
use beacon_db::Database;

use crate::cloud::{CloudClient, PushEnvelope};
use crate::error::{SyncError, SyncResult};

/// Default drain interval.
pub const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Default claim size per pass.
pub const DEFAULT_BATCH_SIZE: i64 = 20;

/// Maps an outbox entity type to its cloud push endpoint segment.
/// Unknown types dead-letter immediately; retrying cannot fix them.
fn endpoint_for(entity_type: &str) -> Option<&'static str> {
    match entity_type {
        "sale" => Some("sales"),
        "refund" => Some("refunds"),
        "kitchen_order" => Some("kitchen-orders"),
        "cash_drawer" => Some("cash-drawers"),
        "cash_drawer_transaction" => Some("cash-drawer-transactions"),
        "shift" => Some("shifts"),
        "shift_break" => Some("shift-breaks"),
        "guest_check" => Some("guest-checks"),
        "store_credit" => Some("store-credits"),
        "table_session" => Some("table-sessions"),
        "user" => Some("users"),
        _ => None,
    }
}

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSummary {
    pub claimed: usize,
    pub synced: usize,
    pub dead_lettered: usize,
    pub retried: usize,
}

/// The outbox drain worker. One instance per hub; `process_outbox` is
/// single-flight guarded so overlapping ticks collapse into one pass.
pub struct PushEngine {
    db: Database,
    cloud: CloudClient,
    interval: Duration,
    batch_size: i64,
    draining: AtomicBool,
}

/// Handle held by the HTTP server: manual drains and shutdown.
#[derive(Clone)]
pub struct PushHandle {
    engine: Arc<PushEngine>,
    shutdown_tx: mpsc::Sender<()>,
}

impl PushHandle {
    /// Runs one drain pass immediately (the manual push route).
    /// Returns `None` when a pass was already in flight.
    pub async fn drain_now(&self) -> SyncResult<Option<PushSummary>> {
        self.engine.process_outbox().await
    }

    /// Stops the periodic task. The current pass finishes first.
    pub async fn stop(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelClosed("push shutdown".into()))
    }
}

impl PushEngine {
    pub fn new(db: Database, cloud: CloudClient) -> Self {
        PushEngine {
            db,
            cloud,
            interval: DEFAULT_PUSH_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            draining: AtomicBool::new(false),
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Spawns the periodic drain task and returns its handle.
    pub fn start(self) -> PushHandle {
        let engine = Arc::new(self);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let handle = PushHandle {
            engine: engine.clone(),
            shutdown_tx,
        };

        tokio::spawn(async move {
            info!(interval_secs = engine.interval.as_secs(), "Push engine starting");
            let mut interval = tokio::time::interval(engine.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = engine.process_outbox().await {
                            error!(error = %e, "Outbox drain pass failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Push engine stopping");
                        break;
                    }
                }
            }
        });

        handle
    }

    /// One drain pass. Returns `None` when another pass holds the
    /// single-flight guard or the cloud is not configured.
    pub async fn process_outbox(&self) -> SyncResult<Option<PushSummary>> {
        if !self.cloud.is_configured() {
            debug!("Cloud not configured; skipping outbox drain");
            return Ok(None);
        }
        if self.draining.swap(true, Ordering::SeqCst) {
            debug!("Drain already in flight; dropping tick");
            return Ok(None);
        }

        let result = self.drain_batch().await;
        self.draining.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    async fn drain_batch(&self) -> SyncResult<PushSummary> {
        let outbox = self.db.outbox();
        let items = outbox.claim_batch(self.batch_size).await?;

        let mut summary = PushSummary {
            claimed: items.len(),
            ..Default::default()
        };
        if items.is_empty() {
            return Ok(summary);
        }

        info!(count = items.len(), "Draining outbox batch");

        for item in items {
            // Items are independent; a failed transition on one must not
            // stop the rest of the batch.
            if let Err(e) = self.push_item(&item, &mut summary).await {
                error!(id = item.id, error = %e, "Failed to process outbox item");
            }
        }

        debug!(
            synced = summary.synced,
            dead_lettered = summary.dead_lettered,
            retried = summary.retried,
            "Outbox batch complete"
        );
        Ok(summary)
    }

    async fn push_item(&self, item: &OutboxItem, summary: &mut PushSummary) -> SyncResult<()> {
        let outbox = self.db.outbox();
        let misc = self.db.misc();

        let Some(endpoint) = endpoint_for(&item.entity_type) else {
            warn!(id = item.id, entity_type = %item.entity_type, "Unknown entity type");
            outbox
                .mark_dead_letter(item.id, &format!("unknown entity type: {}", item.entity_type))
                .await?;
            summary.dead_lettered += 1;
            return Ok(());
        };

        let payload: serde_json::Value = match serde_json::from_str(&item.payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(id = item.id, error = %e, "Outbox payload is not valid JSON");
                outbox
                    .mark_dead_letter(item.id, &format!("invalid payload: {e}"))
                    .await?;
                misc.set_sync_flag(&item.entity_type, &item.entity_id, SyncFlag::DeadLetter)
                    .await?;
                summary.dead_lettered += 1;
                return Ok(());
            }
        };

        let envelope = PushEnvelope {
            entity_type: item.entity_type.clone(),
            entity_id: item.entity_id.clone(),
            action: item.action.clone(),
            payload,
            correlation_id: item.correlation_id.clone(),
        };

        let response = self.cloud.post_push(endpoint, &envelope).await;

        match response.status {
            _ if response.ok => {
                outbox.mark_synced(item.id, None).await?;
                misc.set_sync_flag(&item.entity_type, &item.entity_id, SyncFlag::Synced)
                    .await?;
                summary.synced += 1;
            }
            409 => {
                // The cloud already applied this entityId + action.
                debug!(id = item.id, "Cloud reported duplicate; treating as synced");
                outbox.mark_synced(item.id, Some("duplicate")).await?;
                misc.set_sync_flag(&item.entity_type, &item.entity_id, SyncFlag::Synced)
                    .await?;
                summary.synced += 1;
            }
            400..=499 => {
                let message = format!(
                    "cloud rejected with HTTP {}: {}",
                    response.status,
                    response.error.as_deref().unwrap_or("")
                );
                warn!(id = item.id, status = response.status, "Dead-lettering outbox item");
                outbox.mark_dead_letter(item.id, &message).await?;
                misc.set_sync_flag(&item.entity_type, &item.entity_id, SyncFlag::DeadLetter)
                    .await?;
                summary.dead_lettered += 1;
            }
            _ => {
                // 5xx or no response at all. The claim already consumed an
                // attempt; when it was the last one, this row is done.
                let message = response
                    .error
                    .unwrap_or_else(|| format!("HTTP {}", response.status));
                if item.attempts >= item.max_attempts {
                    warn!(
                        id = item.id,
                        attempts = item.attempts,
                        "Max attempts reached; dead-lettering"
                    );
                    outbox
                        .mark_dead_letter(item.id, &format!("max attempts reached: {message}"))
                        .await?;
                    misc.set_sync_flag(&item.entity_type, &item.entity_id, SyncFlag::DeadLetter)
                        .await?;
                    summary.dead_lettered += 1;
                } else {
                    debug!(id = item.id, attempts = item.attempts, "Retriable failure");
                    outbox.mark_pending_again(item.id, &message).await?;
                    summary.retried += 1;
                }
            }
        }

        Ok(())
    }
}
