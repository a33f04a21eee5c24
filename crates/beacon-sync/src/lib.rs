//! # beacon-sync: Cloud Synchronization Engines
//!
//! The two background workers that keep a hub and its cloud in agreement.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Layout                               │
//! │                                                                         │
//! │   local store                                              cloud        │
//! │  ┌──────────┐   claim    ┌──────────────┐   POST /push  ┌──────────┐   │
//! │  │ outbox_  │──────────▶ │  PushEngine  │─────────────▶ │          │   │
//! │  │ queue    │ ◀──────────│  (5 s tick)  │ ◀──────────── │  HTTP/   │   │
//! │  └──────────┘  outcome   └──────────────┘  2xx/409/4xx  │  JSON    │   │
//! │                                                          │  API     │   │
//! │  ┌──────────┐   upsert   ┌──────────────┐  GET /sync    │          │   │
//! │  │reference │ ◀──────────│  PullEngine  │─────────────▶ │          │   │
//! │  │ mirrors  │            │  (60 s tick) │ sinceVersion  └──────────┘   │
//! │  └──────────┘            └──────────────┘                               │
//! │                                                                         │
//! │  Both engines gate on CloudClient::is_configured() and guard their     │
//! │  work with a single-flight flag; a tick that arrives while the         │
//! │  previous one still runs is dropped.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Engine failures never reach HTTP callers; they surface through
//! `sync_state` rows and outbox statistics.

pub mod cloud;
pub mod error;
pub mod plan;
pub mod pull;
pub mod push;
pub mod transform;

pub use cloud::{CloudClient, CloudResponse};
pub use error::{SyncError, SyncResult};
pub use pull::{PullEngine, PullHandle, PullSummary};
pub use push::{PushEngine, PushHandle, PushSummary};
