//! # beacon-core: Domain Types for the BeaconPOS Edge Hub
//!
//! Shared vocabulary for the hub: entity status enums, identifier minting,
//! and the three-layer hub configuration.
//!
//! ## Crate Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          beacon-core                                    │
//! │                                                                         │
//! │  types.rs   ── status enums + wire DTOs shared by db/sync/hub          │
//! │  ids.rs     ── new_id() and receipt-number formatting                  │
//! │  config.rs  ── HubConfig (env → persisted JSON → defaults)             │
//! │  error.rs   ── ConfigError                                             │
//! │                                                                         │
//! │  Depended on by:                                                       │
//! │    beacon-db    (row types, status enums)                              │
//! │    beacon-sync  (cloud credentials, outbox statuses)                   │
//! │    apps/hub     (everything)                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod ids;
pub mod types;

pub use config::{ConfigStore, HubConfig};
pub use error::ConfigError;
pub use ids::{date_key, format_receipt_number, new_id};
pub use types::*;
