//! # beacon-db: Embedded Store for the BeaconPOS Edge Hub
//!
//! Single-file SQLite database shared by the HTTP surface and both sync
//! engines.
//!
//! ## The One Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every write that produces a cloud-observable effect runs inside ONE   │
//! │  transaction that also inserts the outbox row:                         │
//! │                                                                         │
//! │    let mut tx = db.pool().begin().await?;                              │
//! │    db.sales().insert(&mut tx, &sale).await?;                           │
//! │    db.outbox().enqueue(&mut tx, item).await?;                          │
//! │    tx.commit().await?;                                                 │
//! │                                                                         │
//! │  No business fact without a push record; no orphan push record.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories are thin, cheaply clonable handles around the pool.
//! Mutations that belong to a larger atomic unit take a
//! `&mut SqliteConnection` so the caller owns the transaction boundary.

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
