//! Repository layer: one thin handle per aggregate, all sharing the pool.
//!
//! Mutations that must commit atomically with an outbox row take a
//! `&mut SqliteConnection` instead of touching the pool, so the HTTP
//! handler that opened the transaction decides when it commits.

mod drawer;
mod kitchen;
mod misc;
mod outbox;
mod reference;
mod sale;
mod sequence;
mod session;
mod shift;
mod sync_state;
mod terminal;
mod user;

pub use drawer::DrawerRepository;
pub use kitchen::{KitchenRepository, NewKitchenItem};
pub use misc::MiscRepository;
pub use outbox::{NewOutboxItem, OutboxRepository};
pub use reference::{ReferenceRepository, UpsertOutcome};
pub use sale::{NewPayment, NewSale, NewSaleItem, SaleRepository};
pub use sequence::SequenceRepository;
pub use session::SessionRepository;
pub use shift::ShiftRepository;
pub use sync_state::SyncStateRepository;
pub use terminal::TerminalRepository;
pub use user::UserRepository;
