//! Route table.
//!
//! Every state-mutating route follows the same five steps: validate,
//! open a transaction, write business rows, write one outbox row, commit
//! — then broadcast. Read-only routes are single-statement selects.

pub mod admin;
pub mod catalog;
pub mod drawers;
pub mod kitchen;
pub mod misc;
pub mod sales;
pub mod shifts;
pub mod sync;
pub mod system;
pub mod terminals;
pub mod ws;

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::auth;
use crate::state::SharedState;

/// Builds the full hub router with session middleware and CORS.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Public
        .route("/health", get(system::health))
        .route("/ws", get(ws::ws_handler))
        .route("/api/auth/pin-login", post(auth::pin_login))
        .route("/api/terminals/register", post(terminals::register))
        .route("/api/admin/pairing", post(admin::pairing))
        // Auth
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/users/{id}/pin", post(auth::update_pin))
        // Catalog (read-only mirrors)
        .route("/api/products", get(catalog::list_products))
        .route("/api/categories", get(catalog::list_categories))
        .route("/api/floors", get(catalog::list_floors))
        .route("/api/dining-tables", get(catalog::list_tables))
        .route("/api/customers", get(catalog::list_customers))
        .route("/api/deals", get(catalog::list_deals))
        // Sales
        .route("/api/sales", post(sales::create_sale))
        .route("/api/sales/{id}", get(sales::get_sale))
        .route("/api/sales/{id}/void", post(sales::void_sale))
        .route("/api/refunds", post(misc::create_refund))
        // Kitchen
        .route(
            "/api/kitchen-orders",
            post(kitchen::create_order).get(kitchen::list_orders),
        )
        .route("/api/kitchen-orders/{id}", patch(kitchen::update_order))
        .route("/api/kitchen-orders/{id}/bump", post(kitchen::bump_order))
        .route("/api/kitchen-orders/{id}/status", post(kitchen::set_status))
        // Cash drawers
        .route("/api/cash-drawers/open", post(drawers::open_drawer))
        .route("/api/cash-drawers/{id}/close", post(drawers::close_drawer))
        .route(
            "/api/cash-drawers/{id}/transactions",
            post(drawers::add_transaction),
        )
        // Shifts
        .route("/api/shifts/start", post(shifts::start_shift))
        .route("/api/shifts/{id}/end", post(shifts::end_shift))
        .route("/api/shifts/{id}/breaks", post(shifts::start_break))
        .route(
            "/api/shifts/{id}/breaks/{break_id}/end",
            post(shifts::end_break),
        )
        // Guest checks, store credit, table sessions
        .route("/api/guest-checks", post(misc::create_guest_check))
        .route("/api/guest-checks/{id}/close", post(misc::close_guest_check))
        .route("/api/store-credits", post(misc::create_store_credit))
        .route(
            "/api/store-credits/{customer_id}",
            get(misc::store_credit_balance),
        )
        .route("/api/table-sessions/open", post(misc::open_table_session))
        .route(
            "/api/table-sessions/{id}/close",
            post(misc::close_table_session),
        )
        // Terminals
        .route("/api/terminals", get(terminals::list))
        // Sync controls & observability
        .route("/api/sync/status", get(sync::status))
        .route("/api/sync/pull", post(sync::trigger_pull))
        .route("/api/sync/push", post(sync::trigger_push))
        .route("/api/sync/retry-dead-letters", post(sync::retry_dead_letters))
        .route("/api/sync/reset", post(sync::reset))
        .route("/api/diagnostics", get(system::diagnostics))
        // Middleware (session check wraps everything; public paths skip
        // inside the middleware itself).
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
