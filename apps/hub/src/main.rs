//! Hub entry point: config, store, engines, listener, graceful shutdown.
//!
//! Exit codes: 0 on a clean shutdown; non-zero when the database cannot
//! be opened or the port cannot be bound.

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use beacon_core::{ConfigStore, HubConfig};
use beacon_db::{Database, DbConfig};
use beacon_hub::{build_state, routes::build_router};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting BeaconPOS edge hub");

    let config = HubConfig::load_or_default(None);
    let config_path = std::env::var("BEACON_CONFIG_PATH").ok().map(PathBuf::from);
    let store = ConfigStore::new(config.clone(), config_path);

    let db_path = match config.database_path() {
        Ok(path) => path,
        Err(e) => {
            error!(error = %e, "Cannot resolve database path");
            std::process::exit(1);
        }
    };
    if let Some(parent) = db_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!(error = %e, "Cannot create data directory");
            std::process::exit(1);
        }
    }

    let db = match Database::new(DbConfig::new(&db_path)).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, path = %db_path.display(), "Database initialization failed");
            std::process::exit(1);
        }
    };

    if !config.is_configured() {
        info!("Cloud credentials not present; serving offline until paired");
    }

    let state = build_state(db.clone(), store);
    let app = build_router(state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %bind_addr, "Cannot bind HTTP listener");
            std::process::exit(1);
        }
    };
    info!(addr = %bind_addr, "Hub listening");

    let serve_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    if let Err(e) = serve_result {
        error!(error = %e, "Server error");
    }

    // Engines finish their current batch/cycle, then the WAL folds back
    // into the main file.
    state.push.stop().await.ok();
    state.pull.stop().await.ok();
    db.close_with_checkpoint().await;

    info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Ctrl+C handler installation cannot fail");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("signal handler installation cannot fail")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
