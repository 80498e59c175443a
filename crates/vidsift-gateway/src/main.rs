use std::net::SocketAddr;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{info, warn};

mod app;
mod auth;
mod error;
mod http;
mod ratelimit;
mod worker;

use vidsift_core::VidsiftConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidsift_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: VIDSIFT_CONFIG path > ./vidsift.toml, env always wins
    let config_path = std::env::var("VIDSIFT_CONFIG").ok();
    // A missing vidsift.toml is fine (env-only deployments); only a
    // malformed file falls back to defaults.
    let config = VidsiftConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        VidsiftConfig::default()
    });

    let port = config.server.port;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = Arc::new(app::AppState::build(config, open_db)?);
    app::spawn_background(&state, shutdown_rx);

    let router = app::build_router(Arc::clone(&state));
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    info!("VidSift gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Stop tickers, hand back every held lease, drain the error buffer.
    let _ = shutdown_tx.send(true);
    state.locks.release_all();
    if let Err(e) = state.errors.flush() {
        warn!(error = %e, "final error-sink flush failed");
    }
    info!("VidSift gateway stopped");
    Ok(())
}

/// Open a connection to the shared SQLite file. Each subsystem manager
/// gets its own connection; WAL keeps them from blocking each other.
fn open_db(path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(conn)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
