//! Block Duel Server
//!
//! Authoritative server for two-player falling-block rooms. Clients connect
//! over WebSocket, send inputs and receive a full room snapshot every tick.
//! Plain HTTP exposes health and the list of open lobbies.

mod app;
mod config;
mod game;
mod http;
mod matchmaking;
mod util;
mod ws;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.log_level);
    util::time::init_server_time();

    info!(
        addr = %config.server_addr,
        tick_rate_hz = config.tick_rate_hz,
        gravity_ms = config.gravity_interval.as_millis() as u64,
        "Starting Block Duel Server"
    );

    let listener = TcpListener::bind(config.server_addr).await?;
    let router = build_router(AppState::new(config));

    let local = listener.local_addr()?;
    info!("Listening on http://{local} (WebSocket at ws://{local}/ws)");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// RUST_LOG wins over LOG_LEVEL when both are set
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
