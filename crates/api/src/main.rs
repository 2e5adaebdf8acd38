use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boardwise_api::config::ServerConfig;
use boardwise_api::router::build_app_router;
use boardwise_api::state::AppState;
use boardwise_api::ws;
use boardwise_engine::{Engine, EngineConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "boardwise_api=debug,boardwise_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let engine_config = EngineConfig::from_env();
    tracing::info!(
        data_dir = %engine_config.data_dir.display(),
        autopilot_interval_ms = engine_config.autopilot_interval.as_millis() as u64,
        "Loaded engine configuration",
    );

    // --- Engine ---
    let engine = Arc::new(Engine::new(engine_config));
    let loaded = engine.start().await.expect("Failed to load stored boards");
    tracing::info!(boards = loaded, "Engine started");

    let cancel = CancellationToken::new();
    let autopilot_handle = engine.spawn_autopilot(cancel.child_token());
    tracing::info!("Autopilot poller started");

    // --- WebSocket manager, event bridge and heartbeat ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let bridge_handle =
        ws::start_event_bridge(engine.bus(), Arc::clone(&ws_manager), cancel.child_token());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- App state & router ---
    let state = AppState {
        engine: Arc::clone(&engine),
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    cancel.cancel();
    let _ = tokio::time::timeout(drain, autopilot_handle).await;
    tracing::info!("Autopilot poller stopped");
    let _ = tokio::time::timeout(drain, bridge_handle).await;
    tracing::info!("Event bridge stopped");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
