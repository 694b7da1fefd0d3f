//! Tilerealm Game Server
//!
//! Authoritative tile-world server with WebSocket clients and a small HTTP
//! info API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use tilerealm_server::api;
use tilerealm_server::config::ServerConfig;
use tilerealm_server::net::handler::ConnectionHandler;
use tilerealm_server::state::AppState;
use tilerealm_server::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Tilerealm server v{} starting", VERSION);

    // Load configuration
    let config = ServerConfig::load().await?;
    info!(
        "Configuration loaded from: {}",
        config.config_path.display()
    );

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Build the world; any error here aborts startup
    let state = Arc::new(
        AppState::load(config.clone(), shutdown_tx.clone())
            .await
            .with_context(|| format!("Failed to load world from {}", config.world_path.display()))?,
    );
    info!(
        areas = state.world.area_count(),
        tile_size = state.world.tile_size(),
        "Application state initialized"
    );

    // Start the state broadcast tick
    let dispatcher = state.dispatcher.clone();
    let mut tick_shutdown_rx = shutdown_tx.subscribe();
    let tick_handle = tokio::spawn(async move {
        dispatcher.run(&mut tick_shutdown_rx).await;
    });

    // Start WebSocket listener for game clients
    let ws_addr: SocketAddr = format!("0.0.0.0:{}", config.websocket_port).parse()?;
    let ws_listener = TcpListener::bind(ws_addr).await?;
    info!("WebSocket server listening on: {}", ws_addr);

    let ws_state = state.clone();
    let mut ws_shutdown_rx = shutdown_tx.subscribe();
    let ws_handle = tokio::spawn(async move {
        accept_websocket_connections(ws_listener, ws_state, &mut ws_shutdown_rx).await;
    });

    // Start HTTP API server
    let api_addr: SocketAddr = format!("0.0.0.0:{}", config.api_port).parse()?;
    let api_listener = TcpListener::bind(api_addr).await?;
    info!("HTTP API listening on: {}", api_addr);

    let api_state = state.clone();
    let api_shutdown_rx = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(async move {
        run_api_server(api_listener, api_state, api_shutdown_rx).await;
    });

    info!("Server startup complete!");
    info!("{} is ready for connections", config.server_name);

    // Wait for shutdown signal
    wait_for_shutdown(shutdown_tx.clone()).await;

    info!("Shutting down server...");

    let _ = tick_handle.await;
    let _ = ws_handle.await;
    let _ = api_handle.await;

    // Cleanup
    state.dispatcher.disconnect_all();
    info!("All players disconnected");

    info!("Server shutdown complete. Goodbye!");
    Ok(())
}

/// Initialize the logging/tracing system
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tilerealm_server=debug"));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true);

    // Structured output for log shippers
    if std::env::var("TILEREALM_LOG_JSON").is_ok_and(|v| v == "1" || v == "true") {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Accept incoming WebSocket connections
async fn accept_websocket_connections(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        info!("New WebSocket connection from: {}", addr);
                        let handler = ConnectionHandler::new(state.clone());
                        tokio::spawn(async move {
                            if let Err(e) = handler.handle_websocket(stream, addr).await {
                                warn!("WebSocket connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept WebSocket connection: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("WebSocket connection acceptor shutting down");
                break;
            }
        }
    }
}

/// Run the HTTP API server
async fn run_api_server(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let router = api::create_router(state);

    let shutdown_signal = async move {
        let _ = shutdown_rx.recv().await;
        info!("HTTP API shutting down");
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .unwrap_or_else(|e| error!("API server error: {}", e));
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
