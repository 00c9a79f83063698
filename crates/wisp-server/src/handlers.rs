//! HTTP handlers for the Wisp server.
//!
//! WebSocket upgrades are handed to the core [`Server`]; the handler task
//! lives as long as the client so per-session metrics stay accurate.

use crate::commands;
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocket, ConnectInfo, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use wisp_core::{Server, Status};
use wisp_transport::AxumConnection;

/// Shared server state.
pub struct AppState {
    /// The realtime server.
    pub server: Server,
    /// Binary configuration.
    pub config: Config,
}

impl AppState {
    /// Create the realtime server from configuration.
    ///
    /// Registers the configured namespaces, installs the room commands on
    /// each of them and on the root, and starts the server.
    ///
    /// # Errors
    ///
    /// Returns an error if a namespace cannot be registered.
    pub fn new(config: Config) -> Result<Self> {
        let server = Server::new(config.server.clone());
        commands::install(server.root());
        for name in &config.namespaces {
            let namespace = server
                .add_namespace(name)
                .with_context(|| format!("Failed to register namespace {name}"))?;
            commands::install(&namespace);
        }
        server.run();
        Ok(Self { server, config })
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone())?);

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
        metrics::spawn_stats_exporter(
            state.server.clone(),
            Duration::from_millis(config.metrics.export_interval_ms.max(1)),
        );
    }

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Wisp server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Status handler.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<Status> {
    Json(state.server.status())
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let max_message_size = state.config.transport.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, addr, state))
}

/// Hand an upgraded socket to the realtime server and wait for it to close.
async fn handle_websocket(socket: WebSocket, addr: SocketAddr, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let connection = AxumConnection::new(
        socket,
        Some(addr),
        state.config.transport.max_message_size,
    );

    match state.server.accept(Box::new(connection)) {
        Ok(client) => {
            debug!(client = %client.id(), remote = %addr, "WebSocket session started");
            client.closed().await;
            debug!(client = %client.id(), "WebSocket session ended");
        }
        Err(e) => {
            warn!(remote = %addr, error = %e, "Rejected WebSocket connection");
            metrics::record_error("accept");
        }
    }
}
