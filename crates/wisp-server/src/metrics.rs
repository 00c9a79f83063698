//! Metrics collection and export for Wisp.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format. Server counters kept by `wisp-core` are exported
//! periodically from a [`StatsSnapshot`].

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;
use wisp_core::{Server, StatsSnapshot};

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "wisp_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "wisp_connections_active";
    pub const CONNECTION_FAILURES_TOTAL: &str = "wisp_connection_failures_total";
    pub const ROOMS_TOTAL: &str = "wisp_rooms_total";
    pub const ROOMS_ACTIVE: &str = "wisp_rooms_active";
    pub const PACKET_FAILURES_TOTAL: &str = "wisp_packet_failures_total";
    pub const WEBSOCKETS_ACTIVE: &str = "wisp_websockets_active";
    pub const COMMANDS_TOTAL: &str = "wisp_commands_total";
    pub const ERRORS_TOTAL: &str = "wisp_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    // Describe metrics
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open client connections"
    );
    metrics::describe_counter!(
        names::CONNECTION_FAILURES_TOTAL,
        "Connections that ended with a transport error"
    );
    metrics::describe_counter!(names::ROOMS_TOTAL, "Total number of rooms created");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of rooms");
    metrics::describe_counter!(
        names::PACKET_FAILURES_TOTAL,
        "Packets that failed to decode, route or queue"
    );
    metrics::describe_gauge!(
        names::WEBSOCKETS_ACTIVE,
        "Current number of upgraded WebSocket sessions"
    );
    metrics::describe_counter!(names::COMMANDS_TOTAL, "Room commands handled");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Export a counter snapshot.
pub fn record_stats(stats: &StatsSnapshot) {
    counter!(names::CONNECTIONS_TOTAL).absolute(stats.opened_connections);
    gauge!(names::CONNECTIONS_ACTIVE).set(stats.active_connections() as f64);
    counter!(names::CONNECTION_FAILURES_TOTAL).absolute(stats.connection_failures);
    counter!(names::ROOMS_TOTAL).absolute(stats.opened_rooms);
    gauge!(names::ROOMS_ACTIVE).set(stats.active_rooms() as f64);
    counter!(names::PACKET_FAILURES_TOTAL).absolute(stats.packet_failures);
}

/// Periodically export the server's counters.
pub fn spawn_stats_exporter(server: Server, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            record_stats(&server.stats());
        }
    })
}

/// Record a handled room command.
pub fn record_command(command: &str) {
    counter!(names::COMMANDS_TOTAL, "command" => command.to_string()).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that tracks an upgraded WebSocket session.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a session.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::WEBSOCKETS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::WEBSOCKETS_ACTIVE).decrement(1.0);
    }
}
