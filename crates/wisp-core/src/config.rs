//! Server configuration.

use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name reported in status snapshots.
    pub server_name: String,
    /// Inbound client events a namespace may have queued before read pumps wait.
    pub event_buffer_size: usize,
    /// Cap on outbound packets a client may have queued (0 = unbounded).
    ///
    /// With a cap, non-blocking sends past it fail with `QueueFull` and
    /// broadcasts skip that client.
    pub outbound_queue_size: usize,
    /// Maximum concurrent connections (0 = unlimited).
    pub max_connections: usize,
    /// Maximum rooms per namespace (0 = unlimited).
    pub max_rooms: usize,
    /// Whether joining an unknown room creates it.
    pub auto_create_rooms: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "default".to_string(),
            event_buffer_size: 100,
            outbound_queue_size: 0,
            max_connections: 10_000,
            max_rooms: 5_000,
            auto_create_rooms: true,
        }
    }
}
