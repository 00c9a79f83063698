//! Server-wide counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter tracked by [`Stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    /// A connection was accepted.
    OpenedConnections,
    /// A connection was torn down.
    ClosedConnections,
    /// A room was created.
    OpenedRooms,
    /// A room was removed.
    ClosedRooms,
    /// A connection failed with a transport error.
    ConnectionFailures,
    /// An inbound packet could not be decoded or routed, or an outbound
    /// packet could not be queued.
    PacketFailures,
}

/// Monotonic counters, safe to increment from any task.
#[derive(Debug, Default)]
pub struct Stats {
    opened_connections: AtomicU64,
    closed_connections: AtomicU64,
    opened_rooms: AtomicU64,
    closed_rooms: AtomicU64,
    connection_failures: AtomicU64,
    packet_failures: AtomicU64,
}

impl Stats {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter.
    pub fn inc(&self, stat: Stat) {
        self.counter(stat).fetch_add(1, Ordering::Relaxed);
    }

    /// Read a single counter.
    #[must_use]
    pub fn get(&self, stat: Stat) -> u64 {
        self.counter(stat).load(Ordering::Acquire)
    }

    /// Copy all counters.
    ///
    /// Closed counters are read before their opened counterparts, so a
    /// snapshot never reports more closed than opened.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let closed_connections = self.get(Stat::ClosedConnections);
        let closed_rooms = self.get(Stat::ClosedRooms);
        StatsSnapshot {
            opened_connections: self.get(Stat::OpenedConnections),
            closed_connections,
            opened_rooms: self.get(Stat::OpenedRooms),
            closed_rooms,
            connection_failures: self.get(Stat::ConnectionFailures),
            packet_failures: self.get(Stat::PacketFailures),
        }
    }

    fn counter(&self, stat: Stat) -> &AtomicU64 {
        match stat {
            Stat::OpenedConnections => &self.opened_connections,
            Stat::ClosedConnections => &self.closed_connections,
            Stat::OpenedRooms => &self.opened_rooms,
            Stat::ClosedRooms => &self.closed_rooms,
            Stat::ConnectionFailures => &self.connection_failures,
            Stat::PacketFailures => &self.packet_failures,
        }
    }
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Connections accepted.
    pub opened_connections: u64,
    /// Connections torn down.
    pub closed_connections: u64,
    /// Rooms created.
    pub opened_rooms: u64,
    /// Rooms removed.
    pub closed_rooms: u64,
    /// Connections that ended with a transport error.
    pub connection_failures: u64,
    /// Packets that failed to decode, route or queue.
    pub packet_failures: u64,
}

impl StatsSnapshot {
    /// Connections currently open.
    #[must_use]
    pub fn active_connections(&self) -> u64 {
        self.opened_connections.saturating_sub(self.closed_connections)
    }

    /// Rooms currently open.
    #[must_use]
    pub fn active_rooms(&self) -> u64 {
        self.opened_rooms.saturating_sub(self.closed_rooms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_stats_inc_and_snapshot() {
        let stats = Stats::new();
        stats.inc(Stat::OpenedConnections);
        stats.inc(Stat::OpenedConnections);
        stats.inc(Stat::ClosedConnections);
        stats.inc(Stat::PacketFailures);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.opened_connections, 2);
        assert_eq!(snapshot.closed_connections, 1);
        assert_eq!(snapshot.packet_failures, 1);
        assert_eq!(snapshot.active_connections(), 1);
        assert_eq!(snapshot.active_rooms(), 0);

        // Snapshot is a copy
        stats.inc(Stat::OpenedRooms);
        assert_eq!(snapshot.opened_rooms, 0);
        assert_eq!(stats.get(Stat::OpenedRooms), 1);
    }

    #[test]
    fn test_stats_concurrent_increments() {
        let stats = Arc::new(Stats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.inc(Stat::OpenedConnections);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.get(Stat::OpenedConnections), 8000);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let json = serde_json::to_value(StatsSnapshot::default()).unwrap();
        assert!(json.get("openedConnections").is_some());
        assert!(json.get("packetFailures").is_some());
    }
}
