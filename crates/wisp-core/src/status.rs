//! Status snapshots.

use crate::stats::StatsSnapshot;
use serde::{Deserialize, Serialize};

/// Server status report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Configured server name.
    pub server_name: String,
    /// Open connections.
    pub number_of_clients: usize,
    /// Rooms across all namespaces.
    pub number_of_rooms: usize,
    /// Per-room member counts.
    pub room_status: Vec<RoomStatus>,
    /// Per-namespace summaries.
    pub namespaces: Vec<NamespaceStatus>,
    /// Counter snapshot.
    pub stats: StatsSnapshot,
}

/// Member count of one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    /// Owning namespace.
    pub namespace: String,
    /// Room name.
    pub room_name: String,
    /// Members.
    pub number_of_clients: usize,
}

/// Summary of one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStatus {
    /// Namespace name.
    pub name: String,
    /// Joined clients.
    pub number_of_clients: usize,
    /// Rooms.
    pub number_of_rooms: usize,
    /// Whether its loop is running.
    pub running: bool,
}
