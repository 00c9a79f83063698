//! # wisp-core
//!
//! Namespaces, rooms, clients and event dispatch for the Wisp realtime
//! server.
//!
//! - **Server** - Accepts upgraded connections and owns the namespaces
//! - **Namespace** - Isolated sub-server with its own rooms, clients and
//!   listeners, processed by a single loop task
//! - **Room** - Named broadcast group inside a namespace
//! - **Client** - One connection with read/write pumps and a key/value store
//! - **SocketClient** - A client as seen from one namespace
//! - **Ack** - Reply handle for events that requested acknowledgement
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│   Client    │────▶│  Namespace  │──▶ listeners
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            ▲                   │
//!                            │            ┌─────────────┐
//!                            └────────────│    Room     │
//!                                         └─────────────┘
//! ```

pub mod ack;
pub mod client;
pub mod config;
pub mod error;
mod listeners;
pub mod namespace;
pub mod room;
pub mod server;
pub mod socket;
pub mod stats;
pub mod status;
pub mod store;

pub use ack::Ack;
pub use client::Client;
pub use config::ServerConfig;
pub use error::{SendError, SocketError};
pub use namespace::Namespace;
pub use room::Room;
pub use server::Server;
pub use socket::SocketClient;
pub use stats::{Stat, Stats, StatsSnapshot};
pub use status::{NamespaceStatus, RoomStatus, Status};
pub use store::{local_store_factory, LocalStore, Store, StoreFactory};
