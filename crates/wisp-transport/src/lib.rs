//! # wisp-transport
//!
//! Connection boundary for the Wisp realtime server.
//!
//! The core consumes already-upgraded connections through the [`Connection`]
//! trait and never performs an HTTP upgrade itself. This crate provides:
//!
//! - **WebSocket** - A standalone tokio-tungstenite listener
//! - **Axum** - An adapter for sockets upgraded by an axum handler
//! - **Memory** - In-process pairs for tests and benchmarks
//!
//! ## Transport Abstraction
//!
//! ```rust,ignore
//! use wisp_transport::{Connection, Transport};
//!
//! async fn serve(transport: impl Transport) {
//!     while let Ok(conn) = transport.accept().await {
//!         let (mut reader, mut writer) = conn.split();
//!         // Hand the halves to a read pump and a write pump
//!     }
//! }
//! ```

pub mod axum_ws;
pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use axum_ws::AxumConnection;
pub use memory::{MemoryConnection, MemoryPeer};
pub use traits::{Connection, FrameReader, FrameWriter, Transport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;
