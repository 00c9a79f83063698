//! The Wisp server.
//!
//! A [`Server`] holds the root namespace (`"/"`) and a table of named
//! namespaces, and turns upgraded connections into [`Client`]s. Root
//! namespace operations are forwarded for convenience.

use crate::client::Client;
use crate::config::ServerConfig;
use crate::error::SocketError;
use crate::namespace::{validate_namespace_name, Namespace};
use crate::room::Room;
use crate::socket::SocketClient;
use crate::stats::{Stats, StatsSnapshot};
use crate::status::{RoomStatus, Status};
use crate::store::{local_store_factory, StoreFactory};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wisp_protocol::ROOT_ENDPOINT;
use wisp_transport::Connection;

/// State shared between the server handle and its clients.
pub(crate) struct ServerShared {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) stats: Arc<Stats>,
    pub(crate) store_factory: StoreFactory,
    pub(crate) root: Namespace,
    namespaces: DashMap<String, Namespace>,
    running: AtomicBool,
    connections: AtomicUsize,
}

impl ServerShared {
    /// Look up a namespace by name, including the root.
    pub(crate) fn namespace(&self, name: &str) -> Option<Namespace> {
        if name == ROOT_ENDPOINT {
            return Some(self.root.clone());
        }
        self.namespaces.get(name).map(|ns| ns.value().clone())
    }

    /// Claim a connection slot. Fails at `max_connections`.
    fn reserve_connection(&self) -> bool {
        let max = self.config.max_connections;
        self.connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (max == 0 || n < max).then_some(n + 1)
            })
            .is_ok()
    }

    /// Return the slot claimed by [`reserve_connection`](Self::reserve_connection).
    pub(crate) fn release_connection(&self) {
        self.connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A Wisp server. Cloning is cheap and all clones share state.
#[derive(Clone)]
pub struct Server {
    shared: Arc<ServerShared>,
}

impl Server {
    /// Create a server with per-connection [`LocalStore`](crate::LocalStore)s.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store_factory(config, local_store_factory())
    }

    /// Create a server with a custom store factory.
    #[must_use]
    pub fn with_store_factory(config: ServerConfig, store_factory: StoreFactory) -> Self {
        info!("Creating server with config: {:?}", config);
        let config = Arc::new(config);
        let stats = Arc::new(Stats::new());
        let root = Namespace::new(ROOT_ENDPOINT, Arc::clone(&config), Arc::clone(&stats));
        Self {
            shared: Arc::new(ServerShared {
                config,
                stats,
                store_factory,
                root,
                namespaces: DashMap::new(),
                running: AtomicBool::new(false),
                connections: AtomicUsize::new(0),
            }),
        }
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Whether [`Server::run`] was called and the server was not stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Register a namespace and start its loop.
    ///
    /// Namespaces can only be added before [`Server::run`].
    ///
    /// # Errors
    ///
    /// Returns an error if the server is running, the name is invalid, or
    /// the namespace is already registered.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn add_namespace(&self, name: &str) -> Result<Namespace, SocketError> {
        if self.is_running() {
            return Err(SocketError::ServerAlreadyRunning);
        }
        validate_namespace_name(name).map_err(SocketError::InvalidNamespace)?;
        if name == ROOT_ENDPOINT {
            return Err(SocketError::NamespaceExists(name.to_string()));
        }

        let namespace = match self.shared.namespaces.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(SocketError::NamespaceExists(name.to_string())),
            Entry::Vacant(entry) => {
                let namespace = Namespace::new(
                    name,
                    Arc::clone(&self.shared.config),
                    Arc::clone(&self.shared.stats),
                );
                entry.insert(namespace.clone());
                namespace
            }
        };
        namespace.run();
        debug!(namespace = %name, "Registered namespace");
        Ok(namespace)
    }

    /// Start the server.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn run(&self) {
        for namespace in self.namespaces() {
            namespace.run();
        }
        self.shared.root.run();
        self.shared.running.store(true, Ordering::Release);
        info!(server = %self.shared.config.server_name, "Server running");
    }

    /// Stop every namespace loop.
    ///
    /// Connected clients stay connected; their events queue until the
    /// server runs again.
    pub fn stop(&self) {
        self.shared.root.stop();
        for namespace in self.namespaces() {
            namespace.stop();
        }
        self.shared.running.store(false, Ordering::Release);
        info!(server = %self.shared.config.server_name, "Server stopped");
    }

    /// Accept an upgraded connection.
    ///
    /// The client joins the root namespace, receives a Connect packet for
    /// `"/"`, and its read and write pumps start.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::MaxConnectionsReached`] at the connection limit.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn accept(&self, connection: Box<dyn Connection>) -> Result<Arc<Client>, SocketError> {
        if !self.shared.reserve_connection() {
            warn!(max_connections = self.shared.config.max_connections, "Rejecting connection");
            return Err(SocketError::MaxConnectionsReached);
        }
        // The slot is released by the client's teardown.
        Client::spawn(Arc::clone(&self.shared), connection)
    }

    /// The root namespace.
    #[must_use]
    pub fn root(&self) -> &Namespace {
        &self.shared.root
    }

    /// Look up a namespace by name. `"/"` is the root.
    #[must_use]
    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.shared.namespace(name)
    }

    /// Registered namespaces, excluding the root.
    #[must_use]
    pub fn namespaces(&self) -> Vec<Namespace> {
        self.shared
            .namespaces
            .iter()
            .map(|ns| ns.value().clone())
            .collect()
    }

    /// Open connections.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.shared.root.client_count()
    }

    /// Register a listener for a named event on the root namespace.
    pub fn listen<F>(&self, event: impl Into<String>, f: F)
    where
        F: Fn(SocketClient, Value) + Send + Sync + 'static,
    {
        self.shared.root.listen(event, f);
    }

    /// Register a connect listener on the root namespace.
    pub fn add_connect_listener<F>(&self, f: F)
    where
        F: Fn(SocketClient) + Send + Sync + 'static,
    {
        self.shared.root.add_connect_listener(f);
    }

    /// Register a disconnect listener on the root namespace.
    pub fn add_disconnect_listener<F>(&self, f: F)
    where
        F: Fn(SocketClient) + Send + Sync + 'static,
    {
        self.shared.root.add_disconnect_listener(f);
    }

    /// Broadcast an event to every client of the root namespace.
    pub fn send_event(&self, name: &str, data: Value) -> usize {
        self.shared.root.send_event(name, data)
    }

    /// Create a room in the root namespace.
    ///
    /// # Errors
    ///
    /// See [`Namespace::add_room`].
    pub fn add_room(&self, name: &str) -> Result<Arc<Room>, SocketError> {
        self.shared.root.add_room(name)
    }

    /// Get a room of the root namespace.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::RoomNotFound`] if it does not exist.
    pub fn room(&self, name: &str) -> Result<Arc<Room>, SocketError> {
        self.shared.root.room(name)
    }

    /// Remove a room of the root namespace.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::RoomNotFound`] if it does not exist.
    pub fn remove_room(&self, name: &str) -> Result<(), SocketError> {
        self.shared.root.remove_room(name)
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Status report.
    #[must_use]
    pub fn status(&self) -> Status {
        let mut all = vec![self.shared.root.clone()];
        all.extend(self.namespaces());

        let room_status: Vec<RoomStatus> = all
            .iter()
            .flat_map(|ns| ns.rooms())
            .map(|room| RoomStatus {
                namespace: room.namespace().to_string(),
                room_name: room.name().to_string(),
                number_of_clients: room.client_count(),
            })
            .collect();

        Status {
            server_name: self.shared.config.server_name.clone(),
            number_of_clients: self.client_count(),
            number_of_rooms: room_status.len(),
            room_status,
            namespaces: all.iter().map(Namespace::status).collect(),
            stats: self.stats(),
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("server_name", &self.shared.config.server_name)
            .field("running", &self.is_running())
            .field("namespaces", &self.shared.namespaces.len())
            .finish()
    }
}
