//! Namespaces: independent logical sub-servers.
//!
//! A namespace owns its rooms, tracks the clients that joined it and runs a
//! single loop task that applies listener registrations and dispatches
//! events. Registrations are polled before events, so a listener registered
//! before an event is enqueued always sees that event.
//!
//! ```text
//!  read pumps ──▶ events ─────────┐
//!                                 ├──▶ loop ──▶ Listeners
//!  listen()   ──▶ registrations ──┘
//! ```

use crate::ack::Ack;
use crate::client::Client;
use crate::config::ServerConfig;
use crate::error::SocketError;
use crate::listeners::{Listeners, Registration};
use crate::room::Room;
use crate::socket::SocketClient;
use crate::stats::{Stat, Stats};
use crate::status::NamespaceStatus;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;
use wisp_protocol::{encode, Packet};

/// Maximum namespace name length.
pub const MAX_NAMESPACE_NAME_LENGTH: usize = 256;

/// Validate a namespace name.
///
/// # Errors
///
/// Returns an error message if the name is invalid.
pub fn validate_namespace_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Namespace name cannot be empty");
    }
    if name.len() > MAX_NAMESPACE_NAME_LENGTH {
        return Err("Namespace name too long");
    }
    if !name.starts_with('/') {
        return Err("Namespace name must start with '/'");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Namespace name contains invalid characters");
    }
    Ok(())
}

/// Events processed by the namespace loop.
pub(crate) enum NamespaceEvent {
    Connect(Arc<Client>),
    Disconnect(Arc<Client>),
    RoomAdded(Arc<Room>),
    RoomRemoved(Arc<Room>),
    Event {
        client: Arc<Client>,
        name: String,
        data: Value,
        ack: Option<Ack>,
        // Held until dispatched, bounding queued remote events.
        _permit: Option<OwnedSemaphorePermit>,
    },
}

struct LoopState {
    registrations: mpsc::UnboundedReceiver<Registration>,
    events: mpsc::UnboundedReceiver<NamespaceEvent>,
    listeners: Listeners,
}

struct NamespaceInner {
    name: String,
    config: Arc<ServerConfig>,
    stats: Arc<Stats>,
    rooms: DashMap<String, Arc<Room>>,
    clients: DashMap<Uuid, Arc<Client>>,
    registrations: mpsc::UnboundedSender<Registration>,
    events: mpsc::UnboundedSender<NamespaceEvent>,
    event_permits: Arc<Semaphore>,
    running: watch::Sender<bool>,
    loop_state: Arc<AsyncMutex<LoopState>>,
}

/// A namespace handle. Cloning is cheap and all clones share state.
#[derive(Clone)]
pub struct Namespace {
    inner: Arc<NamespaceInner>,
}

impl Namespace {
    pub(crate) fn new(name: impl Into<String>, config: Arc<ServerConfig>, stats: Arc<Stats>) -> Self {
        let (registrations, registrations_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let (running, _) = watch::channel(false);
        let event_permits = Arc::new(Semaphore::new(config.event_buffer_size.max(1)));

        Self {
            inner: Arc::new(NamespaceInner {
                name: name.into(),
                config,
                stats,
                rooms: DashMap::new(),
                clients: DashMap::new(),
                registrations,
                events,
                event_permits,
                running,
                loop_state: Arc::new(AsyncMutex::new(LoopState {
                    registrations: registrations_rx,
                    events: events_rx,
                    listeners: Listeners::default(),
                })),
            }),
        }
    }

    /// Namespace name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.inner.running.borrow()
    }

    /// Start the loop. Does nothing if it is already running.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn run(&self) {
        if self.inner.running.send_replace(true) {
            return;
        }
        tokio::spawn(self.clone().run_loop());
    }

    /// Stop the loop.
    ///
    /// Queued registrations and events stay queued until the loop runs again.
    pub fn stop(&self) {
        if self.inner.running.send_replace(false) {
            debug!(namespace = %self.inner.name, "Stopping namespace loop");
        }
    }

    async fn run_loop(self) {
        let mut running = self.inner.running.subscribe();
        // A previous loop still winding down holds the state until it exits.
        let mut state = Arc::clone(&self.inner.loop_state).lock_owned().await;
        if !*running.borrow_and_update() {
            return;
        }
        info!(namespace = %self.inner.name, "Namespace loop started");

        let LoopState {
            registrations,
            events,
            listeners,
        } = &mut *state;

        loop {
            tokio::select! {
                biased;
                Some(registration) = registrations.recv() => listeners.register(registration),
                Some(event) = events.recv() => self.dispatch(listeners, event),
                () = wait_stopped(&mut running) => break,
            }
        }

        info!(namespace = %self.inner.name, "Namespace loop stopped");
    }

    fn dispatch(&self, listeners: &Listeners, event: NamespaceEvent) {
        match event {
            NamespaceEvent::Connect(client) => {
                listeners.connected(&SocketClient::new(client, self.clone(), None));
            }
            NamespaceEvent::Disconnect(client) => {
                listeners.disconnected(&SocketClient::new(client, self.clone(), None));
            }
            NamespaceEvent::RoomAdded(room) => listeners.room_added(&self.inner.name, &room),
            NamespaceEvent::RoomRemoved(room) => listeners.room_removed(&self.inner.name, &room),
            NamespaceEvent::Event {
                client,
                name,
                data,
                ack,
                ..
            } => {
                if !client.is_open() {
                    trace!(namespace = %self.inner.name, client = %client.id(), event = %name, "Skipping event from closed client");
                    return;
                }
                let socket = SocketClient::new(client, self.clone(), ack);
                if listeners.event(&name, &socket, &data) == 0 {
                    trace!(namespace = %self.inner.name, event = %name, "No listener for event");
                }
            }
        }
    }

    /// Register a listener for a named event.
    ///
    /// Listeners for the same name run in registration order.
    pub fn listen<F>(&self, event: impl Into<String>, f: F)
    where
        F: Fn(SocketClient, Value) + Send + Sync + 'static,
    {
        self.register(Registration::Event(event.into(), Box::new(f)));
    }

    /// Register a listener for clients joining this namespace.
    pub fn add_connect_listener<F>(&self, f: F)
    where
        F: Fn(SocketClient) + Send + Sync + 'static,
    {
        self.register(Registration::Connect(Box::new(f)));
    }

    /// Register a listener for clients leaving this namespace.
    pub fn add_disconnect_listener<F>(&self, f: F)
    where
        F: Fn(SocketClient) + Send + Sync + 'static,
    {
        self.register(Registration::Disconnect(Box::new(f)));
    }

    /// Register a listener for room creation.
    pub fn add_room_added_listener<F>(&self, f: F)
    where
        F: Fn(Arc<Room>) + Send + Sync + 'static,
    {
        self.register(Registration::RoomAdded(Box::new(f)));
    }

    /// Register a listener for room removal.
    pub fn add_room_removed_listener<F>(&self, f: F)
    where
        F: Fn(Arc<Room>) + Send + Sync + 'static,
    {
        self.register(Registration::RoomRemoved(Box::new(f)));
    }

    fn register(&self, registration: Registration) {
        // The receiver lives as long as the namespace.
        let _ = self.inner.registrations.send(registration);
    }

    fn emit(&self, event: NamespaceEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Create a room.
    ///
    /// # Errors
    ///
    /// Returns an error if the room exists or the room limit is reached.
    pub fn add_room(&self, name: &str) -> Result<Arc<Room>, SocketError> {
        self.check_room_limit()?;
        match self.inner.rooms.entry(name.to_string()) {
            Entry::Occupied(_) => Err(SocketError::RoomExists(name.to_string())),
            Entry::Vacant(entry) => {
                let room = Arc::new(Room::new(name, self.name()));
                entry.insert(Arc::clone(&room));
                self.room_created(&room);
                Ok(room)
            }
        }
    }

    /// Get a room, creating it if it does not exist.
    pub(crate) fn get_or_create_room(&self, name: &str) -> Result<Arc<Room>, SocketError> {
        if let Some(room) = self.inner.rooms.get(name) {
            return Ok(Arc::clone(room.value()));
        }
        self.check_room_limit()?;
        match self.inner.rooms.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let room = Arc::new(Room::new(name, self.name()));
                entry.insert(Arc::clone(&room));
                self.room_created(&room);
                Ok(room)
            }
        }
    }

    fn check_room_limit(&self) -> Result<(), SocketError> {
        let max = self.inner.config.max_rooms;
        if max > 0 && self.inner.rooms.len() >= max {
            return Err(SocketError::MaxRoomsReached);
        }
        Ok(())
    }

    fn room_created(&self, room: &Arc<Room>) {
        self.inner.stats.inc(Stat::OpenedRooms);
        debug!(namespace = %self.inner.name, room = %room.name(), "Created room");
        self.emit(NamespaceEvent::RoomAdded(Arc::clone(room)));
    }

    /// Get a room by name.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::RoomNotFound`] if it does not exist.
    pub fn room(&self, name: &str) -> Result<Arc<Room>, SocketError> {
        self.inner
            .rooms
            .get(name)
            .map(|room| Arc::clone(room.value()))
            .ok_or_else(|| SocketError::RoomNotFound(name.to_string()))
    }

    /// Remove and destroy a room, evicting its members.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::RoomNotFound`] if it does not exist.
    pub fn remove_room(&self, name: &str) -> Result<(), SocketError> {
        let (_, room) = self
            .inner
            .rooms
            .remove(name)
            .ok_or_else(|| SocketError::RoomNotFound(name.to_string()))?;
        room.destroy();
        self.inner.stats.inc(Stat::ClosedRooms);
        self.emit(NamespaceEvent::RoomRemoved(room));
        Ok(())
    }

    /// All rooms.
    #[must_use]
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.inner
            .rooms
            .iter()
            .map(|room| Arc::clone(room.value()))
            .collect()
    }

    /// Number of rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }

    /// Get a joined client by id.
    #[must_use]
    pub fn client(&self, id: Uuid) -> Option<Arc<Client>> {
        self.inner.clients.get(&id).map(|c| Arc::clone(c.value()))
    }

    /// All joined clients.
    #[must_use]
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.inner
            .clients
            .iter()
            .map(|c| Arc::clone(c.value()))
            .collect()
    }

    /// Number of joined clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }

    /// Broadcast an event to every joined client.
    ///
    /// Returns the number of clients it was queued for.
    pub fn send_event(&self, name: &str, data: Value) -> usize {
        let frame = match encode(&Packet::event(self.name(), name, data)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(namespace = %self.inner.name, error = %e, "Failed to encode namespace event");
                return 0;
            }
        };
        let sent = self
            .clients()
            .iter()
            .filter(|client| client.is_open() && client.send_raw(frame.clone()).is_ok())
            .count();
        trace!(namespace = %self.inner.name, event = %name, recipients = sent, "Namespace broadcast");
        sent
    }

    /// Summary for status reports.
    #[must_use]
    pub fn status(&self) -> NamespaceStatus {
        NamespaceStatus {
            name: self.inner.name.clone(),
            number_of_clients: self.client_count(),
            number_of_rooms: self.room_count(),
            running: self.is_running(),
        }
    }

    pub(crate) fn auto_create_rooms(&self) -> bool {
        self.inner.config.auto_create_rooms
    }

    /// Join a client to this namespace.
    ///
    /// Confirms with a Connect packet, then emits a connect event.
    pub(crate) fn add_client(&self, client: &Arc<Client>) -> Result<(), SocketError> {
        match self.inner.clients.entry(client.id()) {
            Entry::Occupied(_) => return Err(SocketError::AlreadyConnected(self.name().to_string())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(client));
            }
        }
        if let Err(e) = client.attach_namespace(self) {
            self.inner.clients.remove(&client.id());
            return Err(e);
        }

        debug!(namespace = %self.inner.name, client = %client.id(), "Client joined namespace");
        let _ = client.send_packet(&Packet::connect(self.name()));
        self.emit(NamespaceEvent::Connect(Arc::clone(client)));
        Ok(())
    }

    /// Remove a client that is still connected, leaving this namespace's
    /// rooms first.
    pub(crate) fn remove_client(&self, client: &Arc<Client>, confirm: bool) -> Result<(), SocketError> {
        let rooms = client.detach_namespace(self.name())?;
        for room in &rooms {
            room.remove_client(client.id());
        }
        self.detach_client(client.id());
        if confirm {
            let _ = client.send_packet(&Packet::disconnect(self.name()));
        }
        Ok(())
    }

    /// Drop a client from the table and emit a disconnect event.
    pub(crate) fn detach_client(&self, id: Uuid) {
        if let Some((_, client)) = self.inner.clients.remove(&id) {
            debug!(namespace = %self.inner.name, client = %id, "Client left namespace");
            self.emit(NamespaceEvent::Disconnect(client));
        }
    }

    /// Wait for room in the event queue.
    pub(crate) async fn acquire_event_permit(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.inner.event_permits)
            .acquire_owned()
            .await
            .ok()
    }

    pub(crate) fn push_event(
        &self,
        client: Arc<Client>,
        name: String,
        data: Value,
        ack: Option<Ack>,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        self.emit(NamespaceEvent::Event {
            client,
            name,
            data,
            ack,
            _permit: permit,
        });
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.inner.name)
            .field("clients", &self.client_count())
            .field("rooms", &self.room_count())
            .field("running", &self.is_running())
            .finish()
    }
}

async fn wait_stopped(running: &mut watch::Receiver<bool>) {
    let _ = running.wait_for(|running| !*running).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn namespace(name: &str, config: ServerConfig) -> Namespace {
        Namespace::new(name, Arc::new(config), Arc::new(Stats::new()))
    }

    #[test]
    fn test_validate_namespace_name() {
        assert!(validate_namespace_name("/chat").is_ok());
        assert!(validate_namespace_name("/").is_ok());
        assert!(validate_namespace_name("").is_err());
        assert!(validate_namespace_name("chat").is_err());
        assert!(validate_namespace_name("/bad\nname").is_err());
        assert!(validate_namespace_name(&format!("/{}", "a".repeat(300))).is_err());
    }

    #[test]
    fn test_room_table() {
        let ns = namespace("/chat", ServerConfig::default());

        let room = ns.add_room("general").unwrap();
        assert_eq!(room.namespace(), "/chat");
        assert!(matches!(ns.add_room("general"), Err(SocketError::RoomExists(_))));
        assert_eq!(ns.room("general").unwrap().id(), room.id());
        assert_eq!(ns.get_or_create_room("general").unwrap().id(), room.id());
        assert_eq!(ns.room_count(), 1);

        ns.remove_room("general").unwrap();
        assert!(room.is_destroyed());
        assert!(matches!(ns.room("general"), Err(SocketError::RoomNotFound(_))));
        assert!(matches!(ns.remove_room("general"), Err(SocketError::RoomNotFound(_))));
    }

    #[test]
    fn test_room_limit() {
        let ns = namespace(
            "/chat",
            ServerConfig {
                max_rooms: 2,
                ..Default::default()
            },
        );
        ns.add_room("a").unwrap();
        ns.get_or_create_room("b").unwrap();
        assert!(matches!(ns.add_room("c"), Err(SocketError::MaxRoomsReached)));
        assert!(matches!(ns.get_or_create_room("c"), Err(SocketError::MaxRoomsReached)));
        // Existing rooms are still reachable at the limit
        assert!(ns.get_or_create_room("a").is_ok());
    }

    #[test]
    fn test_room_stats() {
        let stats = Arc::new(Stats::new());
        let ns = Namespace::new("/", Arc::new(ServerConfig::default()), Arc::clone(&stats));
        ns.add_room("a").unwrap();
        ns.add_room("b").unwrap();
        ns.remove_room("a").unwrap();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.opened_rooms, 2);
        assert_eq!(snapshot.closed_rooms, 1);
    }

    #[tokio::test]
    async fn test_room_listeners() {
        let ns = namespace("/chat", ServerConfig::default());
        let added = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));
        {
            let added = Arc::clone(&added);
            ns.add_room_added_listener(move |_| {
                added.fetch_add(1, Ordering::SeqCst);
            });
            let removed = Arc::clone(&removed);
            ns.add_room_removed_listener(move |room| {
                assert!(room.is_destroyed());
                removed.fetch_add(1, Ordering::SeqCst);
            });
        }
        ns.run();

        ns.add_room("a").unwrap();
        ns.add_room("b").unwrap();
        ns.remove_room("a").unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while removed.load(Ordering::SeqCst) < 1 || added.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_stop_and_restart() {
        let ns = namespace("/chat", ServerConfig::default());
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            ns.add_room_added_listener(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        ns.run();
        assert!(ns.is_running());
        ns.add_room("a").unwrap();
        wait_for(&count, 1).await;

        ns.stop();
        assert!(!ns.is_running());
        // Let the loop observe the stop
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Queued while stopped, dispatched after restart
        ns.add_room("b").unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        ns.run();
        wait_for(&count, 2).await;
    }

    #[tokio::test]
    async fn test_listener_panic_does_not_stop_loop() {
        let ns = namespace("/chat", ServerConfig::default());
        let count = Arc::new(AtomicUsize::new(0));
        ns.add_room_added_listener(|room| {
            if room.name() == "boom" {
                panic!("listener failure");
            }
        });
        {
            let count = Arc::clone(&count);
            ns.add_room_added_listener(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        ns.run();

        ns.add_room("boom").unwrap();
        ns.add_room("fine").unwrap();
        wait_for(&count, 2).await;
        assert!(ns.is_running());
    }

    async fn wait_for(counter: &AtomicUsize, expected: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while counter.load(Ordering::SeqCst) < expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
