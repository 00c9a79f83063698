//! Client connections.
//!
//! A [`Client`] is one live connection. It owns a read pump that decodes and
//! routes inbound packets, a write pump that drains the outbound queue to the
//! transport, its namespace and room memberships, and a [`Store`].
//!
//! ## Lifecycle
//!
//! ```text
//!   accept ──▶ Open ──(disconnect / EOF / transport error)──▶ Closed
//! ```
//!
//! Teardown runs exactly once: it leaves every room and namespace, destroys
//! the store and signals both pumps. The write pump flushes frames that were
//! already queued and then closes the transport.

use crate::ack::Ack;
use crate::error::{SendError, SocketError};
use crate::namespace::Namespace;
use crate::room::Room;
use crate::server::ServerShared;
use crate::stats::Stat;
use crate::store::Store;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;
use wisp_protocol::{decode, encode, Packet, PacketType, ROOT_ENDPOINT};
use wisp_transport::{Connection, FrameReader, FrameWriter};

/// Outcome of pushing a frame onto the outbound queue.
enum Enqueue {
    Queued,
    Full,
    Closed,
}

#[derive(Default)]
struct Memberships {
    namespaces: HashMap<String, Namespace>,
    rooms: HashMap<Uuid, Arc<Room>>,
}

/// One live connection.
pub struct Client {
    id: Uuid,
    remote_addr: Option<String>,
    shared: Arc<ServerShared>,
    memberships: Mutex<Memberships>,
    store: Box<dyn Store>,
    outbound: mpsc::UnboundedSender<Bytes>,
    // Frames queued but not yet taken by the write pump. Only tracked when
    // `outbound_queue_size` caps the queue.
    queued: AtomicUsize,
    capacity: Notify,
    open: AtomicBool,
    closed: watch::Sender<bool>,
}

impl Client {
    /// Create a client for an upgraded connection, join it to the root
    /// namespace and start its pumps.
    pub(crate) fn spawn(
        shared: Arc<ServerShared>,
        connection: Box<dyn Connection>,
    ) -> Result<Arc<Self>, SocketError> {
        let remote_addr = connection.remote_addr();
        let (reader, writer) = connection.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);

        let client = Arc::new(Self {
            id: Uuid::new_v4(),
            remote_addr,
            store: (shared.store_factory)(),
            memberships: Mutex::new(Memberships::default()),
            outbound,
            queued: AtomicUsize::new(0),
            capacity: Notify::new(),
            open: AtomicBool::new(true),
            closed,
            shared,
        });
        client.shared.stats.inc(Stat::OpenedConnections);

        let root = client.shared.root.clone();
        if let Err(e) = root.add_client(&client) {
            client.teardown(None);
            return Err(e);
        }

        tokio::spawn(Arc::clone(&client).write_pump(writer, outbound_rx));
        tokio::spawn(Arc::clone(&client).read_pump(reader));

        info!(
            client = %client.id,
            remote = ?client.remote_addr,
            "Client connected"
        );
        Ok(client)
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remote address reported by the transport.
    #[must_use]
    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    /// Whether the connection is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Per-connection key/value storage.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Names of the joined namespaces.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        self.memberships.lock().namespaces.keys().cloned().collect()
    }

    /// Check if the client joined a namespace.
    #[must_use]
    pub fn in_namespace(&self, name: &str) -> bool {
        self.memberships.lock().namespaces.contains_key(name)
    }

    /// Joined rooms across all namespaces.
    #[must_use]
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.memberships.lock().rooms.values().cloned().collect()
    }

    /// Joined rooms in one namespace.
    #[must_use]
    pub fn rooms_in(&self, namespace: &str) -> Vec<Arc<Room>> {
        self.memberships
            .lock()
            .rooms
            .values()
            .filter(|room| room.namespace() == namespace)
            .cloned()
            .collect()
    }

    /// Queue an encoded frame without waiting.
    ///
    /// The outbound queue is unbounded unless `outbound_queue_size` sets a
    /// cap. Frames for a closed client are dropped and `Ok` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::QueueFull`] if a capped queue is full.
    pub fn send_raw(&self, frame: Bytes) -> Result<(), SendError> {
        match self.enqueue(frame) {
            Enqueue::Queued => Ok(()),
            Enqueue::Full => {
                warn!(client = %self.id, "Outbound queue full, dropping frame");
                self.shared.stats.inc(Stat::PacketFailures);
                Err(SendError::QueueFull)
            }
            Enqueue::Closed => {
                trace!(client = %self.id, "Dropping frame for closed client");
                Ok(())
            }
        }
    }

    /// Encode and queue a packet without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet cannot be encoded or a capped outbound
    /// queue is full.
    pub fn send_packet(&self, packet: &Packet) -> Result<(), SendError> {
        let frame = encode(packet)?;
        trace!(client = %self.id, packet_type = ?packet.packet_type, endpoint = %packet.endpoint, "Queue packet");
        self.send_raw(frame)
    }

    /// Encode and queue a packet, waiting for room in a capped outbound
    /// queue.
    ///
    /// Returns `Ok` without sending if the client closes first.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet cannot be encoded.
    pub async fn send_packet_wait(&self, packet: &Packet) -> Result<(), SendError> {
        let frame = encode(packet)?;
        let mut closed = self.closed.subscribe();
        loop {
            let capacity = self.capacity.notified();
            tokio::pin!(capacity);
            // Register before checking so a drain in between is not missed.
            capacity.as_mut().enable();

            match self.enqueue(frame.clone()) {
                Enqueue::Queued => return Ok(()),
                Enqueue::Closed => {
                    trace!(client = %self.id, "Dropping packet for closed client");
                    return Ok(());
                }
                Enqueue::Full => {
                    trace!(client = %self.id, "Waiting for outbound capacity");
                    tokio::select! {
                        () = &mut capacity => {}
                        () = wait_closed(&mut closed) => return Ok(()),
                    }
                }
            }
        }
    }

    fn enqueue(&self, frame: Bytes) -> Enqueue {
        if !self.is_open() {
            return Enqueue::Closed;
        }
        let cap = self.shared.config.outbound_queue_size;
        if cap > 0
            && self
                .queued
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < cap).then_some(n + 1))
                .is_err()
        {
            return Enqueue::Full;
        }
        match self.outbound.send(frame) {
            Ok(()) => Enqueue::Queued,
            Err(_) => {
                // The write pump only exits after teardown.
                self.dequeued();
                Enqueue::Closed
            }
        }
    }

    fn dequeued(&self) {
        if self.shared.config.outbound_queue_size > 0 {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            self.capacity.notify_waiters();
        }
    }

    /// Send a named event addressed to a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet cannot be encoded or the outbound queue
    /// is full.
    pub fn send_event(&self, endpoint: &str, name: &str, data: Value) -> Result<(), SendError> {
        self.send_packet(&Packet::event(endpoint, name, data))
    }

    /// Close the connection.
    ///
    /// Leaves every room and namespace and releases the store. Calling this
    /// more than once has no further effect.
    pub fn disconnect(&self) {
        self.teardown(None);
    }

    /// Wait until the connection is closed.
    pub async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        wait_closed(&mut closed).await;
    }

    pub(crate) fn attach_namespace(&self, namespace: &Namespace) -> Result<(), SocketError> {
        let mut memberships = self.memberships.lock();
        if !self.is_open() {
            return Err(SocketError::ClientClosed);
        }
        if memberships.namespaces.contains_key(namespace.name()) {
            return Err(SocketError::AlreadyConnected(namespace.name().to_string()));
        }
        memberships
            .namespaces
            .insert(namespace.name().to_string(), namespace.clone());
        Ok(())
    }

    /// Forget a namespace and return the rooms of that namespace the client
    /// was in.
    pub(crate) fn detach_namespace(&self, name: &str) -> Result<Vec<Arc<Room>>, SocketError> {
        let mut memberships = self.memberships.lock();
        if memberships.namespaces.remove(name).is_none() {
            return Err(SocketError::NotConnected(name.to_string()));
        }
        let ids: Vec<Uuid> = memberships
            .rooms
            .values()
            .filter(|room| room.namespace() == name)
            .map(|room| room.id())
            .collect();
        Ok(ids
            .into_iter()
            .filter_map(|id| memberships.rooms.remove(&id))
            .collect())
    }

    /// Join a room. Both sides of the membership are updated.
    pub(crate) fn join_room(self: &Arc<Self>, room: &Arc<Room>) -> Result<(), SocketError> {
        if !room.add_client(self) {
            return Err(SocketError::RoomNotFound(room.name().to_string()));
        }

        let attached = {
            let mut memberships = self.memberships.lock();
            if !self.is_open() {
                Err(SocketError::ClientClosed)
            } else if !memberships.namespaces.contains_key(room.namespace()) {
                Err(SocketError::NotConnected(room.namespace().to_string()))
            } else {
                memberships.rooms.insert(room.id(), Arc::clone(room));
                Ok(())
            }
        };
        if let Err(e) = attached {
            room.remove_client(self.id);
            return Err(e);
        }

        // Destroyed between the two halves: its eviction may have missed us.
        if room.is_destroyed() {
            self.detach_room(room.id());
            return Err(SocketError::RoomNotFound(room.name().to_string()));
        }
        Ok(())
    }

    /// Leave a room. Leaving a room the client is not in is a no-op.
    pub(crate) fn leave_room(&self, room: &Room) {
        self.memberships.lock().rooms.remove(&room.id());
        room.remove_client(self.id);
    }

    pub(crate) fn detach_room(&self, room_id: Uuid) {
        self.memberships.lock().rooms.remove(&room_id);
    }

    fn teardown(&self, failure: Option<&SocketError>) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }

        let memberships = std::mem::take(&mut *self.memberships.lock());
        for room in memberships.rooms.values() {
            room.remove_client(self.id);
        }
        for namespace in memberships.namespaces.values() {
            namespace.detach_client(self.id);
        }

        let stats = &self.shared.stats;
        stats.inc(Stat::ClosedConnections);
        match failure {
            Some(e) => {
                stats.inc(Stat::ConnectionFailures);
                warn!(client = %self.id, error = %e, "Client connection failed");
            }
            None => info!(client = %self.id, "Client disconnected"),
        }

        self.store.destroy();
        self.shared.release_connection();
        self.closed.send_replace(true);
    }

    fn lookup_namespace(&self, endpoint: &str) -> Result<Namespace, SocketError> {
        if endpoint.is_empty() {
            return Err(SocketError::MissingEndpoint);
        }
        self.shared
            .namespace(endpoint)
            .ok_or_else(|| SocketError::NamespaceNotFound(endpoint.to_string()))
    }

    fn joined_namespace(&self, endpoint: &str) -> Result<Namespace, SocketError> {
        if endpoint.is_empty() {
            return Err(SocketError::MissingEndpoint);
        }
        self.memberships
            .lock()
            .namespaces
            .get(endpoint)
            .cloned()
            .ok_or_else(|| SocketError::NotConnected(endpoint.to_string()))
    }

    async fn read_pump(self: Arc<Self>, mut reader: Box<dyn FrameReader>) {
        debug!(client = %self.id, "Read pump started");
        let mut closed = self.closed.subscribe();

        loop {
            let frame = tokio::select! {
                biased;
                () = wait_closed(&mut closed) => break,
                frame = reader.recv() => frame,
            };

            match frame {
                Ok(Some(frame)) => self.handle_frame(&frame, &mut closed).await,
                Ok(None) => {
                    debug!(client = %self.id, "Peer closed connection");
                    self.teardown(None);
                    break;
                }
                Err(e) => {
                    self.teardown(Some(&SocketError::ConnectionFailure(e)));
                    break;
                }
            }
        }

        debug!(client = %self.id, "Read pump stopped");
    }

    async fn write_pump(
        self: Arc<Self>,
        mut writer: Box<dyn FrameWriter>,
        mut outbound: mpsc::UnboundedReceiver<Bytes>,
    ) {
        debug!(client = %self.id, "Write pump started");
        let mut closed = self.closed.subscribe();

        loop {
            tokio::select! {
                biased;
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    self.dequeued();
                    if let Err(e) = writer.send(frame).await {
                        self.teardown(Some(&SocketError::ConnectionFailure(e)));
                        break;
                    }
                }
                () = wait_closed(&mut closed) => {
                    while let Ok(frame) = outbound.try_recv() {
                        if writer.send(frame).await.is_err() {
                            break;
                        }
                    }
                    break;
                }
            }
        }

        if let Err(e) = writer.close().await {
            trace!(client = %self.id, error = %e, "Transport close failed");
        }
        debug!(client = %self.id, "Write pump stopped");
    }

    async fn handle_frame(self: &Arc<Self>, frame: &[u8], closed: &mut watch::Receiver<bool>) {
        let packet = match decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(client = %self.id, error = %e, "Dropping undecodable packet");
                self.shared.stats.inc(Stat::PacketFailures);
                return;
            }
        };

        let endpoint = packet.endpoint.clone();
        if let Err(e) = self.route(packet, closed).await {
            warn!(client = %self.id, endpoint = %endpoint, error = %e, "Failed to route packet");
            self.shared.stats.inc(Stat::PacketFailures);
            let _ = self.send_packet(&Packet::error(endpoint, e.code(), e.to_string()));
        }
    }

    async fn route(
        self: &Arc<Self>,
        packet: Packet,
        closed: &mut watch::Receiver<bool>,
    ) -> Result<(), SocketError> {
        match packet.packet_type {
            PacketType::Connect => {
                let namespace = self.lookup_namespace(&packet.endpoint)?;
                namespace.add_client(self)
            }
            PacketType::Disconnect => {
                if packet.endpoint == ROOT_ENDPOINT {
                    self.disconnect();
                    return Ok(());
                }
                let namespace = self.joined_namespace(&packet.endpoint)?;
                namespace.remove_client(self, true)
            }
            PacketType::Event | PacketType::Ack => {
                let namespace = self.joined_namespace(&packet.endpoint)?;
                let ack = packet
                    .ack_id()
                    .map(|id| Ack::new(id, Arc::clone(self), namespace.name()));

                let permit = tokio::select! {
                    biased;
                    () = wait_closed(closed) => return Ok(()),
                    permit = namespace.acquire_event_permit() => permit,
                };
                namespace.push_event(Arc::clone(self), packet.name, packet.data, ack, permit);
                Ok(())
            }
            PacketType::Error => {
                debug!(client = %self.id, body = ?packet.error_body(), "Client reported error");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}
