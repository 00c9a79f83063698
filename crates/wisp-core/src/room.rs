//! Rooms: named broadcast groups inside a namespace.

use crate::client::Client;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;
use wisp_protocol::{encode, Packet};

/// A named broadcast group scoped to one namespace.
///
/// Membership is guarded by the room's own lock. Broadcasts copy the member
/// list and send with no lock held, so [`Room::destroy`] never waits on an
/// in-flight broadcast.
pub struct Room {
    id: Uuid,
    name: String,
    namespace: String,
    members: RwLock<HashMap<Uuid, Arc<Client>>>,
    destroyed: AtomicBool,
}

impl Room {
    pub(crate) fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            namespace: namespace.into(),
            members: RwLock::new(HashMap::new()),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Unique room id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Room name, unique within its namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Number of members.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.members.read().len()
    }

    /// Check if a client is a member.
    #[must_use]
    pub fn has_client(&self, id: Uuid) -> bool {
        self.members.read().contains_key(&id)
    }

    /// Current members.
    #[must_use]
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.members.read().values().cloned().collect()
    }

    /// Whether the room was destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Add a member. Returns `false` if the room was destroyed.
    pub(crate) fn add_client(&self, client: &Arc<Client>) -> bool {
        let mut members = self.members.write();
        if self.destroyed.load(Ordering::Acquire) {
            return false;
        }
        if members.insert(client.id(), Arc::clone(client)).is_none() {
            debug!(room = %self.name, namespace = %self.namespace, client = %client.id(), "Joined room");
        }
        true
    }

    /// Remove a member. Returns `true` if it was present.
    pub(crate) fn remove_client(&self, id: Uuid) -> bool {
        let removed = self.members.write().remove(&id).is_some();
        if removed {
            debug!(room = %self.name, namespace = %self.namespace, client = %id, "Left room");
        }
        removed
    }

    /// Broadcast an event to every member.
    ///
    /// The packet is addressed to the room's namespace and encoded once.
    /// Returns the number of members it was queued for; closed members are
    /// skipped, as are members whose capped outbound queue is full.
    pub fn send_event(&self, name: &str, data: Value) -> usize {
        let packet = Packet::event(self.namespace.as_str(), name, data);
        let frame = match encode(&packet) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(room = %self.name, error = %e, "Failed to encode room event");
                return 0;
            }
        };

        let members = self.clients();
        let mut sent = 0;
        for client in &members {
            if client.is_open() && client.send_raw(frame.clone()).is_ok() {
                sent += 1;
            }
        }
        trace!(room = %self.name, event = %name, recipients = sent, "Room broadcast");
        sent
    }

    /// Destroy the room, forcing every member to leave.
    ///
    /// Later joins are rejected.
    pub(crate) fn destroy(&self) {
        let members = {
            let mut members = self.members.write();
            self.destroyed.store(true, Ordering::Release);
            std::mem::take(&mut *members)
        };
        for client in members.values() {
            client.detach_room(self.id);
        }
        debug!(room = %self.name, namespace = %self.namespace, evicted = members.len(), "Room destroyed");
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("clients", &self.client_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
