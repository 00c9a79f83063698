//! Listener registry for a namespace.
//!
//! Listeners are only ever touched by the namespace loop. Callers register
//! through a [`Registration`] message so registration and dispatch are
//! serialized on the same queue owner.

use crate::room::Room;
use crate::socket::SocketClient;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

pub(crate) type ClientListener = Box<dyn Fn(SocketClient) + Send + Sync>;
pub(crate) type EventListener = Box<dyn Fn(SocketClient, Value) + Send + Sync>;
pub(crate) type RoomListener = Box<dyn Fn(Arc<Room>) + Send + Sync>;

/// A request to add a listener.
pub(crate) enum Registration {
    Connect(ClientListener),
    Disconnect(ClientListener),
    RoomAdded(RoomListener),
    RoomRemoved(RoomListener),
    Event(String, EventListener),
}

#[derive(Default)]
pub(crate) struct Listeners {
    connect: Vec<ClientListener>,
    disconnect: Vec<ClientListener>,
    room_added: Vec<RoomListener>,
    room_removed: Vec<RoomListener>,
    events: HashMap<String, Vec<EventListener>>,
}

impl Listeners {
    pub(crate) fn register(&mut self, registration: Registration) {
        match registration {
            Registration::Connect(f) => self.connect.push(f),
            Registration::Disconnect(f) => self.disconnect.push(f),
            Registration::RoomAdded(f) => self.room_added.push(f),
            Registration::RoomRemoved(f) => self.room_removed.push(f),
            Registration::Event(name, f) => self.events.entry(name).or_default().push(f),
        }
    }

    pub(crate) fn connected(&self, socket: &SocketClient) {
        for f in &self.connect {
            guarded(socket.namespace().name(), "connect", || f(socket.clone()));
        }
    }

    pub(crate) fn disconnected(&self, socket: &SocketClient) {
        for f in &self.disconnect {
            guarded(socket.namespace().name(), "disconnect", || f(socket.clone()));
        }
    }

    pub(crate) fn room_added(&self, namespace: &str, room: &Arc<Room>) {
        for f in &self.room_added {
            guarded(namespace, "room_added", || f(Arc::clone(room)));
        }
    }

    pub(crate) fn room_removed(&self, namespace: &str, room: &Arc<Room>) {
        for f in &self.room_removed {
            guarded(namespace, "room_removed", || f(Arc::clone(room)));
        }
    }

    /// Invoke the listeners for `name` in registration order.
    ///
    /// Returns the number of listeners invoked.
    pub(crate) fn event(&self, name: &str, socket: &SocketClient, data: &Value) -> usize {
        let Some(listeners) = self.events.get(name) else {
            return 0;
        };
        for f in listeners {
            guarded(socket.namespace().name(), name, || {
                f(socket.clone(), data.clone());
            });
        }
        listeners.len()
    }
}

fn guarded(namespace: &str, listener: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(namespace = %namespace, listener = %listener, "Listener panicked");
    }
}
