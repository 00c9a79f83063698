//! Built-in room commands.
//!
//! Every namespace served by the binary understands three events:
//!
//! | Event     | Data                          | Effect                     |
//! |-----------|-------------------------------|----------------------------|
//! | `join`    | room name                     | join (or create) the room  |
//! | `leave`   | room name                     | leave the room             |
//! | `publish` | `{"room", "name", "data"}`    | broadcast to the room      |
//!
//! When the event carries an ack id the client receives `{"ok": true}` or
//! `{"ok": false, "error": "..."}`.

use crate::metrics;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use wisp_core::{Namespace, SocketClient};

pub const JOIN: &str = "join";
pub const LEAVE: &str = "leave";
pub const PUBLISH: &str = "publish";

#[derive(Debug, Deserialize)]
struct PublishRequest {
    room: String,
    name: String,
    #[serde(default)]
    data: Value,
}

/// Register the room commands on a namespace.
pub fn install(namespace: &Namespace) {
    namespace.listen(JOIN, |socket, data| {
        let result = room_name(&data).and_then(|room| {
            socket
                .join_room(room)
                .map(|_| ())
                .map_err(|e| e.to_string())
        });
        reply(&socket, JOIN, result);
    });

    namespace.listen(LEAVE, |socket, data| {
        let result = room_name(&data)
            .and_then(|room| socket.leave_room(room).map_err(|e| e.to_string()));
        reply(&socket, LEAVE, result);
    });

    namespace.listen(PUBLISH, |socket, data| {
        let result = serde_json::from_value::<PublishRequest>(data)
            .map_err(|e| format!("invalid publish request: {e}"))
            .and_then(|request| {
                let room = socket
                    .namespace()
                    .room(&request.room)
                    .map_err(|e| e.to_string())?;
                let recipients = room.send_event(&request.name, request.data);
                debug!(
                    client = %socket.id(),
                    room = %request.room,
                    recipients,
                    "Published"
                );
                Ok(())
            });
        reply(&socket, PUBLISH, result);
    });
}

fn room_name(data: &Value) -> Result<&str, String> {
    data.as_str()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| "expected a room name".to_string())
}

fn reply(socket: &SocketClient, command: &str, result: Result<(), String>) {
    metrics::record_command(command);
    let body = match result {
        Ok(()) => json!({ "ok": true }),
        Err(error) => {
            debug!(client = %socket.id(), command, error = %error, "Command failed");
            metrics::record_error(command);
            json!({ "ok": false, "error": error })
        }
    };
    if let Some(ack) = socket.ack() {
        if let Err(e) = ack.send_data(body) {
            warn!(client = %socket.id(), command, error = %e, "Failed to acknowledge command");
        }
    }
}
