//! End-to-end scenarios over in-memory connections.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wisp_core::{Ack, Client, Namespace, Server, SocketError};
use wisp_protocol::{decode, encode, Packet, PacketType};
use wisp_transport::memory::{pair, MemoryPeer};

const TIMEOUT: Duration = Duration::from_secs(2);

async fn connect(server: &Server) -> (Arc<Client>, MemoryPeer) {
    let (conn, mut peer) = pair();
    let client = server.accept(Box::new(conn)).unwrap();
    assert_eq!(next(&mut peer).await, Packet::connect("/"));
    (client, peer)
}

async fn next(peer: &mut MemoryPeer) -> Packet {
    let frame = tokio::time::timeout(TIMEOUT, peer.recv())
        .await
        .expect("timed out waiting for packet")
        .expect("connection closed");
    decode(&frame).unwrap()
}

fn send(peer: &MemoryPeer, packet: &Packet) {
    peer.send(encode(packet).unwrap()).unwrap();
}

async fn join_namespace(peer: &mut MemoryPeer, namespace: &str) {
    send(peer, &Packet::connect(namespace));
    assert_eq!(next(peer).await, Packet::connect(namespace));
}

/// Send an event with an ack id and wait for the reply.
async fn request(peer: &mut MemoryPeer, id: i64, namespace: &str, name: &str, data: Value) -> Value {
    send(peer, &Packet::event_with_ack(id, namespace, name, data));
    let reply = next(peer).await;
    assert_eq!(reply.packet_type, PacketType::Ack);
    assert_eq!(reply.id, Some(id));
    reply.data
}

fn room_commands(namespace: &Namespace) {
    namespace.listen("join", |socket, data| {
        let joined = data
            .as_str()
            .map_or(false, |room| socket.join_room(room).is_ok());
        if let Some(ack) = socket.ack() {
            let _ = ack.send_data(joined);
        }
    });
    namespace.listen("leave", |socket, data| {
        let left = data
            .as_str()
            .map_or(false, |room| socket.leave_room(room).is_ok());
        if let Some(ack) = socket.ack() {
            let _ = ack.send_data(left);
        }
    });
    namespace.listen("say", |socket, data| {
        if let Ok(room) = socket.namespace().room("general") {
            room.send_event("said", data);
        }
    });
}

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn test_join_and_broadcast() {
    let server = Server::default();
    let chat = server.add_namespace("/chat").unwrap();
    room_commands(&chat);
    server.run();

    let (_alice, mut alice_peer) = connect(&server).await;
    let (_bob, mut bob_peer) = connect(&server).await;
    for peer in [&mut alice_peer, &mut bob_peer] {
        join_namespace(peer, "/chat").await;
        assert_eq!(request(peer, 1, "/chat", "join", json!("general")).await, json!(true));
    }
    assert_eq!(chat.room("general").unwrap().client_count(), 2);

    send(&alice_peer, &Packet::event("/chat", "say", json!("hello")));

    for peer in [&mut alice_peer, &mut bob_peer] {
        let packet = next(peer).await;
        assert_eq!(packet, Packet::event("/chat", "said", json!("hello")));
    }
}

#[tokio::test]
async fn test_room_isolation() {
    let server = Server::default();
    room_commands(server.root());
    server.run();

    let (_alice, mut alice_peer) = connect(&server).await;
    let (_bob, mut bob_peer) = connect(&server).await;
    assert_eq!(request(&mut alice_peer, 1, "/", "join", json!("general")).await, json!(true));
    assert_eq!(request(&mut bob_peer, 1, "/", "join", json!("random")).await, json!(true));

    server.room("general").unwrap().send_event("news", json!(1));
    server.room("random").unwrap().send_event("marker", json!(2));

    assert_eq!(next(&mut alice_peer).await.name, "news");
    // Bob's first packet is the marker, not the general broadcast
    assert_eq!(next(&mut bob_peer).await.name, "marker");
}

#[tokio::test]
async fn test_ack_round_trip() {
    let server = Server::default();
    server.listen("ping", |socket, _| {
        if let Some(ack) = socket.ack() {
            ack.send_data("ok").unwrap();
        }
    });
    server.run();

    let (_client, mut peer) = connect(&server).await;
    send(&peer, &Packet::event_with_ack(42, "/", "ping", Value::Null));

    assert_eq!(next(&mut peer).await, Packet::ack(42, "/", json!("ok")));
}

#[tokio::test]
async fn test_event_without_ack_id() {
    let server = Server::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        server.listen("ping", move |socket, data| {
            seen.lock().push((socket.ack().is_some(), data));
        });
    }
    server.run();

    let (_client, peer) = connect(&server).await;
    send(&peer, &Packet::event("/", "ping", json!(1)));
    // An id of zero means no acknowledgement
    send(&peer, &Packet::event_with_ack(0, "/", "ping", json!(2)));

    eventually(|| seen.lock().len() == 2).await;
    assert_eq!(*seen.lock(), vec![(false, json!(1)), (false, json!(2))]);
}

#[tokio::test]
async fn test_late_namespace_registration() {
    let server = Server::default();
    server.run();

    assert!(matches!(
        server.add_namespace("/late"),
        Err(SocketError::ServerAlreadyRunning)
    ));
    assert!(server.namespaces().is_empty());
    assert!(server.namespace("/late").is_none());
}

#[tokio::test]
async fn test_disconnect_cleanup() {
    let server = Server::default();
    let chat = server.add_namespace("/chat").unwrap();
    room_commands(&chat);
    let chat_disconnects = Arc::new(AtomicUsize::new(0));
    let root_disconnects = Arc::new(AtomicUsize::new(0));
    {
        let counter = Arc::clone(&chat_disconnects);
        chat.add_disconnect_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&root_disconnects);
        server.add_disconnect_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    server.run();

    let (client, mut peer) = connect(&server).await;
    join_namespace(&mut peer, "/chat").await;
    request(&mut peer, 1, "/chat", "join", json!("general")).await;
    let room = chat.room("general").unwrap();
    assert!(room.has_client(client.id()));

    client.disconnect();
    client.disconnect();

    assert!(!client.is_open());
    assert!(client.rooms().is_empty());
    assert!(client.namespaces().is_empty());
    assert_eq!(room.client_count(), 0);
    assert_eq!(chat.client_count(), 0);
    assert_eq!(server.client_count(), 0);

    let stats = server.stats();
    assert_eq!(stats.opened_connections, 1);
    assert_eq!(stats.closed_connections, 1);
    assert_eq!(stats.connection_failures, 0);

    eventually(|| {
        chat_disconnects.load(Ordering::SeqCst) == 1 && root_disconnects.load(Ordering::SeqCst) == 1
    })
    .await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(chat_disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(root_disconnects.load(Ordering::SeqCst), 1);

    // Graceful self-disconnect sends no Disconnect packet
    while let Some(frame) = peer.recv().await {
        assert_ne!(decode(&frame).unwrap().packet_type, PacketType::Disconnect);
    }
}

#[tokio::test]
async fn test_ack_on_disconnected_client() {
    let server = Server::default();
    let pending: Arc<Mutex<Option<Ack>>> = Arc::new(Mutex::new(None));
    {
        let pending = Arc::clone(&pending);
        server.listen("slow", move |socket, _| {
            *pending.lock() = socket.ack().cloned();
        });
    }
    server.run();

    let (client, mut peer) = connect(&server).await;
    send(&peer, &Packet::event_with_ack(9, "/", "slow", Value::Null));
    eventually(|| pending.lock().is_some()).await;

    client.disconnect();
    let ack = pending.lock().take().unwrap();
    assert_eq!(ack.id(), 9);
    assert!(ack.send_data("too late").is_ok());

    while let Some(frame) = peer.recv().await {
        assert_ne!(decode(&frame).unwrap().packet_type, PacketType::Ack);
    }
    assert_eq!(server.stats().packet_failures, 0);
}

#[tokio::test]
async fn test_listener_fifo_order() {
    let server = Server::default();
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 1..=3 {
        let order = Arc::clone(&order);
        server.listen("tick", move |_, data| {
            order.lock().push((data, i));
        });
    }
    server.run();

    let (_client, peer) = connect(&server).await;
    send(&peer, &Packet::event("/", "tick", json!("a")));
    send(&peer, &Packet::event("/", "tick", json!("b")));

    eventually(|| order.lock().len() == 6).await;
    assert_eq!(
        *order.lock(),
        vec![
            (json!("a"), 1),
            (json!("a"), 2),
            (json!("a"), 3),
            (json!("b"), 1),
            (json!("b"), 2),
            (json!("b"), 3),
        ]
    );
}

#[tokio::test]
async fn test_registration_before_event_is_applied() {
    let server = Server::default();
    server.run();
    let (_client, peer) = connect(&server).await;

    let hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = Arc::clone(&hits);
        server.listen("late", move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }
    send(&peer, &Packet::event("/", "late", Value::Null));

    eventually(|| hits.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn test_namespace_isolation() {
    let server = Server::default();
    let a = server.add_namespace("/a").unwrap();
    let b = server.add_namespace("/b").unwrap();
    let a_hits = Arc::new(AtomicUsize::new(0));
    let b_hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = Arc::clone(&a_hits);
        a.listen("msg", move |socket, _| {
            hits.fetch_add(1, Ordering::SeqCst);
            if let Some(ack) = socket.ack() {
                let _ = ack.send_data("a");
            }
        });
        let hits = Arc::clone(&b_hits);
        b.listen("msg", move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }
    server.run();

    let (_client, mut peer) = connect(&server).await;
    join_namespace(&mut peer, "/a").await;
    join_namespace(&mut peer, "/b").await;

    let reply = request(&mut peer, 5, "/a", "msg", Value::Null).await;
    assert_eq!(reply, json!("a"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(a_hits.load(Ordering::SeqCst), 1);
    assert_eq!(b_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_membership_symmetry() {
    let server = Server::default();
    let chat = server.add_namespace("/chat").unwrap();
    room_commands(&chat);
    server.run();

    let (client, mut peer) = connect(&server).await;
    join_namespace(&mut peer, "/chat").await;
    for room in ["r1", "r2", "r3"] {
        assert_eq!(request(&mut peer, 1, "/chat", "join", json!(room)).await, json!(true));
    }
    assert_eq!(request(&mut peer, 2, "/chat", "leave", json!("r1")).await, json!(true));
    chat.remove_room("r2").unwrap();

    let client_rooms: Vec<String> = client.rooms().iter().map(|r| r.name().to_string()).collect();
    assert_eq!(client_rooms, vec!["r3".to_string()]);
    for room in chat.rooms() {
        assert_eq!(
            room.has_client(client.id()),
            client.rooms().iter().any(|r| r.id() == room.id()),
            "room {} out of sync",
            room.name()
        );
    }

    // Joining a room that no longer exists recreates it
    assert_eq!(request(&mut peer, 3, "/chat", "join", json!("r2")).await, json!(true));
    let recreated = chat.room("r2").unwrap();
    assert!(recreated.has_client(client.id()));
}

#[tokio::test]
async fn test_leave_namespace_keeps_connection() {
    let server = Server::default();
    let chat = server.add_namespace("/chat").unwrap();
    room_commands(&chat);
    server.run();

    let (client, mut peer) = connect(&server).await;
    join_namespace(&mut peer, "/chat").await;
    request(&mut peer, 1, "/chat", "join", json!("general")).await;

    send(&peer, &Packet::disconnect("/chat"));
    assert_eq!(next(&mut peer).await, Packet::disconnect("/chat"));

    assert!(client.is_open());
    assert!(!client.in_namespace("/chat"));
    assert!(client.in_namespace("/"));
    assert!(client.rooms().is_empty());
    assert_eq!(chat.room("general").unwrap().client_count(), 0);

    // Leaving again is rejected with an error packet
    send(&peer, &Packet::disconnect("/chat"));
    let reply = next(&mut peer).await;
    assert_eq!(reply.packet_type, PacketType::Error);
    assert_eq!(reply.error_body().unwrap().code, SocketError::NotConnected(String::new()).code());

    // Joining twice is rejected
    join_namespace(&mut peer, "/chat").await;
    send(&peer, &Packet::connect("/chat"));
    let reply = next(&mut peer).await;
    assert_eq!(
        reply.error_body().unwrap().code,
        SocketError::AlreadyConnected(String::new()).code()
    );
}

#[tokio::test]
async fn test_transport_failure() {
    let server = Server::default();
    let chat = server.add_namespace("/chat").unwrap();
    room_commands(&chat);
    server.run();

    let (client, mut peer) = connect(&server).await;
    join_namespace(&mut peer, "/chat").await;
    request(&mut peer, 1, "/chat", "join", json!("general")).await;

    peer.fail("connection reset");
    tokio::time::timeout(TIMEOUT, client.closed()).await.unwrap();

    assert!(!client.is_open());
    assert_eq!(chat.room("general").unwrap().client_count(), 0);
    assert_eq!(chat.client_count(), 0);
    let stats = server.stats();
    assert_eq!(stats.connection_failures, 1);
    assert_eq!(stats.closed_connections, 1);
}

#[tokio::test]
async fn test_connect_listener_receives_scoped_view() {
    let server = Server::default();
    let chat = server.add_namespace("/chat").unwrap();
    chat.add_connect_listener(|socket| {
        socket.store().set("joined", json!(socket.namespace().name()));
        let _ = socket.send_event("welcome", json!({"id": socket.id().to_string()}));
    });
    server.run();

    let (client, mut peer) = connect(&server).await;
    join_namespace(&mut peer, "/chat").await;

    let welcome = next(&mut peer).await;
    assert_eq!(welcome.endpoint, "/chat");
    assert_eq!(welcome.name, "welcome");
    assert_eq!(welcome.data["id"], json!(client.id().to_string()));
    assert_eq!(client.store().get("joined"), Some(json!("/chat")));
}
