//! End-to-end tests for live connections over a real listener.

use futures::{SinkExt, StreamExt};
use murmur_node::api::{create_router, AppState};
use murmur_realtime::{ConnectionConfig, HubConfig, HubHandle};
use murmur_storage::{MemoryStore, MessageStore};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    hub: HubHandle,
}

async fn spawn_server() -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(
        store.clone(),
        HubConfig::default(),
        ConnectionConfig::default(),
    );
    let hub = state.hub.clone();
    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, store, hub }
}

async fn connect(server: &TestServer, sender: &str) -> Client {
    let url = format!("ws://{}/ws?sender={}", server.addr, sender);
    let (client, _) = connect_async(url).await.unwrap();
    client
}

/// Waits until the hub reports `expected` registered connections.
async fn wait_for_clients(hub: &HubHandle, expected: usize) {
    tokio::time::timeout(WAIT, async {
        while hub.client_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {} connected clients", expected));
}

/// Reads the next text frame, skipping control frames.
async fn next_text(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .expect("transport error");

        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Drains the connection until the server ends it.
async fn wait_for_close(client: &mut Client) {
    tokio::time::timeout(WAIT, async {
        while let Some(frame) = client.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await
    .expect("connection was not closed");
}

#[tokio::test]
async fn test_message_reaches_every_peer() {
    let server = spawn_server().await;

    let mut alice = connect(&server, "alice").await;
    let mut bob = connect(&server, "bob").await;
    wait_for_clients(&server.hub, 2).await;

    alice
        .send(Message::text(
            json!({"type": "message", "content": "Hi"}).to_string(),
        ))
        .await
        .unwrap();

    let to_alice = next_text(&mut alice).await;
    let to_bob = next_text(&mut bob).await;

    for envelope in [&to_alice, &to_bob] {
        assert_eq!(envelope["type"], "message");
        assert_eq!(envelope["sender"], "alice");
        assert_eq!(envelope["content"], "Hi");
        assert!(envelope["created_at"].is_string());
    }
    assert_eq!(to_alice["id"], to_bob["id"]);

    // Persisted exactly once, before delivery
    let stored = server.store.list().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(to_bob["id"], stored[0].id.as_str());
}

#[tokio::test]
async fn test_unknown_frames_are_ignored() {
    let server = spawn_server().await;

    let mut alice = connect(&server, "alice").await;
    wait_for_clients(&server.hub, 1).await;

    alice
        .send(Message::text(r#"{"type":"typing"}"#))
        .await
        .unwrap();
    alice.send(Message::text("not json")).await.unwrap();
    alice
        .send(Message::text(r#"{"type":"message","content":"still here"}"#))
        .await
        .unwrap();

    let envelope = next_text(&mut alice).await;
    assert_eq!(envelope["content"], "still here");
    assert_eq!(server.store.len(), 1);
    assert_eq!(server.hub.client_count(), 1);
}

#[tokio::test]
async fn test_client_close_unregisters() {
    let server = spawn_server().await;

    let mut alice = connect(&server, "alice").await;
    let bob = connect(&server, "bob").await;
    wait_for_clients(&server.hub, 2).await;

    drop(bob);
    wait_for_clients(&server.hub, 1).await;

    alice.close(None).await.unwrap();
    wait_for_clients(&server.hub, 0).await;
}

#[tokio::test]
async fn test_oversized_frame_terminates_connection() {
    let server = spawn_server().await;

    let mut alice = connect(&server, "alice").await;
    wait_for_clients(&server.hub, 1).await;

    let content = "x".repeat(1024);
    let _ = alice
        .send(Message::text(
            json!({"type": "message", "content": content}).to_string(),
        ))
        .await;

    wait_for_close(&mut alice).await;
    wait_for_clients(&server.hub, 0).await;
    assert!(server.store.is_empty());
}

#[tokio::test]
async fn test_messages_arrive_in_order() {
    let server = spawn_server().await;

    let mut alice = connect(&server, "alice").await;
    let mut bob = connect(&server, "bob").await;
    wait_for_clients(&server.hub, 2).await;

    for i in 0..10 {
        alice
            .send(Message::text(
                json!({"type": "message", "content": format!("m{}", i)}).to_string(),
            ))
            .await
            .unwrap();
    }

    for i in 0..10 {
        let envelope = next_text(&mut bob).await;
        assert_eq!(envelope["content"], format!("m{}", i));
    }
    assert_eq!(server.store.len(), 10);
}
