//! End-to-end tests driving real WebSocket clients against the relay.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chat_relay::{query_members, serve, ChatServer, ServerCommand, ServerConfig};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Relay running in-process on an ephemeral port
struct TestRelay {
    url: String,
    cmd_tx: mpsc::Sender<ServerCommand>,
    shutdown_tx: watch::Sender<bool>,
    listener_task: JoinHandle<()>,
}

impl TestRelay {
    async fn start() -> Self {
        Self::start_with(ServerConfig::default()).await
    }

    async fn start_with(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
        tokio::spawn(ChatServer::new(cmd_rx).run());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener_task = tokio::spawn(serve(listener, cmd_tx.clone(), Arc::new(config), shutdown_rx));

        TestRelay {
            url,
            cmd_tx,
            shutdown_tx,
            listener_task,
        }
    }

    async fn connect(&self) -> Ws {
        let (ws, _) = connect_async(self.url.as_str()).await.unwrap();
        ws
    }

    async fn members(&self, room: &str) -> Vec<String> {
        query_members(&self.cmd_tx, room).await.unwrap()
    }
}

async fn send(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next JSON event, skipping control frames
async fn next_event(ws: &mut Ws) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn next_users(ws: &mut Ws) -> Vec<String> {
    let event = next_event(ws).await;
    assert_eq!(event["type"], "userlist", "unexpected event {event}");
    let mut users: Vec<String> = serde_json::from_value(event["users"].clone()).unwrap();
    users.sort();
    users
}

/// Assert nothing but control frames arrives for a short while
async fn assert_silent(ws: &mut Ws) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
    while let Ok(msg) = tokio::time::timeout_at(deadline, ws.next()).await {
        match msg {
            Some(Ok(Message::Text(text))) => panic!("unexpected event {text}"),
            Some(Ok(_)) => continue,
            _ => break,
        }
    }
}

#[tokio::test]
async fn test_chat_scenario() {
    let relay = TestRelay::start().await;
    let mut alice = relay.connect().await;
    let mut bob = relay.connect().await;

    send(&mut alice, json!({"type": "login", "nick": "alice", "channel": "r1"})).await;
    assert_eq!(next_users(&mut alice).await, vec!["alice"]);

    send(&mut bob, json!({"type": "login", "nick": "bob", "channel": "r1"})).await;
    assert_eq!(next_users(&mut alice).await, vec!["alice", "bob"]);
    assert_eq!(next_users(&mut bob).await, vec!["alice", "bob"]);

    send(&mut alice, json!({"type": "message", "data": "hi"})).await;
    let event = next_event(&mut bob).await;
    assert_eq!(event["type"], "new-msg");
    assert_eq!(event["message"]["f"], "alice");
    assert_eq!(event["message"]["m"], "hi");
    assert!(event["message"]["id"].as_u64().unwrap() > 0);

    alice.close(None).await.unwrap();
    assert_eq!(next_users(&mut bob).await, vec!["bob"]);
    assert_eq!(relay.members("r1").await, vec!["bob"]);
}

#[tokio::test]
async fn test_typing_before_login_not_relayed() {
    let relay = TestRelay::start().await;
    let mut bob = relay.connect().await;
    let mut eve = relay.connect().await;

    send(&mut bob, json!({"type": "login", "nick": "bob", "channel": "r1"})).await;
    assert_eq!(next_users(&mut bob).await, vec!["bob"]);

    send(&mut eve, json!({"type": "typing", "typing": true})).await;
    send(&mut eve, json!({"type": "message", "data": "sneaky"})).await;

    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_incomplete_login_never_admitted() {
    let relay = TestRelay::start().await;
    let mut bob = relay.connect().await;
    let mut eve = relay.connect().await;

    send(&mut bob, json!({"type": "login", "nick": "bob", "channel": "r1"})).await;
    assert_eq!(next_users(&mut bob).await, vec!["bob"]);

    send(&mut eve, json!({"type": "login", "nick": "", "channel": "r1"})).await;
    send(&mut eve, json!({"type": "login", "nick": "eve", "channel": "  "})).await;
    send(&mut bob, json!({"type": "message", "data": "anyone?"})).await;

    assert_eq!(next_event(&mut bob).await["type"], "new-msg");
    assert_silent(&mut eve).await;
    assert_eq!(relay.members("r1").await, vec!["bob"]);
}

#[tokio::test]
async fn test_second_login_keeps_first_room() {
    let relay = TestRelay::start().await;
    let mut alice = relay.connect().await;

    send(&mut alice, json!({"type": "login", "nick": "alice", "channel": "r1"})).await;
    assert_eq!(next_users(&mut alice).await, vec!["alice"]);

    send(&mut alice, json!({"type": "login", "nick": "alice", "channel": "r2"})).await;
    send(&mut alice, json!({"type": "typing", "typing": true})).await;

    let event = next_event(&mut alice).await;
    assert_eq!(event["type"], "typing");
    assert_eq!(event["user"], "alice");
    assert_eq!(relay.members("r1").await, vec!["alice"]);
    assert!(relay.members("r2").await.is_empty());
}

#[tokio::test]
async fn test_oversized_message_drops_connection() {
    let relay = TestRelay::start_with(ServerConfig {
        max_message_size: 1024,
        ..ServerConfig::default()
    })
    .await;
    let mut alice = relay.connect().await;
    let mut bob = relay.connect().await;

    send(&mut alice, json!({"type": "login", "nick": "alice", "channel": "r1"})).await;
    assert_eq!(next_users(&mut alice).await, vec!["alice"]);
    send(&mut bob, json!({"type": "login", "nick": "bob", "channel": "r1"})).await;
    assert_eq!(next_users(&mut alice).await, vec!["alice", "bob"]);

    let _ = bob
        .send(Message::Text(json!({"type": "message", "data": "x".repeat(4096)}).to_string().into()))
        .await;

    assert_eq!(next_users(&mut alice).await, vec!["alice"]);
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let relay = TestRelay::start_with(ServerConfig {
        idle_timeout: Duration::from_millis(400),
        ping_interval: Duration::from_millis(100),
        ..ServerConfig::default()
    })
    .await;
    let mut alice = relay.connect().await;
    let mut mute = relay.connect().await;

    send(&mut alice, json!({"type": "login", "nick": "alice", "channel": "r1"})).await;
    assert_eq!(next_users(&mut alice).await, vec!["alice"]);
    send(&mut mute, json!({"type": "login", "nick": "mute", "channel": "r1"})).await;
    assert_eq!(next_users(&mut alice).await, vec!["alice", "mute"]);

    // Reading answers alice's pings; mute is never polled again.
    assert_eq!(next_users(&mut alice).await, vec!["alice"]);
    drop(mute);
}

#[tokio::test]
async fn test_shutdown_flushes_notice_then_closes() {
    let relay = TestRelay::start().await;
    let mut alice = relay.connect().await;
    let mut lurker = relay.connect().await;

    send(&mut alice, json!({"type": "login", "nick": "alice", "channel": "r1"})).await;
    assert_eq!(next_users(&mut alice).await, vec!["alice"]);

    relay
        .cmd_tx
        .send(ServerCommand::Notice {
            text: "Server is shutting down".to_string(),
        })
        .await
        .unwrap();
    relay.shutdown_tx.send(true).unwrap();

    let event = next_event(&mut alice).await;
    assert_eq!(event["type"], "notice");
    assert_eq!(event["text"], "Server is shutting down");

    // Both the joined and the never-logged-in connection are closed.
    for ws in [&mut alice, &mut lurker] {
        let closed = timeout(Duration::from_secs(2), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(Message::Text(text))) => {
                        assert!(!text.contains("new-msg"), "unexpected event {text}")
                    }
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "connection was not closed");
    }

    timeout(Duration::from_secs(2), relay.listener_task)
        .await
        .expect("listener did not stop")
        .unwrap();
    assert!(connect_async(relay.url.as_str()).await.is_err());
}
