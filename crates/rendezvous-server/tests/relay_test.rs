//! Integration tests for signaling over WebSocket: registration, peer
//! discovery, addressed forwarding and disconnect handling.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rendezvous_server::config::ServerConfig;
use rendezvous_server::server::{serve_with_listener, AppState};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default timeout for expected messages.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait before concluding nothing is coming.
const QUIET_PERIOD: Duration = Duration::from_millis(300);

struct TestServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    stop_token: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop_token.cancel();
    }
}

/// Start the relay on a random port.
async fn start_test_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState::new(ServerConfig::default()));
    let stop_token = CancellationToken::new();

    tokio::spawn(serve_with_listener(
        listener,
        state.clone(),
        stop_token.clone(),
    ));

    TestServer {
        addr,
        state,
        stop_token,
    }
}

async fn connect(server: &TestServer) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", server.addr))
        .await
        .expect("Failed to connect");
    client
}

async fn send(client: &mut Client, raw: &str) {
    client.send(Message::Text(raw.into())).await.unwrap();
}

/// Receive the next text frame, failing the test on timeout.
async fn recv_text(client: &mut Client) -> String {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("Timed out waiting for message")
            .expect("Connection closed")
            .expect("WebSocket error");

        if frame.is_text() {
            return frame.to_text().unwrap().to_owned();
        }
    }
}

async fn recv_json(client: &mut Client) -> Value {
    serde_json::from_str(&recv_text(client).await).unwrap()
}

/// Assert that no text frame arrives within the quiet period.
async fn assert_silent(client: &mut Client) {
    match tokio::time::timeout(QUIET_PERIOD, client.next()).await {
        Err(_) => {}
        Ok(Some(Ok(frame))) if !frame.is_text() => {}
        Ok(other) => panic!("Expected no message, got {:?}", other),
    }
}

/// Receive peers notifications until one lists exactly `expected`.
async fn await_peers(client: &mut Client, expected: &[&str]) {
    loop {
        let msg = recv_json(client).await;
        assert_eq!(msg["type"], "peers");
        if msg["peers"] == json!(expected) {
            return;
        }
    }
}

/// Connect and register, returning the server's acknowledgement broadcast.
async fn register_acked(server: &TestServer, name: &str) -> (Client, Value) {
    let mut client = connect(server).await;
    send(
        &mut client,
        &json!({ "type": "register", "userId": name }).to_string(),
    )
    .await;

    let msg = recv_json(&mut client).await;
    assert_eq!(msg["type"], "peers");
    assert!(msg["peers"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p == name));
    (client, msg)
}

/// Connect and register, waiting for the server's acknowledgement broadcast.
async fn register(server: &TestServer, name: &str) -> Client {
    register_acked(server, name).await.0
}

#[tokio::test]
async fn test_register_broadcasts_membership() {
    let server = start_test_server().await;

    let mut alice = register(&server, "alice").await;
    let mut bob = connect(&server).await;
    send(&mut bob, r#"{"type":"register","userId":"bob"}"#).await;

    let to_bob = recv_json(&mut bob).await;
    assert_eq!(to_bob, json!({ "type": "peers", "peers": ["alice", "bob"] }));

    let to_alice = recv_json(&mut alice).await;
    assert_eq!(to_alice, json!({ "type": "peers", "peers": ["alice", "bob"] }));
}

#[tokio::test]
async fn test_offer_relayed_byte_for_byte() {
    let server = start_test_server().await;

    let mut alice = register(&server, "alice").await;
    let mut bob = register(&server, "bob").await;
    let mut carol = register(&server, "carol").await;
    await_peers(&mut alice, &["alice", "bob", "carol"]).await;
    await_peers(&mut bob, &["alice", "bob", "carol"]).await;

    let offer = r#"{"type":"offer",  "targetId":"bob", "sdp":"v=0\r\no=- 46117 2 IN IP4 127.0.0.1", "from":"alice"}"#;
    send(&mut alice, offer).await;

    assert_eq!(recv_text(&mut bob).await, offer);
    assert_silent(&mut carol).await;
    assert_silent(&mut alice).await;

    let answer = r#"{"type":"answer","targetId":"alice","sdp":"v=0"}"#;
    send(&mut bob, answer).await;
    assert_eq!(recv_text(&mut alice).await, answer);

    let candidate = r#"{"type":"candidate","targetId":"alice","candidate":{"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host","sdpMid":"0","sdpMLineIndex":0}}"#;
    send(&mut bob, candidate).await;
    assert_eq!(recv_text(&mut alice).await, candidate);
}

#[tokio::test]
async fn test_offer_to_unknown_peer_is_dropped_silently() {
    let server = start_test_server().await;
    let mut alice = register(&server, "alice").await;

    send(&mut alice, r#"{"type":"offer","targetId":"nobody","sdp":"x"}"#).await;
    assert_silent(&mut alice).await;

    // The sender's connection is still usable.
    send(&mut alice, r#"{"type":"getPeers","userId":"alice"}"#).await;
    assert_eq!(
        recv_json(&mut alice).await,
        json!({ "type": "peers", "peers": [] })
    );
}

#[tokio::test]
async fn test_get_peers_excludes_requester() {
    let server = start_test_server().await;

    let mut alice = register(&server, "alice").await;
    let _bob = register(&server, "bob").await;
    let _carol = register(&server, "carol").await;
    await_peers(&mut alice, &["alice", "bob", "carol"]).await;

    send(&mut alice, r#"{"type":"getPeers","userId":"alice"}"#).await;
    assert_eq!(
        recv_json(&mut alice).await,
        json!({ "type": "peers", "peers": ["bob", "carol"] })
    );
}

#[tokio::test]
async fn test_disconnect_removes_peer_and_broadcasts() {
    let server = start_test_server().await;

    let mut alice = register(&server, "alice").await;
    let mut bob = register(&server, "bob").await;
    await_peers(&mut alice, &["alice", "bob"]).await;

    alice.close(None).await.unwrap();

    await_peers(&mut bob, &["bob"]).await;
    assert!(server.state.registry().lookup("alice").await.is_none());

    send(&mut bob, r#"{"type":"offer","targetId":"alice"}"#).await;
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_abrupt_disconnect_removes_peer() {
    let server = start_test_server().await;

    let alice = register(&server, "alice").await;
    let mut bob = register(&server, "bob").await;

    // Drop without a close handshake.
    drop(alice);

    await_peers(&mut bob, &["bob"]).await;
    assert_eq!(server.state.registry().connection_count().await, 1);
}

#[tokio::test]
async fn test_malformed_messages_do_not_close_connection() {
    let server = start_test_server().await;
    let mut alice = register(&server, "alice").await;

    for raw in ["not json", "[]", r#"{"no":"type"}"#, r#"{"type":"wave"}"#, r#"{"type":"offer"}"#] {
        send(&mut alice, raw).await;
    }
    assert_silent(&mut alice).await;

    send(&mut alice, r#"{"type":"getPeers","userId":"alice"}"#).await;
    assert_eq!(
        recv_json(&mut alice).await,
        json!({ "type": "peers", "peers": [] })
    );
}

#[tokio::test]
async fn test_duplicate_identity_routes_to_newest_connection() {
    let server = start_test_server().await;

    let mut first = register(&server, "alice").await;
    let mut second = register(&server, "alice").await;
    let mut carol = register(&server, "carol").await;
    await_peers(&mut second, &["alice", "carol"]).await;

    let offer = r#"{"type":"offer","targetId":"alice","sdp":"v=0"}"#;
    send(&mut carol, offer).await;

    assert_eq!(recv_text(&mut second).await, offer);
    assert_silent(&mut first).await;

    // Closing the evicted connection does not unregister the newer one.
    first.close(None).await.unwrap();
    tokio::time::sleep(QUIET_PERIOD).await;
    assert!(server.state.registry().is_registered("alice").await);
}

#[tokio::test]
async fn test_binary_utf8_frames_are_routed() {
    let server = start_test_server().await;
    let mut alice = register(&server, "alice").await;

    alice
        .send(Message::Binary(
            br#"{"type":"getPeers","userId":"alice"}"#.to_vec().into(),
        ))
        .await
        .unwrap();

    assert_eq!(
        recv_json(&mut alice).await,
        json!({ "type": "peers", "peers": [] })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations() {
    const CLIENTS: usize = 16;
    let server = Arc::new(start_test_server().await);

    let tasks: Vec<_> = (0..CLIENTS)
        .map(|i| {
            let server = Arc::clone(&server);
            tokio::spawn(async move { register_acked(&server, &format!("peer-{i:02}")).await })
        })
        .collect();

    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.unwrap());
    }

    assert_eq!(server.state.registry().connection_count().await, CLIENTS);

    let expected: Vec<String> = (0..CLIENTS).map(|i| format!("peer-{i:02}")).collect();
    let expected: Vec<&str> = expected.iter().map(String::as_str).collect();

    // The last registrant's acknowledgement already carries the full set.
    let complete_on_ack = clients
        .iter()
        .filter(|(_, ack)| ack["peers"] == json!(expected))
        .count();
    assert_eq!(complete_on_ack, 1);

    for (client, ack) in &mut clients {
        if ack["peers"] != json!(expected) {
            await_peers(client, &expected).await;
        }
        assert_silent(client).await;
    }
}
