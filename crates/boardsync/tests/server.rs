//! Integration tests for the boardsync server over real WebSockets.

use std::net::SocketAddr;
use std::time::Duration;

use boardsync::prelude::*;
use boardsync::session::{PasswordParams, USER_COOKIE};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::COOKIE;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct Running {
    addr: SocketAddr,
    hub: HubHandle,
    accounts: Accounts<MemoryStore, MemoryIdentities>,
}

async fn build_server() -> BoardsyncServer {
    BoardsyncServer::builder()
        .bind("127.0.0.1:0")
        .tokens(TokenConfig {
            secret: "integration-secret".into(),
            ..TokenConfig::default()
        })
        .heartbeat_interval(Duration::ZERO)
        .passwords(Passwords::new(PasswordParams::new(8, 1, 1, None).unwrap()))
        .build(MemoryStore::new(), MemoryIdentities::new(), MemoryBoards::new())
        .await
        .expect("server should build")
}

/// Starts a server on a random port.
async fn start_server() -> Running {
    let server = build_server().await;

    let running = Running {
        addr: server.local_addr().expect("should have local addr"),
        hub: server.hub(),
        accounts: server.accounts(),
    };
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    running
}

async fn connect(
    addr: SocketAddr,
    board: Option<&str>,
    session: Option<&SessionCredentials>,
) -> ClientWs {
    let url = match board {
        Some(board) => format!("ws://{addr}/ws?boardId={board}"),
        None => format!("ws://{addr}/ws"),
    };
    let mut request = url.into_client_request().expect("valid url");
    if let Some(session) = session {
        let cookie = format!(
            "access_token={}; refresh_token={}; {USER_COOKIE}={}",
            session.access_token, session.refresh_token, session.identity_id
        );
        request
            .headers_mut()
            .insert(COOKIE, HeaderValue::from_str(&cookie).unwrap());
    }
    let (ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("should connect");
    ws
}

/// Next text frame as JSON, skipping control frames.
async fn recv_json(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("JSON frame");
        }
    }
}

/// Skips frames until one with `event` arrives.
async fn recv_event(ws: &mut ClientWs, event: &str) -> Value {
    loop {
        let msg = recv_json(ws).await;
        if msg["event"] == event {
            return msg;
        }
    }
}

async fn send_json(ws: &mut ClientWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send");
}

fn issued_credentials(msg: &Value) -> SessionCredentials {
    assert_eq!(msg["event"], "session:issued");
    serde_json::from_value(msg["payload"].clone()).expect("credentials")
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_anonymous_connect_receives_session_then_join_ack() {
    let server = start_server().await;
    let mut ws = connect(server.addr, Some("b1"), None).await;

    let credentials = issued_credentials(&recv_json(&mut ws).await);
    assert!(!credentials.access_token.is_empty());
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"event": "user:join", "payload": {"boardId": "b1"}})
    );
    assert!(server.hub.is_online(credentials.identity_id).await.unwrap());
}

#[tokio::test]
async fn test_silent_tcp_peer_does_not_block_other_clients() {
    let server = start_server().await;
    let _silent = tokio::net::TcpStream::connect(server.addr).await.unwrap();

    let mut ws = tokio::time::timeout(
        Duration::from_secs(3),
        connect(server.addr, Some("b1"), None),
    )
    .await
    .expect("second client connects while the first stays silent");
    issued_credentials(&recv_json(&mut ws).await);
    assert_eq!(recv_json(&mut ws).await["event"], "user:join");
}

#[tokio::test]
async fn test_reconnect_with_cookies_keeps_identity() {
    let server = start_server().await;
    let mut first = connect(server.addr, None, None).await;
    let credentials = issued_credentials(&recv_json(&mut first).await);

    let mut second = connect(server.addr, Some("b2"), Some(&credentials)).await;
    assert_eq!(
        recv_json(&mut second).await,
        json!({"event": "user:join", "payload": {"boardId": "b2"}})
    );
}

#[tokio::test]
async fn test_drag_start_reaches_other_viewer() {
    let server = start_server().await;
    let mut alice = connect(server.addr, Some("b1"), None).await;
    let alice_id = issued_credentials(&recv_json(&mut alice).await).identity_id;
    recv_event(&mut alice, "user:join").await;

    let mut bob = connect(server.addr, Some("b1"), None).await;
    recv_event(&mut bob, "user:join").await;

    send_json(
        &mut alice,
        json!({
            "event": "stickers:drag:start",
            "data": {"stickers": [{"id": "s1", "x": 3, "y": 4}]}
        }),
    )
    .await;

    let drag = recv_event(&mut bob, "stickers:drag:start").await;
    assert_eq!(drag["payload"]["userId"], alice_id.to_string());
    assert_eq!(drag["payload"]["stickers"][0]["id"], "s1");
    assert_eq!(drag["payload"]["stickers"][0]["x"], 3.0);
}

#[tokio::test]
async fn test_unknown_event_answers_error_and_stays_open() {
    let server = start_server().await;
    let mut ws = connect(server.addr, None, None).await;
    recv_event(&mut ws, "session:issued").await;

    send_json(&mut ws, json!({"event": "nope"})).await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"event": "error", "error": "Unknown event: nope"})
    );

    send_json(&mut ws, json!({"event": "user:join", "data": {"boardId": "b3"}}))
        .await;
    assert_eq!(recv_json(&mut ws).await["event"], "user:join");
}

#[tokio::test]
async fn test_published_board_event_reaches_viewers() {
    let server = start_server().await;
    let mut ws = connect(server.addr, Some("b1"), None).await;
    recv_event(&mut ws, "user:join").await;

    let sent = server
        .hub
        .publish(BoardEvent::StickerCreated {
            board_id: BoardId::new("b1"),
            sticker: json!({"id": "s9", "boardId": "b1"}),
        })
        .await
        .unwrap();
    assert_eq!(sent, 1);

    let created = recv_event(&mut ws, "sticker:create").await;
    assert_eq!(created["payload"]["id"], "s9");
}

#[tokio::test]
async fn test_signup_promotes_websocket_identity() {
    let server = start_server().await;
    let mut ws = connect(server.addr, None, None).await;
    let anonymous = issued_credentials(&recv_json(&mut ws).await);

    let registered = server
        .accounts
        .signup(
            Some(&anonymous),
            Registration {
                name: "Ada".into(),
                login: "ada".into(),
                password: "hunter2".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(registered.identity_id, anonymous.identity_id);

    let mut again = connect(server.addr, Some("b4"), Some(&registered)).await;
    assert_eq!(recv_json(&mut again).await["event"], "user:join");
}

#[tokio::test]
async fn test_build_without_secret_is_rejected() {
    let result = BoardsyncServer::builder()
        .bind("127.0.0.1:0")
        .build(MemoryStore::new(), MemoryIdentities::new(), MemoryBoards::new())
        .await;
    assert!(matches!(
        result,
        Err(BoardsyncError::Config(ConfigError::MissingSecret))
    ));
}

#[tokio::test]
async fn test_shutdown_closes_open_connections_going_away() {
    let server = build_server().await;
    let addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    let mut ws = connect(addr, Some("b1"), None).await;
    recv_event(&mut ws, "user:join").await;

    stop_tx.send(()).unwrap();
    task.await.unwrap().unwrap();

    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame within timeout");
        match msg {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(u16::from(frame.code), 1001);
                break;
            }
            Some(Ok(_)) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}
