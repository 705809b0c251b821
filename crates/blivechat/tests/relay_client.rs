//! The relay client against an in-memory relay server.

use std::time::Duration;

use blivechat::prelude::*;
use blivechat::transport::{memory_connector, MemoryListener, MemoryPeer, WireMessage};
use serde_json::{json, Value};
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

const URL: &str = "ws://relay.test/api/chat";

fn config(room: RoomKey) -> RelayConfig {
    RelayConfig {
        backoff: BackoffConfig::default().without_jitter(),
        ..RelayConfig::new(URL, room)
    }
}

async fn recv_json(peer: &MemoryPeer) -> Value {
    match peer.recv().await {
        Some(WireMessage::Text(text)) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

/// Accepts the next connection and returns it with its `joinRoom`.
async fn accept_join(listener: &mut MemoryListener) -> (MemoryPeer, Value) {
    let peer = listener.accept().await.expect("client connects");
    assert_eq!(peer.url(), URL);
    let join = recv_json(&peer).await;
    (peer, join)
}

fn text(value: Value) -> WireMessage {
    WireMessage::Text(value.to_string())
}

// =========================================================================
// joinRoom and heartbeats
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_join_room_shape() {
    let (connector, mut listener) = memory_connector();
    let (handler, _rx) = channel_handler();
    let client = ChatClient::builder().relay(
        RelayConfig {
            auto_translate: true,
            ..config(RoomKey::RoomId(21396545))
        },
        connector,
        handler,
    );

    let (_peer, join) = accept_join(&mut listener).await;
    assert_eq!(
        join,
        json!({
            "cmd": 1,
            "data": {"roomKey": {"type": 1, "value": 21396545}, "config": {"autoTranslate": true}}
        })
    );
    client.stop();
    client.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_join_room_by_auth_code() {
    let (connector, mut listener) = memory_connector();
    let (handler, _rx) = channel_handler();
    let client = ChatClient::builder().relay(
        config(RoomKey::AuthCode("SECRETCODE".into())),
        connector,
        handler,
    );

    let (_peer, join) = accept_join(&mut listener).await;
    assert_eq!(join["data"]["roomKey"], json!({"type": 2, "value": "SECRETCODE"}));
    assert_eq!(join["data"]["config"]["autoTranslate"], false);
    client.stop();
    client.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_server_heartbeat_answered_immediately() {
    let (connector, mut listener) = memory_connector();
    let (handler, _rx) = channel_handler();
    let client = ChatClient::builder().relay(config(RoomKey::RoomId(1)), connector, handler);
    let (peer, _) = accept_join(&mut listener).await;

    // Heartbeats every 10 s keep a 15 s receive timeout from firing.
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        peer.send(text(json!({"cmd": 0, "data": null}))).unwrap();
        let start = Instant::now();
        assert_eq!(recv_json(&peer).await, json!({"cmd": 0, "data": null}));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
    let stats = client.stats();
    assert_eq!(stats.reconnects_scheduled, 0);
    assert_eq!(stats.connections_opened, 1);
    assert_eq!(stats.state, LinkState::Live);
    client.stop();
    client.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_silence_reconnects_after_receive_timeout() {
    let (connector, mut listener) = memory_connector();
    let (handler, _rx) = channel_handler();
    let client = ChatClient::builder().relay(config(RoomKey::RoomId(1)), connector, handler);

    let (_first, _) = accept_join(&mut listener).await;
    let start = Instant::now();
    let (_second, _) = accept_join(&mut listener).await;
    // 15 s of silence, then the 1 s first backoff step.
    assert!(start.elapsed() >= Duration::from_secs(16));
    assert!(start.elapsed() < Duration::from_secs(17));

    let stats = client.stats();
    assert_eq!(stats.reconnects_scheduled, 1);
    assert_eq!(stats.total_retry_count, 1);
    assert_eq!(stats.retry_count, 0, "reset when the socket opens");
    client.stop();
    client.join().await.unwrap();
}

// =========================================================================
// Messages
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_messages_delivered_and_garbage_ignored() {
    let (connector, mut listener) = memory_connector();
    let (handler, mut rx) = channel_handler();
    let client = ChatClient::builder().relay(config(RoomKey::RoomId(1)), connector, handler);
    let (peer, _) = accept_join(&mut listener).await;

    peer.send(WireMessage::Text("not json".into())).unwrap();
    peer.send(text(json!({"cmd": 42, "data": {}}))).unwrap();
    peer.send(text(json!({
        "cmd": 5,
        "data": {"id": "5", "timestamp": 10, "authorName": "fan", "price": 30,
                 "content": "hey", "privilegeType": 3, "uid": 2}
    })))
    .unwrap();
    peer.send(text(json!({"cmd": 6, "data": {"ids": ["5"]}}))).unwrap();

    let Some(ChatMessage::AddSuperChat(sc)) = rx.recv().await else {
        panic!("expected super chat");
    };
    assert_eq!(sc.id, "5");
    assert_eq!(sc.price, 30.0);
    let Some(ChatMessage::DelSuperChat(del)) = rx.recv().await else {
        panic!("expected super chat deletion");
    };
    assert_eq!(del.ids, vec!["5".to_string()]);
    assert_eq!(client.stats().reconnects_scheduled, 0);
    client.stop();
    client.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_server_fatal_error_is_terminal() {
    let (connector, mut listener) = memory_connector();
    let (handler, mut rx) = channel_handler();
    let client = ChatClient::builder().relay(
        config(RoomKey::AuthCode("BAD".into())),
        connector.clone(),
        handler,
    );
    let (peer, _) = accept_join(&mut listener).await;
    peer.send(text(json!({"cmd": 8, "data": {"type": 1, "msg": "bad auth code"}})))
        .unwrap();

    let stats = client.watch_stats();
    client.join().await.unwrap();
    let Some(ChatMessage::Fatal(fatal)) = rx.recv().await else {
        panic!("expected fatal error");
    };
    assert_eq!(fatal.kind, FatalErrorKind::AuthCodeInvalid);
    assert_eq!(fatal.message, "bad auth code");
    assert!(rx.recv().await.is_none());
    assert_eq!(connector.attempts(), 1);
    assert_eq!(stats.borrow().state, LinkState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn test_relay_retry_ceiling() {
    let (connector, _listener) = memory_connector();
    connector.set_refuse(true);
    let (handler, mut rx) = channel_handler();
    let client = ChatClient::builder().relay(
        RelayConfig {
            max_total_retries: 2,
            ..config(RoomKey::RoomId(1))
        },
        connector.clone(),
        handler,
    );
    client.join().await.unwrap();

    let Some(ChatMessage::Fatal(fatal)) = rx.recv().await else {
        panic!("expected fatal error");
    };
    assert_eq!(fatal.kind, FatalErrorKind::TooManyRetries);
    assert!(rx.recv().await.is_none());
    assert_eq!(connector.attempts(), 3);
}
