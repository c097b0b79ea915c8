//! Ping/pong keepalive

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::{sleep, Instant};

use chat_realtime::application::dto::OutboundMessage;
use chat_realtime::application::services::ConnectionEvent;
use chat_realtime::domain::{ConnectionState, Frame};
use chat_realtime::infrastructure::auth::TokenStore;
use chat_realtime::shared::error::ClientError;

use crate::common::*;

#[tokio::test(start_paused = true)]
async fn test_ping_sent_every_interval() {
    let mut harness = Harness::with_defaults();
    let mut server = harness.open().await;
    let opened_at = Instant::now();

    let ping = server.next_json().await;
    assert_eq!(ping["type"], "ping");
    assert!(ping["timestamp"].is_i64());
    assert_elapsed(opened_at, Duration::from_secs(30));

    server.send_json(json!({"type": "pong", "timestamp": ping["timestamp"]}));
    settle().await;
    assert_eq!(harness.manager.status().last_round_trip, Some(Duration::ZERO));

    assert_eq!(server.next_json().await["type"], "ping");
    assert_elapsed(opened_at, Duration::from_secs(60));

    assert!(harness.manager.status().last_pong_at.is_some());
    assert!(harness.manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_missed_pongs_recycle_socket() {
    let mut harness = Harness::with_defaults();
    let mut server = harness.open().await;
    let opened_at = Instant::now();

    // Answer the first ping only
    assert_eq!(server.next_json().await["type"], "ping");
    server.send_json(json!({"type": "pong"}));

    for expected in [60, 90] {
        assert_eq!(server.next_json().await["type"], "ping");
        assert_elapsed(opened_at, Duration::from_secs(expected));
    }

    assert_eq!(
        server.next_frame().await,
        Some(Frame::Close {
            code: 4000,
            reason: "heartbeat timeout".into()
        })
    );
    assert_elapsed(opened_at, Duration::from_secs(120));
    assert_eq!(harness.next_reconnecting().await, (1, Duration::from_secs(1)));

    let _server = harness.accept_next().await;
    assert_elapsed(opened_at, Duration::from_secs(121));
}

#[tokio::test(start_paused = true)]
async fn test_inbound_ping_is_answered() {
    let mut harness = Harness::with_defaults();
    let mut server = harness.open().await;

    server.send_json(json!({"type": "ping", "timestamp": 42}));

    assert_eq!(
        server.next_json().await,
        json!({"type": "pong", "timestamp": 42})
    );
}

#[tokio::test(start_paused = true)]
async fn test_zero_max_missed_disables_detection() {
    let mut config = test_config();
    config.max_missed_pongs = 0;
    let mut harness = Harness::new(config, TokenStore::with_token(TEST_TOKEN));
    let mut server = harness.open().await;

    for _ in 0..5 {
        assert_eq!(server.next_json().await["type"], "ping");
    }

    assert!(harness.manager.is_connected());
    assert!(harness
        .drain_events()
        .iter()
        .all(|event| !matches!(event, ConnectionEvent::Reconnecting { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_stops_after_disconnect() {
    let mut harness = Harness::with_defaults();
    let mut server = harness.open().await;

    harness.manager.disconnect(1000, "done").await.unwrap();
    assert!(matches!(server.next_frame().await, Some(Frame::Close { .. })));
    assert_eq!(server.next_frame().await, None);

    sleep(Duration::from_secs(120)).await;
    assert_eq!(
        harness.manager.send(&OutboundMessage::new("typing")),
        Err(ClientError::NotConnected {
            state: ConnectionState::Closed
        })
    );
}
