//! Visibility and network triggers

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::sleep;

use chat_realtime::domain::{ConnectionState, EnvironmentSignal, Frame};
use chat_realtime::infrastructure::auth::TokenStore;
use chat_realtime::presentation::EnvironmentMonitor;
use chat_realtime::shared::error::ClientError;

use crate::common::*;

/// Exhaust a single-attempt budget.
async fn exhausted_harness() -> Harness {
    let mut config = test_config();
    config.max_attempts = 1;
    let mut harness = Harness::new(config, TokenStore::with_token(TEST_TOKEN));

    harness.manager.connect().unwrap();
    for _ in 0..2 {
        harness
            .next_connect()
            .await
            .reject(ClientError::Transport("offline".into()));
    }
    let (error, fatal) = harness.next_error().await;
    assert_eq!(error, ClientError::RetriesExhausted { attempts: 1 });
    assert!(fatal);
    harness
}

#[tokio::test(start_paused = true)]
async fn test_hidden_closes_and_visible_reconnects() {
    let mut harness = Harness::with_defaults();
    let mut server = harness.open().await;

    harness
        .manager
        .notify_environment(EnvironmentSignal::Hidden)
        .unwrap();
    assert_eq!(
        server.next_frame().await,
        Some(Frame::Close {
            code: 1000,
            reason: "app hidden".into()
        })
    );
    harness.wait_for_state(ConnectionState::Closed).await;
    assert_eq!(harness.manager.status().pending_timers, 0);

    harness
        .manager
        .notify_environment(EnvironmentSignal::Visible)
        .unwrap();
    let _server = harness.accept_next().await;
    assert_eq!(harness.manager.status().sockets_created, 2);
}

#[tokio::test(start_paused = true)]
async fn test_hidden_suspends_pending_retry() {
    let mut harness = Harness::with_defaults();
    let server = harness.open().await;

    server.close(1006, "");
    assert_eq!(harness.next_reconnecting().await, (1, Duration::from_secs(1)));

    harness
        .manager
        .notify_environment(EnvironmentSignal::Hidden)
        .unwrap();
    settle().await;
    assert_eq!(harness.manager.status().pending_timers, 0);

    sleep(Duration::from_secs(5)).await;
    assert!(harness.try_connect().is_none());
    assert_eq!(harness.manager.status().sockets_created, 1);

    harness
        .manager
        .notify_environment(EnvironmentSignal::Visible)
        .unwrap();
    let _server = harness.accept_next().await;
    assert_eq!(harness.manager.status().sockets_created, 2);
}

#[tokio::test(start_paused = true)]
async fn test_hidden_suspends_debounced_connect() {
    let mut harness = Harness::with_defaults();

    harness.manager.connect().unwrap();
    harness
        .next_connect()
        .await
        .reject(ClientError::Transport("refused".into()));
    assert_eq!(harness.next_reconnecting().await, (1, Duration::from_secs(1)));

    harness.manager.connect().unwrap();
    harness
        .manager
        .notify_environment(EnvironmentSignal::Hidden)
        .unwrap();
    sleep(Duration::from_secs(5)).await;

    assert!(harness.try_connect().is_none());
    assert_eq!(harness.manager.status().pending_timers, 0);

    harness
        .manager
        .notify_environment(EnvironmentSignal::Visible)
        .unwrap();
    let _server = harness.accept_next().await;
}

#[tokio::test(start_paused = true)]
async fn test_visible_does_not_open_unused_channel() {
    let mut harness = Harness::with_defaults();

    harness
        .manager
        .notify_environment(EnvironmentSignal::Visible)
        .unwrap();
    harness
        .manager
        .notify_environment(EnvironmentSignal::Online)
        .unwrap();
    sleep(Duration::from_secs(5)).await;

    assert!(harness.try_connect().is_none());
    assert_eq!(harness.manager.state(), ConnectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_online_revives_exhausted_channel() {
    let mut harness = exhausted_harness().await;

    harness
        .manager
        .notify_environment(EnvironmentSignal::Online)
        .unwrap();

    let _server = harness.accept_next().await;
    assert_eq!(harness.manager.status().attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_visible_leaves_exhausted_channel_alone() {
    let mut harness = exhausted_harness().await;

    harness
        .manager
        .notify_environment(EnvironmentSignal::Visible)
        .unwrap();
    sleep(Duration::from_secs(5)).await;

    assert!(harness.try_connect().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_online_does_not_retry_rejected_credentials() {
    let mut harness = Harness::with_defaults();
    let server = harness.open().await;

    server.close(4001, "invalid token");
    let (_, fatal) = harness.next_error().await;
    assert!(fatal);

    harness
        .manager
        .notify_environment(EnvironmentSignal::Online)
        .unwrap();
    sleep(Duration::from_secs(5)).await;

    assert!(harness.try_connect().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_offline_keeps_socket() {
    let mut harness = Harness::with_defaults();
    let _server = harness.open().await;

    harness
        .manager
        .notify_environment(EnvironmentSignal::Offline)
        .unwrap();
    settle().await;

    assert!(harness.manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_monitor_fans_out_and_forgets_dead_managers() {
    let mut first = Harness::with_defaults();
    let second = Harness::with_defaults();
    let monitor = EnvironmentMonitor::new();
    monitor.register(&first.manager);
    monitor.register(&second.manager);
    assert_eq!(monitor.len(), 2);

    let _server = first.open().await;
    assert_eq!(monitor.notify(EnvironmentSignal::Hidden), 2);
    first.wait_for_state(ConnectionState::Closed).await;

    drop(second);
    assert_eq!(monitor.notify(EnvironmentSignal::Visible), 1);
    assert_eq!(monitor.len(), 1);
    let _server = first.accept_next().await;

    first.manager.shutdown().await;
    assert_eq!(monitor.notify(EnvironmentSignal::Online), 0);
    assert!(monitor.is_empty());
}
