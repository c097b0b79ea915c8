//! Backoff, exhaustion and close-code handling

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::{sleep, Instant};

use chat_realtime::application::services::{ConnectionEvent, ManagerConfig};
use chat_realtime::domain::ConnectionState;
use chat_realtime::infrastructure::auth::TokenStore;
use chat_realtime::shared::error::ClientError;

use crate::common::*;

fn refused() -> ClientError {
    ClientError::Transport("connection refused".into())
}

fn config_with_attempts(max_attempts: u32) -> ManagerConfig {
    let mut config = test_config();
    config.max_attempts = max_attempts;
    config
}

#[tokio::test(start_paused = true)]
async fn test_abnormal_close_backs_off_exponentially() {
    let mut harness = Harness::with_defaults();
    let server = harness.open().await;

    server.close(1006, "");
    let closed_at = Instant::now();
    assert_eq!(harness.next_reconnecting().await, (1, Duration::from_secs(1)));
    let retry_at = harness.manager.status().retry_at.expect("retry scheduled");
    let retry_in = retry_at.saturating_duration_since(closed_at);
    assert!(
        retry_in >= Duration::from_secs(1) && retry_in <= Duration::from_millis(1010),
        "retry scheduled {:?} after close",
        retry_in
    );

    harness.next_connect().await.reject(refused());
    assert_elapsed(closed_at, Duration::from_secs(1));
    assert_eq!(harness.next_reconnecting().await, (2, Duration::from_secs(2)));

    harness.next_connect().await.reject(refused());
    assert_elapsed(closed_at, Duration::from_secs(3));
    assert_eq!(harness.next_reconnecting().await, (3, Duration::from_secs(4)));

    let _server = harness.next_connect().await.accept();
    assert_elapsed(closed_at, Duration::from_secs(7));
    harness.wait_for_state(ConnectionState::Open).await;

    let status = harness.manager.status();
    assert_eq!(status.attempts, 0);
    assert_eq!(status.retry_at, None);
}

#[tokio::test(start_paused = true)]
async fn test_delay_is_capped_at_max_delay() {
    let mut config = config_with_attempts(10);
    config.max_delay = Duration::from_secs(5);
    let mut harness = Harness::new(config, TokenStore::with_token(TEST_TOKEN));

    harness.manager.connect().unwrap();
    let mut delays = Vec::new();
    for _ in 0..5 {
        harness.next_connect().await.reject(refused());
        delays.push(harness.next_reconnecting().await.1.as_secs());
    }

    assert_eq!(delays, vec![1, 2, 4, 5, 5]);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_is_fatal_and_final() {
    let mut harness = Harness::new(config_with_attempts(2), TokenStore::with_token(TEST_TOKEN));

    harness.manager.connect().unwrap();
    harness.next_connect().await.reject(refused());
    assert_eq!(harness.next_reconnecting().await, (1, Duration::from_secs(1)));
    harness.next_connect().await.reject(refused());
    assert_eq!(harness.next_reconnecting().await, (2, Duration::from_secs(2)));
    harness.next_connect().await.reject(refused());

    assert_eq!(
        harness.next_error().await,
        (ClientError::RetriesExhausted { attempts: 2 }, true)
    );

    sleep(Duration::from_secs(300)).await;
    assert!(harness.try_connect().is_none());
    assert!(harness
        .drain_events()
        .iter()
        .all(|event| !matches!(event, ConnectionEvent::Error { .. })));

    let status = harness.manager.status();
    assert_eq!(status.state, ConnectionState::Closed);
    assert_eq!(status.pending_timers, 0);
    assert_eq!(harness.connector.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_manual_reconnect_after_exhaustion() {
    let mut harness = Harness::new(config_with_attempts(1), TokenStore::with_token(TEST_TOKEN));

    harness.manager.connect().unwrap();
    harness.next_connect().await.reject(refused());
    harness.next_connect().await.reject(refused());
    let (error, fatal) = harness.next_error().await;
    assert!(fatal);
    assert_eq!(error.kind(), "retries_exhausted");

    harness.manager.reconnect().unwrap();
    let _server = harness.accept_next().await;
    assert_eq!(harness.manager.status().attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_normal_close_is_not_retried() {
    let mut harness = Harness::with_defaults();
    let server = harness.open().await;

    server.close(1000, "bye");
    harness.wait_for_state(ConnectionState::Closed).await;

    sleep(Duration::from_secs(120)).await;
    assert!(harness.try_connect().is_none());
    assert_eq!(harness.manager.status().pending_timers, 0);
}

async fn assert_terminal_close(code: u16, expected: ClientError) {
    let mut harness = Harness::with_defaults();
    let server = harness.open().await;

    server.close(code, "token expired");
    assert_eq!(harness.next_error().await, (expected, true));

    sleep(Duration::from_secs(300)).await;
    assert!(harness.try_connect().is_none());
    let status = harness.manager.status();
    assert_eq!(status.state, ConnectionState::Closed);
    assert_eq!(status.pending_timers, 0);
}

#[tokio::test(start_paused = true)]
async fn test_auth_close_code_halts_reconnection() {
    assert_terminal_close(4001, ClientError::AuthRejected("token expired".into())).await;
}

#[tokio::test(start_paused = true)]
async fn test_access_denied_close_code_halts_reconnection() {
    assert_terminal_close(4003, ClientError::AccessDenied("token expired".into())).await;
}

#[tokio::test(start_paused = true)]
async fn test_custom_close_codes_are_classified() {
    let mut config = test_config();
    config.close_policy.auth_failure_codes.push(4401);
    let mut harness = Harness::new(config, TokenStore::with_token(TEST_TOKEN));
    let server = harness.open().await;

    server.close(4401, "");
    let (error, fatal) = harness.next_error().await;
    assert!(fatal);
    assert_eq!(error, ClientError::AuthRejected("close code 4401".into()));
}

#[tokio::test(start_paused = true)]
async fn test_handshake_auth_rejection_is_not_retried() {
    let mut harness = Harness::with_defaults();

    harness.manager.connect().unwrap();
    harness
        .next_connect()
        .await
        .reject(ClientError::AuthRejected("handshake rejected with HTTP 401".into()));

    let (error, fatal) = harness.next_error().await;
    assert!(fatal);
    assert_eq!(error.kind(), "auth_rejected");

    sleep(Duration::from_secs(300)).await;
    assert!(harness.try_connect().is_none());

    harness.manager.reconnect().unwrap();
    let _server = harness.accept_next().await;
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_feeds_retry_policy() {
    let mut harness = Harness::with_defaults();
    let start = Instant::now();

    harness.manager.connect().unwrap();
    let _stalled = harness.next_connect().await;

    assert_eq!(harness.next_reconnecting().await, (1, Duration::from_secs(1)));
    assert_elapsed(start, Duration::from_secs(10));
    assert_eq!(harness.manager.state(), ConnectionState::Closed);

    let _server = harness.next_connect().await.accept();
    assert_elapsed(start, Duration::from_secs(11));
    harness.wait_for_state(ConnectionState::Open).await;
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_triggers_reconnect() {
    let mut harness = Harness::with_defaults();
    let server = harness.open().await;

    server.fail("connection reset by peer");
    assert_eq!(harness.next_reconnecting().await, (1, Duration::from_secs(1)));

    let _server = harness.accept_next().await;
    assert_eq!(harness.manager.status().sockets_created, 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_transport_counts_as_abnormal_close() {
    let mut harness = Harness::with_defaults();
    let server = harness.open().await;

    drop(server);
    assert_eq!(harness.next_reconnecting().await, (1, Duration::from_secs(1)));
}
