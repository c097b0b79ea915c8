//! Channel facades and application wiring

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_test::assert_ok;

use chat_realtime::application::services::{SnapshotSource, UnreadTracker};
use chat_realtime::config::Settings;
use chat_realtime::domain::ConnectionState;
use chat_realtime::infrastructure::auth::TokenStore;
use chat_realtime::presentation::{ChatChannel, NotificationChannel};
use chat_realtime::shared::error::{ClientError, ClientResult};
use chat_realtime::startup::Application;

use crate::common::*;

/// Snapshot source returning a fixed count
struct FixedSnapshot {
    count: u64,
    calls: AtomicUsize,
}

impl FixedSnapshot {
    fn new(count: u64) -> Arc<Self> {
        Arc::new(Self {
            count,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for FixedSnapshot {
    async fn fetch_unread_count(&self) -> ClientResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.count)
    }
}

#[tokio::test(start_paused = true)]
async fn test_chat_channel_sends_trimmed_message() {
    let mut harness = Harness::with_defaults();
    let chat = ChatChannel::new(
        Arc::clone(&harness.manager),
        UnreadTracker::new(FixedSnapshot::new(0)),
    );

    assert_eq!(
        chat.send_chat_message(12, "hello"),
        Err(ClientError::NotConnected {
            state: ConnectionState::Idle
        })
    );

    let mut server = harness.open().await;
    assert_ok!(chat.send_chat_message(12, "  hello there  "));
    assert_eq!(
        server.next_json().await,
        json!({"type": "chat_message", "conversation_id": 12, "content": "hello there"})
    );

    assert_ok!(chat.send_typing(12, true));
    assert_eq!(
        server.next_json().await,
        json!({"type": "typing", "conversation_id": 12, "is_typing": true})
    );

    assert_ok!(chat.mark_read(12));
    assert_eq!(
        server.next_json().await,
        json!({"type": "mark_read", "conversation_id": 12})
    );
}

#[tokio::test(start_paused = true)]
async fn test_blank_message_never_reaches_socket() {
    let mut harness = Harness::with_defaults();
    let chat = ChatChannel::new(
        Arc::clone(&harness.manager),
        UnreadTracker::new(FixedSnapshot::new(0)),
    );
    let mut server = harness.open().await;

    let result = chat.send_chat_message(12, "   ");
    assert!(matches!(result, Err(ClientError::Validation(_))));

    let oversized = "x".repeat(4001);
    assert!(matches!(
        chat.send_chat_message(12, &oversized),
        Err(ClientError::Validation(_))
    ));

    settle().await;
    let (frames, released) = server.drain();
    assert!(frames.is_empty());
    assert!(!released);
}

#[tokio::test(start_paused = true)]
async fn test_unread_snapshot_fetched_once_per_establishment() {
    let mut harness = Harness::with_defaults();
    let snapshot = FixedSnapshot::new(3);
    let unread = UnreadTracker::new(snapshot.clone());
    let totals = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&totals);
    unread.on_change(move |total| seen.lock().push(total));
    let chat = ChatChannel::new(Arc::clone(&harness.manager), unread);

    let server = harness.open().await;
    assert_eq!(snapshot.calls(), 0);

    server.send_json(json!({"type": "connection_established", "user_id": 7}));
    harness.next_message().await;
    settle().await;
    assert_eq!(snapshot.calls(), 1);
    assert_eq!(chat.unread().count(), 3);

    let incoming = json!({
        "type": "chat_message",
        "message_id": "m-1",
        "conversation_id": "c-1",
        "sender_id": 8
    });
    server.send_json(incoming.clone());
    server.send_json(incoming);
    server.send_json(json!({
        "type": "chat_message",
        "message_id": "m-2",
        "conversation_id": "c-1",
        "sender_id": 7
    }));
    for _ in 0..3 {
        harness.next_message().await;
    }

    assert_eq!(chat.unread().count(), 4);
    assert_eq!(chat.unread().conversation_count("c-1"), 1);
    assert_eq!(snapshot.calls(), 1);
    assert_eq!(*totals.lock(), vec![3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_channel_routes_by_type() {
    let mut harness = Harness::with_defaults();
    let notifications = NotificationChannel::new(Arc::clone(&harness.manager));
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    notifications.on("new_notification", move |message| {
        sink.lock().push(message.id_field("id"));
    });

    let mut server = harness.open().await;
    server.send_json(json!({"type": "new_notification", "id": 5}));
    server.send_json(json!({"type": "something_else"}));
    harness.next_message().await;
    harness.next_message().await;
    assert_eq!(*received.lock(), vec![Some("5".to_string())]);

    assert_ok!(notifications.mark_notification_read(5));
    assert_eq!(
        server.next_json().await,
        json!({"type": "mark_read", "notification_id": 5})
    );
    assert_ok!(notifications.mark_all_read());
    assert_eq!(server.next_json().await, json!({"type": "mark_all_read"}));
}

#[tokio::test(start_paused = true)]
async fn test_application_connects_every_channel() {
    let settings = Settings::defaults().unwrap();
    let (connector, mut connects) = FakeConnector::new();
    let app = Application::build_with_connector(
        settings,
        TokenStore::with_token(TEST_TOKEN),
        connector.clone(),
    )
    .unwrap();

    app.connect_all().unwrap();

    let mut paths = Vec::new();
    let mut servers = Vec::new();
    for _ in 0..3 {
        let pending = tokio::time::timeout(WAIT, connects.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.token().as_deref(), Some(TEST_TOKEN));
        paths.push(pending.url.path().to_string());
        servers.push(pending.accept());
    }
    paths.sort();
    assert_eq!(
        paths,
        vec!["/ws/assistant/", "/ws/chat/", "/ws/notifications/"]
    );
    assert_eq!(connector.calls(), 3);

    app.shutdown().await;
    for manager in app.managers() {
        assert_eq!(manager.state(), ConnectionState::Closed);
    }
}
