//! Common Test Utilities
//!
//! In-memory transport, token minting and event capture for driving a
//! connection manager on paused tokio time.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Instant};
use url::Url;

use chat_realtime::application::dto::InboundMessage;
use chat_realtime::application::services::{ConnectionEvent, ConnectionManager, ManagerConfig};
use chat_realtime::domain::{ConnectionState, Connector, Frame, Socket, TransportEvent};
use chat_realtime::infrastructure::auth::TokenStore;
use chat_realtime::shared::error::ClientError;

/// Upper bound for any single wait; generous because time is paused.
pub const WAIT: Duration = Duration::from_secs(3600);

pub const TEST_TOKEN: &str = "test-token";

/// Let every ready task run without advancing the clock.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// JWT-shaped token whose `exp` lies `expires_in` from now.
pub fn mint_token(expires_in: chrono::Duration) -> String {
    let exp = (chrono::Utc::now() + expires_in).timestamp();
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(json!({"user_id": 7, "exp": exp}).to_string())
    )
}

/// Timer deadlines land on millisecond ticks; allow for the rounding.
pub fn assert_elapsed(since: Instant, expected: Duration) {
    let elapsed = since.elapsed();
    assert!(
        elapsed >= expected && elapsed <= expected + Duration::from_millis(10),
        "expected ~{:?}, got {:?}",
        expected,
        elapsed
    );
}

pub fn test_config() -> ManagerConfig {
    ManagerConfig::new("ws://chat.test", "chat")
}

/// A connect call waiting for the test to decide its outcome
pub struct PendingConnect {
    pub url: Url,
    respond: oneshot::Sender<Result<Socket, ClientError>>,
}

impl PendingConnect {
    pub fn token(&self) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
    }

    pub fn accept(self) -> ServerSocket {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = self.respond.send(Ok(Socket::new(frames_tx, events_rx)));
        ServerSocket {
            frames: frames_rx,
            events: events_tx,
        }
    }

    pub fn reject(self, error: ClientError) {
        let _ = self.respond.send(Err(error));
    }
}

/// The far end of an accepted fake socket
pub struct ServerSocket {
    frames: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl ServerSocket {
    pub fn send_json(&self, value: Value) {
        let _ = self.events.send(TransportEvent::Text(value.to_string()));
    }

    pub fn send_text(&self, text: &str) {
        let _ = self.events.send(TransportEvent::Text(text.to_string()));
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.events.send(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.events.send(TransportEvent::Error(reason.to_string()));
    }

    /// Next frame written by the client; `None` once the client let go.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for a client frame")
    }

    pub async fn next_json(&mut self) -> Value {
        match self.next_frame().await {
            Some(Frame::Text(text)) => serde_json::from_str(&text).expect("client wrote invalid JSON"),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    /// Drain buffered frames; reports whether the client released the socket.
    pub fn drain(&mut self) -> (Vec<Frame>, bool) {
        let mut frames = Vec::new();
        loop {
            match self.frames.try_recv() {
                Ok(frame) => frames.push(frame),
                Err(TryRecvError::Empty) => return (frames, false),
                Err(TryRecvError::Disconnected) => return (frames, true),
            }
        }
    }
}

/// Connector whose every call is handed to the test as a `PendingConnect`
pub struct FakeConnector {
    requests: mpsc::UnboundedSender<PendingConnect>,
    calls: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PendingConnect>) {
        let (requests, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            requests,
            calls: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: Url) -> Result<Socket, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (respond, response) = oneshot::channel();
        if self.requests.send(PendingConnect { url, respond }).is_err() {
            return Err(ClientError::Transport("test harness dropped".into()));
        }
        response
            .await
            .unwrap_or_else(|_| Err(ClientError::Transport("connect abandoned".into())))
    }
}

/// One manager wired to a fake connector, with its output captured
pub struct Harness {
    pub manager: Arc<ConnectionManager>,
    pub tokens: TokenStore,
    pub connector: Arc<FakeConnector>,
    connects: mpsc::UnboundedReceiver<PendingConnect>,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    messages: mpsc::UnboundedReceiver<InboundMessage>,
}

impl Harness {
    pub fn new(config: ManagerConfig, tokens: TokenStore) -> Self {
        let (connector, connects) = FakeConnector::new();
        let manager = Arc::new(ConnectionManager::new(
            config,
            connector.clone(),
            Arc::new(tokens.clone()),
        ));

        let (events_tx, events) = mpsc::unbounded_channel();
        manager.on_event(move |event| {
            let _ = events_tx.send(event.clone());
        });
        let (messages_tx, messages) = mpsc::unbounded_channel();
        manager.on_message(move |message| {
            let _ = messages_tx.send(message.clone());
        });

        Self {
            manager,
            tokens,
            connector,
            connects,
            events,
            messages,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(test_config(), TokenStore::with_token(TEST_TOKEN))
    }

    pub async fn next_connect(&mut self) -> PendingConnect {
        timeout(WAIT, self.connects.recv())
            .await
            .expect("timed out waiting for a connect attempt")
            .expect("connector dropped")
    }

    /// A connect attempt that has already been made, if any.
    pub fn try_connect(&mut self) -> Option<PendingConnect> {
        self.connects.try_recv().ok()
    }

    pub async fn next_event(&mut self) -> ConnectionEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for a connection event")
            .expect("event stream ended")
    }

    pub fn drain_events(&mut self) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn wait_for_state(&mut self, state: ConnectionState) {
        loop {
            if let ConnectionEvent::StateChanged { to, .. } = self.next_event().await {
                if to == state {
                    return;
                }
            }
        }
    }

    pub async fn next_reconnecting(&mut self) -> (u32, Duration) {
        loop {
            if let ConnectionEvent::Reconnecting { attempt, delay } = self.next_event().await {
                return (attempt, delay);
            }
        }
    }

    pub async fn next_error(&mut self) -> (ClientError, bool) {
        loop {
            if let ConnectionEvent::Error { error, fatal } = self.next_event().await {
                return (error, fatal);
            }
        }
    }

    pub async fn next_message(&mut self) -> InboundMessage {
        timeout(WAIT, self.messages.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("message stream ended")
    }

    /// Accept the next connect attempt and wait for `Open`.
    pub async fn accept_next(&mut self) -> ServerSocket {
        let server = self.next_connect().await.accept();
        self.wait_for_state(ConnectionState::Open).await;
        server
    }

    /// `connect()` and complete the handshake.
    pub async fn open(&mut self) -> ServerSocket {
        self.manager.connect().expect("manager is running");
        self.accept_next().await
    }
}
