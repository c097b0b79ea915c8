//! Connection Manager
//!
//! One resilient, authenticated, heartbeat-monitored socket per logical
//! channel.
//!
//! The public handle is cheap to call from anywhere. All lifecycle state
//! lives in a single event-loop task that processes commands, connect
//! results, transport events, token changes and timer expiries one at a
//! time. The task publishes a status snapshot and the current writer after
//! every step so `send()` and `status()` never wait on it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use url::Url;
use uuid::Uuid;

use super::timers::{TimerKind, Timers};
use crate::application::dto::{InboundMessage, OutboundMessage};
use crate::config::Settings;
use crate::domain::{
    AuthProvider, CloseDisposition, ClosePolicy, ConnectionState, Connector, Credentials,
    EnvironmentSignal, Frame, HeartbeatState, RetryPolicy, Socket, TransportEvent, CLOSE_ABNORMAL,
    CLOSE_HEARTBEAT_TIMEOUT, CLOSE_NORMAL,
};
use crate::infrastructure::metrics;
use crate::shared::error::{ClientError, ClientResult};

/// Per-channel tuning, usually derived from [`Settings`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Channel path segment, e.g. `chat`
    pub channel: String,
    pub ws_base_url: String,
    pub connect_timeout: Duration,
    pub debounce: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub ping_interval: Duration,
    /// `0` disables missed-pong detection
    pub max_missed_pongs: u32,
    pub refresh_threshold: Duration,
    pub refresh_lead: Duration,
    pub close_policy: ClosePolicy,
}

impl ManagerConfig {
    pub fn new(ws_base_url: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ws_base_url: ws_base_url.into(),
            connect_timeout: Duration::from_secs(10),
            debounce: Duration::from_millis(500),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            ping_interval: Duration::from_secs(30),
            max_missed_pongs: 2,
            refresh_threshold: Duration::from_secs(300),
            refresh_lead: Duration::from_secs(60),
            close_policy: ClosePolicy::default(),
        }
    }

    pub fn from_settings(settings: &Settings, channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ws_base_url: settings.server.ws_base_url.clone(),
            connect_timeout: Duration::from_millis(settings.connection.connect_timeout_ms),
            debounce: Duration::from_millis(settings.connection.debounce_ms),
            base_delay: Duration::from_millis(settings.reconnect.base_delay_ms),
            max_delay: Duration::from_millis(settings.reconnect.max_delay_ms),
            max_attempts: settings.reconnect.max_attempts,
            ping_interval: Duration::from_millis(settings.heartbeat.ping_interval_ms),
            max_missed_pongs: settings.heartbeat.max_missed_pongs,
            refresh_threshold: Duration::from_secs(settings.auth.refresh_threshold_secs),
            refresh_lead: Duration::from_secs(settings.auth.refresh_lead_secs),
            close_policy: ClosePolicy {
                auth_failure_codes: settings.close_codes.auth_failure.clone(),
                access_denied_codes: settings.close_codes.access_denied.clone(),
            },
        }
    }

    /// `<ws_base_url>/ws/<channel>/?token=<token>`
    ///
    /// `http(s)` bases are mapped to `ws(s)`.
    pub fn channel_url(&self, token: &str) -> ClientResult<Url> {
        let mut base = Url::parse(&self.ws_base_url)?;
        let scheme = match base.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => {
                return Err(ClientError::InvalidUrl(format!(
                    "unsupported scheme `{}`",
                    other
                )))
            }
        };
        if base.scheme() != scheme && base.set_scheme(scheme).is_err() {
            return Err(ClientError::InvalidUrl(format!(
                "cannot switch `{}` to `{}`",
                base.scheme(),
                scheme
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut url = base.join(&format!("ws/{}/", self.channel.trim_matches('/')))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

/// Lifecycle notifications for subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// A retry has been scheduled; `attempt` is 1-based.
    Reconnecting { attempt: u32, delay: Duration },
    Error { error: ClientError, fatal: bool },
}

/// Read-only snapshot of a manager
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagerStatus {
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last `Open`
    pub attempts: u32,
    pub pending_timers: usize,
    pub sockets_created: u64,
    pub last_pong_at: Option<DateTime<Utc>>,
    /// Round trip of the last answered ping
    pub last_round_trip: Option<Duration>,
    /// Deadline of the scheduled retry, if any
    pub retry_at: Option<Instant>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

pub type MessageHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;
pub type StateHandler = Arc<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;
pub type EventHandler = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

struct Writer {
    generation: u64,
    frames: mpsc::UnboundedSender<Frame>,
}

#[derive(Default)]
struct Link {
    status: ManagerStatus,
    writer: Option<Writer>,
}

/// State shared between the handle and the event loop
#[derive(Default)]
struct Shared {
    link: RwLock<Link>,
    message_handlers: RwLock<Vec<MessageHandler>>,
    state_handlers: RwLock<Vec<StateHandler>>,
    event_handlers: RwLock<Vec<EventHandler>>,
}

impl Shared {
    // Handlers are cloned out so a handler may subscribe or call back into
    // the manager without deadlocking.
    fn message_handlers(&self) -> Vec<MessageHandler> {
        self.message_handlers.read().clone()
    }

    fn state_handlers(&self) -> Vec<StateHandler> {
        self.state_handlers.read().clone()
    }

    fn event_handlers(&self) -> Vec<EventHandler> {
        self.event_handlers.read().clone()
    }
}

enum Command {
    Connect,
    Reconnect,
    Disconnect {
        code: u16,
        reason: String,
        ack: oneshot::Sender<()>,
    },
    SendFailed {
        generation: u64,
        reason: String,
    },
    Environment(EnvironmentSignal),
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Handle to one channel's event loop.
///
/// Must be created inside a tokio runtime. Dropping the handle stops the
/// loop and closes the socket.
pub struct ConnectionManager {
    channel: String,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        config: ManagerConfig,
        connector: Arc<dyn Connector>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        let channel = config.channel.clone();
        let shared = Arc::new(Shared::default());
        let (commands, command_rx) = mpsc::unbounded_channel();

        let driver = Driver::new(config, connector, auth, Arc::clone(&shared), command_rx);
        let task = tokio::spawn(driver.run());

        Self {
            channel,
            shared,
            commands,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Open the channel. No-op while connecting or open.
    pub fn connect(&self) -> ClientResult<()> {
        self.command(Command::Connect)
    }

    /// Reset the retry budget and connect; used after a fatal error.
    pub fn reconnect(&self) -> ClientResult<()> {
        self.command(Command::Reconnect)
    }

    /// Close intentionally; no reconnect follows. Resolves once processed.
    pub async fn disconnect(&self, code: u16, reason: impl Into<String>) -> ClientResult<()> {
        let (ack, done) = oneshot::channel();
        self.command(Command::Disconnect {
            code,
            reason: reason.into(),
            ack,
        })?;
        done.await.map_err(|_| ClientError::ManagerClosed)
    }

    /// Forward an environment change to the event loop.
    pub fn notify_environment(&self, signal: EnvironmentSignal) -> ClientResult<()> {
        self.command(Command::Environment(signal))
    }

    /// Write one message to the open socket.
    ///
    /// Fails with `NotConnected` unless the channel is open. Nothing is
    /// queued.
    pub fn send(&self, message: &OutboundMessage) -> ClientResult<()> {
        let link = self.shared.link.read();
        let writer = match (&link.writer, link.status.state) {
            (Some(writer), ConnectionState::Open) => writer,
            (_, state) => return Err(ClientError::NotConnected { state }),
        };

        let text = message.to_json()?;
        if writer.frames.send(Frame::Text(text)).is_ok() {
            return Ok(());
        }

        let generation = writer.generation;
        drop(link);
        let reason = "socket writer closed".to_string();
        tracing::warn!(channel = %self.channel, generation, "Send failed; socket writer closed");
        let _ = self.commands.send(Command::SendFailed {
            generation,
            reason: reason.clone(),
        });
        Err(ClientError::Transport(reason))
    }

    /// Send any serializable object carrying its own `type` tag.
    pub fn send_json<T: Serialize>(&self, value: &T) -> ClientResult<()> {
        let message = OutboundMessage::from_serialize(value)?;
        self.send(&message)
    }

    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.shared.message_handlers.write().push(Arc::new(handler));
    }

    pub fn on_state_change<F>(&self, handler: F)
    where
        F: Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    {
        self.shared.state_handlers.write().push(Arc::new(handler));
    }

    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.shared.event_handlers.write().push(Arc::new(handler));
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.link.read().status.state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    pub fn status(&self) -> ManagerStatus {
        self.shared.link.read().status.clone()
    }

    /// Close the socket, clear every timer and stop the event loop.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.command(Command::Shutdown { ack }).is_ok() {
            let _ = done.await;
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(channel = %self.channel, error = %e, "Event loop ended abnormally");
            }
        }
    }

    fn command(&self, command: Command) -> ClientResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::ManagerClosed)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("channel", &self.channel)
            .field("status", &self.status())
            .finish()
    }
}

/// Why a manager stopped trying on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    /// Token missing, rejected or forbidden
    Credentials,
    /// Retry budget spent
    Exhausted,
}

struct ActiveSocket {
    generation: u64,
    id: Uuid,
    frames: mpsc::UnboundedSender<Frame>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

type ConnectResult = (u64, ClientResult<Socket>);

/// The event loop
struct Driver {
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    auth: Arc<dyn AuthProvider>,
    tokens: watch::Receiver<Option<String>>,
    tokens_open: bool,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    results_tx: mpsc::UnboundedSender<ConnectResult>,
    results: mpsc::UnboundedReceiver<ConnectResult>,

    state: ConnectionState,
    retry: RetryPolicy,
    heartbeat: HeartbeatState,
    timers: Timers,
    credentials: Option<Credentials>,
    token_deadline: Option<Instant>,
    /// Token the last proactive refresh reconnected with
    refreshed_with: Option<String>,
    generation: u64,
    socket: Option<ActiveSocket>,
    pending_connect: Option<JoinHandle<()>>,
    last_attempt: Option<Instant>,
    sockets_created: u64,
    suspended: bool,
    halted: Option<Halt>,
}

impl Driver {
    fn new(
        config: ManagerConfig,
        connector: Arc<dyn Connector>,
        auth: Arc<dyn AuthProvider>,
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let retry = RetryPolicy::new(config.base_delay, config.max_delay, config.max_attempts);
        let tokens = auth.subscribe();
        let (results_tx, results) = mpsc::unbounded_channel();

        Self {
            config,
            connector,
            auth,
            tokens,
            tokens_open: true,
            shared,
            commands,
            results_tx,
            results,
            state: ConnectionState::Idle,
            retry,
            heartbeat: HeartbeatState::new(),
            timers: Timers::new(),
            credentials: None,
            token_deadline: None,
            refreshed_with: None,
            generation: 0,
            socket: None,
            pending_connect: None,
            last_attempt: None,
            sockets_created: 0,
            suspended: false,
            halted: None,
        }
    }

    async fn run(mut self) {
        tracing::debug!(channel = %self.config.channel, "Connection manager started");
        self.publish();

        loop {
            let deadline = self.timers.next_deadline();

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { ack }) => {
                        self.close_intentionally(CLOSE_NORMAL, "shutdown");
                        self.publish();
                        let _ = ack.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.close_intentionally(CLOSE_NORMAL, "manager dropped");
                        break;
                    }
                },
                Some((generation, result)) = self.results.recv() => {
                    self.on_connect_result(generation, result);
                }
                (generation, event) = next_transport_event(&mut self.socket) => {
                    self.on_transport_event(generation, event);
                }
                changed = self.tokens.changed(), if self.tokens_open => match changed {
                    Ok(()) => self.on_token_changed(),
                    Err(_) => self.tokens_open = false,
                },
                _ = sleep_until_deadline(deadline) => self.fire_timers(),
            }

            self.publish();
        }

        self.publish();
        tracing::debug!(channel = %self.config.channel, "Connection manager stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                self.suspended = false;
                self.request_connect("connect requested");
            }
            Command::Reconnect => {
                self.retry.reset();
                self.halted = None;
                self.suspended = false;
                self.request_connect("manual reconnect");
            }
            Command::Disconnect { code, reason, ack } => {
                self.close_intentionally(code, &reason);
                self.publish();
                let _ = ack.send(());
            }
            Command::SendFailed { generation, reason } => {
                if self.is_current(generation) {
                    self.handle_failure(ClientError::Transport(reason));
                }
            }
            Command::Environment(signal) => self.on_environment(signal),
            // Handled by the loop itself
            Command::Shutdown { ack } => {
                let _ = ack.send(());
            }
        }
    }

    fn request_connect(&mut self, origin: &'static str) {
        if self.state.is_active() {
            tracing::debug!(channel = %self.config.channel, state = %self.state, origin, "Already active; connect ignored");
            return;
        }

        let Some(token) = self.auth.current_token() else {
            self.timers.cancel(TimerKind::ReconnectDelay);
            self.timers.cancel(TimerKind::Debounce);
            self.halted = Some(Halt::Credentials);
            self.set_state(ConnectionState::Closed);
            self.emit_error(ClientError::MissingCredentials);
            return;
        };

        let now = Instant::now();
        if let Some(last) = self.last_attempt {
            let ready_at = last + self.config.debounce;
            if now < ready_at {
                tracing::debug!(
                    channel = %self.config.channel,
                    origin,
                    wait_ms = (ready_at - now).as_millis() as u64,
                    "Connect debounced"
                );
                self.timers.schedule(TimerKind::Debounce, ready_at);
                return;
            }
        }

        self.timers.cancel(TimerKind::Debounce);
        self.timers.cancel(TimerKind::ReconnectDelay);
        self.open_socket(token, origin);
    }

    fn open_socket(&mut self, token: String, origin: &'static str) {
        self.teardown_socket(None);

        let credentials = Credentials::from_token(token);
        if credentials.is_expired(Utc::now()) {
            tracing::warn!(
                channel = %self.config.channel,
                expires_at = ?credentials.expires_at(),
                "Connecting with an expired token"
            );
        }
        let url = match self.config.channel_url(credentials.token()) {
            Ok(url) => url,
            Err(e) => {
                self.halted = Some(Halt::Credentials);
                self.set_state(ConnectionState::Closed);
                self.emit_error(e);
                return;
            }
        };
        self.apply_credentials(credentials);

        let now = Instant::now();
        self.generation += 1;
        self.sockets_created += 1;
        self.last_attempt = Some(now);
        self.halted = None;
        self.suspended = false;
        metrics::record_connection_attempt(&self.config.channel);

        let generation = self.generation;
        tracing::info!(
            channel = %self.config.channel,
            generation,
            attempt = self.retry.attempts(),
            origin,
            "Opening socket"
        );

        self.set_state(ConnectionState::Connecting);
        self.timers
            .schedule(TimerKind::ConnectTimeout, now + self.config.connect_timeout);

        let connector = Arc::clone(&self.connector);
        let results = self.results_tx.clone();
        self.pending_connect = Some(tokio::spawn(async move {
            let result = connector.connect(url).await;
            let _ = results.send((generation, result));
        }));
    }

    fn on_connect_result(&mut self, generation: u64, result: ClientResult<Socket>) {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            tracing::debug!(channel = %self.config.channel, generation, "Discarding stale connect result");
            return;
        }
        self.pending_connect = None;
        self.timers.cancel(TimerKind::ConnectTimeout);

        match result {
            Ok(socket) => self.on_open(socket),
            Err(error) if error.is_fatal() => {
                tracing::error!(channel = %self.config.channel, error = %error, "Connection rejected");
                self.fail_terminal(error);
            }
            Err(error) => {
                tracing::warn!(channel = %self.config.channel, error = %error, "Connection attempt failed");
                self.handle_failure(error);
            }
        }
    }

    fn on_open(&mut self, socket: Socket) {
        let id = Uuid::new_v4();
        self.socket = Some(ActiveSocket {
            generation: self.generation,
            id,
            frames: socket.outbound,
            events: socket.inbound,
        });

        self.retry.reset();
        self.heartbeat.reset();
        self.timers.schedule(
            TimerKind::Heartbeat,
            Instant::now() + self.config.ping_interval,
        );
        self.schedule_token_check();

        tracing::info!(channel = %self.config.channel, connection_id = %id, "Socket open");
        self.set_state(ConnectionState::Open);
    }

    fn on_transport_event(&mut self, generation: u64, event: Option<TransportEvent>) {
        if !self.is_current(generation) {
            return;
        }

        match event {
            Some(TransportEvent::Text(text)) => self.on_text(&text),
            Some(TransportEvent::Closed { code, reason }) => self.on_close(code, reason),
            Some(TransportEvent::Error(reason)) => {
                tracing::warn!(channel = %self.config.channel, error = %reason, "Transport error");
                self.handle_failure(ClientError::Transport(reason));
            }
            None => self.on_close(CLOSE_ABNORMAL, "transport ended without close frame".into()),
        }
    }

    fn on_text(&mut self, text: &str) {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(channel = %self.config.channel, error = %e, "Dropping malformed message");
                return;
            }
        };
        metrics::record_message(&self.config.channel, message.kind());

        match &message {
            InboundMessage::Ping { timestamp } => {
                let echo = timestamp.unwrap_or_else(|| Utc::now().timestamp_millis());
                self.write(&OutboundMessage::pong(echo));
            }
            InboundMessage::Pong { .. } => {
                self.heartbeat.record_pong(Instant::now());
                tracing::trace!(
                    channel = %self.config.channel,
                    round_trip_ms = self.heartbeat.round_trip().map(|rtt| rtt.as_millis() as u64),
                    "Pong received"
                );
            }
            InboundMessage::Error { message } => {
                tracing::warn!(channel = %self.config.channel, error = %message, "Server reported an error");
                self.emit(ConnectionEvent::Error {
                    error: ClientError::Server(message.clone()),
                    fatal: false,
                });
            }
            InboundMessage::ConnectionEstablished { .. } => {
                tracing::info!(channel = %self.config.channel, "Channel established");
                self.dispatch(&message);
            }
            InboundMessage::Event { .. } => self.dispatch(&message),
        }
    }

    fn on_close(&mut self, code: u16, reason: String) {
        let disposition = self.config.close_policy.classify(code);
        tracing::info!(
            channel = %self.config.channel,
            code,
            reason = %reason,
            disposition = ?disposition,
            "Socket closed by peer"
        );

        let detail = if reason.is_empty() {
            format!("close code {}", code)
        } else {
            reason
        };

        match disposition {
            CloseDisposition::Normal => {
                self.teardown_socket(None);
                self.timers.clear();
                self.set_state(ConnectionState::Closed);
            }
            CloseDisposition::AuthFailed => self.fail_terminal(ClientError::AuthRejected(detail)),
            CloseDisposition::AccessDenied => {
                self.fail_terminal(ClientError::AccessDenied(detail))
            }
            CloseDisposition::Retry => self.handle_failure(ClientError::Transport(format!(
                "closed with code {}: {}",
                code, detail
            ))),
        }
    }

    /// Unexpected loss of the socket: retry with backoff or give up.
    fn handle_failure(&mut self, cause: ClientError) {
        self.teardown_socket(None);
        self.timers.cancel_all(&TimerKind::CONNECTION_SCOPED);
        self.timers.cancel(TimerKind::Debounce);

        match self.retry.next_delay() {
            Some(delay) => {
                let attempt = self.retry.attempts();
                tracing::warn!(
                    channel = %self.config.channel,
                    attempt,
                    max_attempts = self.retry.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    cause = %cause,
                    "Scheduling reconnect"
                );
                self.timers
                    .schedule(TimerKind::ReconnectDelay, Instant::now() + delay);
                metrics::record_reconnect_scheduled(&self.config.channel);
                self.set_state(ConnectionState::Closed);
                self.emit(ConnectionEvent::Reconnecting { attempt, delay });
            }
            None => {
                let attempts = self.retry.attempts();
                tracing::error!(
                    channel = %self.config.channel,
                    attempts,
                    cause = %cause,
                    "Reconnection abandoned"
                );
                self.timers.clear();
                self.halted = Some(Halt::Exhausted);
                self.set_state(ConnectionState::Closed);
                self.emit_error(ClientError::RetriesExhausted { attempts });
            }
        }
    }

    fn fail_terminal(&mut self, error: ClientError) {
        self.teardown_socket(None);
        self.timers.clear();
        self.halted = Some(Halt::Credentials);
        self.set_state(ConnectionState::Closed);
        self.emit_error(error);
    }

    /// Caller-initiated close: nothing is rescheduled.
    fn close_intentionally(&mut self, code: u16, reason: &str) {
        self.timers.clear();
        self.retry.reset();

        let live = self.socket.is_some() || self.state == ConnectionState::Connecting;
        if live {
            tracing::info!(channel = %self.config.channel, code, reason, "Closing socket");
            self.set_state(ConnectionState::Closing);
        }
        self.teardown_socket(Some((code, reason)));

        if self.state != ConnectionState::Idle {
            self.set_state(ConnectionState::Closed);
        }
    }

    /// Release the current socket and any in-flight attempt.
    fn teardown_socket(&mut self, close: Option<(u16, &str)>) {
        if let Some(pending) = self.pending_connect.take() {
            pending.abort();
        }
        if let Some(socket) = self.socket.take() {
            if let Some((code, reason)) = close {
                let _ = socket.frames.send(Frame::Close {
                    code,
                    reason: reason.to_string(),
                });
            }
            tracing::debug!(channel = %self.config.channel, connection_id = %socket.id, "Socket released");
        }
        self.heartbeat.reset();
    }

    fn fire_timers(&mut self) {
        let now = Instant::now();
        while let Some(kind) = self.timers.pop_expired(now) {
            match kind {
                TimerKind::ConnectTimeout => {
                    if self.state == ConnectionState::Connecting {
                        tracing::warn!(
                            channel = %self.config.channel,
                            timeout_ms = self.config.connect_timeout.as_millis() as u64,
                            "Connection attempt timed out"
                        );
                        self.handle_failure(ClientError::ConnectTimeout(
                            self.config.connect_timeout,
                        ));
                    }
                }
                // A hidden host only reconnects on an explicit resume
                TimerKind::ReconnectDelay | TimerKind::Debounce if self.suspended => {
                    tracing::debug!(channel = %self.config.channel, timer = ?kind, "Suspended; timer ignored");
                }
                TimerKind::ReconnectDelay => self.request_connect("retry"),
                TimerKind::Debounce => self.request_connect("debounced"),
                TimerKind::Heartbeat => self.on_heartbeat_tick(),
                TimerKind::TokenRefresh => self.on_token_timer(),
            }
        }
    }

    fn on_heartbeat_tick(&mut self) {
        if self.state != ConnectionState::Open {
            return;
        }

        let missed = self.heartbeat.on_tick();
        if missed > 0 {
            metrics::record_heartbeat_missed(&self.config.channel);
            tracing::debug!(channel = %self.config.channel, missed, "Pong overdue");
        }

        if self.config.max_missed_pongs > 0 && missed >= self.config.max_missed_pongs {
            tracing::warn!(channel = %self.config.channel, missed, "Heartbeat timed out; recycling socket");
            self.teardown_socket(Some((CLOSE_HEARTBEAT_TIMEOUT, "heartbeat timeout")));
            self.handle_failure(ClientError::HeartbeatTimeout { missed });
            return;
        }

        if self.write(&OutboundMessage::ping(Utc::now().timestamp_millis())) {
            let now = Instant::now();
            self.heartbeat.record_ping(now);
            self.timers
                .schedule(TimerKind::Heartbeat, now + self.config.ping_interval);
        }
    }

    fn schedule_token_check(&mut self) {
        self.timers.cancel(TimerKind::TokenRefresh);
        let Some(expires) = self.token_deadline else {
            return;
        };

        let now = Instant::now();
        let remaining = expires.saturating_duration_since(now);
        let at = if remaining <= self.config.refresh_threshold {
            let at = expires
                .checked_sub(self.config.refresh_lead)
                .unwrap_or(now)
                .max(now);
            tracing::debug!(
                channel = %self.config.channel,
                refresh_in_ms = (at - now).as_millis() as u64,
                "Token expiring soon; proactive reconnect scheduled"
            );
            at
        } else {
            expires - self.config.refresh_threshold
        };
        self.timers.schedule(TimerKind::TokenRefresh, at);
    }

    fn on_token_timer(&mut self) {
        if self.state != ConnectionState::Open {
            return;
        }
        let Some(expires) = self.token_deadline else {
            return;
        };

        let remaining = expires.saturating_duration_since(Instant::now());
        if remaining > self.config.refresh_lead {
            self.schedule_token_check();
            return;
        }

        let current = self.auth.current_token();
        if current.is_some() && current == self.refreshed_with {
            tracing::warn!(
                channel = %self.config.channel,
                remaining_ms = remaining.as_millis() as u64,
                "Token expiring and no fresh token available"
            );
            return;
        }
        self.refreshed_with = current;

        tracing::info!(
            channel = %self.config.channel,
            remaining_ms = remaining.as_millis() as u64,
            "Refreshing connection ahead of token expiry"
        );
        self.close_intentionally(CLOSE_NORMAL, "token refresh");
        self.request_connect("token refresh");
    }

    fn on_token_changed(&mut self) {
        let token = self.tokens.borrow_and_update().clone();
        match token {
            None => {
                self.credentials = None;
                self.token_deadline = None;
                self.timers.cancel(TimerKind::TokenRefresh);
                if self.state.is_active() {
                    tracing::info!(channel = %self.config.channel, "Credentials cleared; closing channel");
                    self.close_intentionally(CLOSE_NORMAL, "logged out");
                }
            }
            Some(token) => {
                self.apply_credentials(Credentials::from_token(token));
                if self.halted == Some(Halt::Credentials) {
                    self.halted = None;
                }
                if self.state == ConnectionState::Open {
                    self.schedule_token_check();
                }
            }
        }
    }

    fn apply_credentials(&mut self, credentials: Credentials) {
        self.token_deadline = credentials.time_to_expiry(Utc::now()).map(|remaining| {
            Instant::now() + remaining.to_std().unwrap_or(Duration::ZERO)
        });
        tracing::debug!(
            channel = %self.config.channel,
            expires_at = ?credentials.expires_at(),
            "Credentials updated"
        );
        self.credentials = Some(credentials);
    }

    fn on_environment(&mut self, signal: EnvironmentSignal) {
        tracing::debug!(channel = %self.config.channel, signal = ?signal, "Environment changed");
        match signal {
            EnvironmentSignal::Hidden => {
                if self.state.is_active() {
                    self.close_intentionally(CLOSE_NORMAL, "app hidden");
                    self.suspended = true;
                } else if self.timers.is_scheduled(TimerKind::ReconnectDelay)
                    || self.timers.is_scheduled(TimerKind::Debounce)
                {
                    tracing::info!(channel = %self.config.channel, "Pending reconnect suspended while hidden");
                    self.timers.cancel(TimerKind::ReconnectDelay);
                    self.timers.cancel(TimerKind::Debounce);
                    self.suspended = true;
                }
            }
            EnvironmentSignal::Visible => {
                let resume = self.suspended || self.halted.is_none();
                if resume && self.should_resume() {
                    self.suspended = false;
                    self.request_connect("app visible");
                }
            }
            EnvironmentSignal::Online => {
                if self.halted != Some(Halt::Credentials) && self.should_resume() {
                    self.retry.reset();
                    self.halted = None;
                    self.suspended = false;
                    self.request_connect("network online");
                }
            }
            EnvironmentSignal::Offline => {
                tracing::info!(channel = %self.config.channel, "Network offline");
            }
        }
    }

    /// Environment triggers only revive a channel that has been used.
    fn should_resume(&self) -> bool {
        !self.state.is_active()
            && self.state != ConnectionState::Idle
            && self.auth.current_token().is_some()
    }

    fn write(&mut self, message: &OutboundMessage) -> bool {
        let Some(socket) = &self.socket else {
            return false;
        };
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(channel = %self.config.channel, error = %e, "Failed to encode frame");
                return false;
            }
        };
        if socket.frames.send(Frame::Text(text)).is_err() {
            self.handle_failure(ClientError::Transport("socket writer closed".into()));
            return false;
        }
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.socket
            .as_ref()
            .map(|socket| socket.generation == generation)
            .unwrap_or(false)
    }

    fn set_state(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.publish();
        metrics::set_connection_state(&self.config.channel, to);
        tracing::debug!(channel = %self.config.channel, from = %from, to = %to, "State changed");

        for handler in self.shared.state_handlers() {
            handler(from, to);
        }
        self.emit(ConnectionEvent::StateChanged { from, to });
    }

    fn dispatch(&self, message: &InboundMessage) {
        for handler in self.shared.message_handlers() {
            handler(message);
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        for handler in self.shared.event_handlers() {
            handler(&event);
        }
    }

    fn emit_error(&self, error: ClientError) {
        let fatal = error.is_fatal();
        if fatal {
            tracing::error!(channel = %self.config.channel, error = %error, kind = error.kind(), "Channel halted");
        }
        self.emit(ConnectionEvent::Error { error, fatal });
    }

    fn publish(&self) {
        let writer = match (&self.socket, self.state) {
            (Some(socket), ConnectionState::Open) => Some(Writer {
                generation: socket.generation,
                frames: socket.frames.clone(),
            }),
            _ => None,
        };

        let status = ManagerStatus {
            state: self.state,
            attempts: self.retry.attempts(),
            pending_timers: self.timers.pending(),
            sockets_created: self.sockets_created,
            last_pong_at: self.heartbeat.last_pong_at(),
            last_round_trip: self.heartbeat.round_trip(),
            retry_at: self.timers.deadline(TimerKind::ReconnectDelay),
            token_expires_at: self.credentials.as_ref().and_then(Credentials::expires_at),
        };

        let mut link = self.shared.link.write();
        link.status = status;
        link.writer = writer;
    }
}

async fn next_transport_event(
    socket: &mut Option<ActiveSocket>,
) -> (u64, Option<TransportEvent>) {
    match socket {
        Some(socket) => (socket.generation, socket.events.recv().await),
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
