//! Application Startup
//!
//! Builds one manager per configured channel and wires the subscribers the
//! binary needs.

use std::sync::Arc;

use anyhow::Result;

use crate::application::dto::InboundMessage;
use crate::application::services::{ConnectionEvent, ConnectionManager, UnreadTracker};
use crate::config::Settings;
use crate::domain::{AuthProvider, Connector, CLOSE_NORMAL};
use crate::infrastructure::auth::TokenStore;
use crate::infrastructure::http::HttpSnapshotClient;
use crate::infrastructure::metrics;
use crate::infrastructure::websocket::WsConnector;
use crate::presentation::{ChannelKind, ChatChannel, EnvironmentMonitor, NotificationChannel};

/// Application instance
pub struct Application {
    settings: Arc<Settings>,
    tokens: TokenStore,
    chat: ChatChannel,
    notifications: NotificationChannel,
    assistant: Arc<ConnectionManager>,
    environment: EnvironmentMonitor,
}

impl Application {
    /// Build the application from settings using the WebSocket transport.
    pub fn build(settings: Settings, tokens: TokenStore) -> Result<Self> {
        Self::build_with_connector(settings, tokens, Arc::new(WsConnector::default()))
    }

    /// Build with a custom transport.
    pub fn build_with_connector(
        settings: Settings,
        tokens: TokenStore,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let auth: Arc<dyn AuthProvider> = Arc::new(tokens.clone());
        let environment = EnvironmentMonitor::new();

        let manager = |kind: ChannelKind| {
            let manager = Arc::new(ConnectionManager::new(
                kind.manager_config(&settings),
                Arc::clone(&connector),
                Arc::clone(&auth),
            ));
            log_traffic(&manager);
            environment.register(&manager);
            manager
        };

        // Create chat channel with unread tracking
        let snapshot = HttpSnapshotClient::from_settings(&settings, Arc::clone(&auth))?;
        tracing::info!(url = %snapshot.url(), "Unread snapshot endpoint configured");
        let unread = UnreadTracker::new(Arc::new(snapshot));
        unread.on_change(|total| tracing::info!(total, "Unread count changed"));
        let chat = ChatChannel::new(manager(ChannelKind::Chat), unread);

        let notifications = NotificationChannel::new(manager(ChannelKind::Notifications));
        let assistant = manager(ChannelKind::Assistant);

        Ok(Self {
            settings: Arc::new(settings),
            tokens,
            chat,
            notifications,
            assistant,
            environment,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn chat(&self) -> &ChatChannel {
        &self.chat
    }

    pub fn notifications(&self) -> &NotificationChannel {
        &self.notifications
    }

    pub fn assistant(&self) -> &Arc<ConnectionManager> {
        &self.assistant
    }

    pub fn environment(&self) -> &EnvironmentMonitor {
        &self.environment
    }

    pub fn managers(&self) -> [&Arc<ConnectionManager>; 3] {
        [self.chat.manager(), self.notifications.manager(), &self.assistant]
    }

    /// Ask every channel to connect.
    pub fn connect_all(&self) -> Result<()> {
        for manager in self.managers() {
            manager.connect()?;
        }
        Ok(())
    }

    /// Close every channel and stop the event loops.
    pub async fn shutdown(&self) {
        for manager in self.managers() {
            if let Err(e) = manager.disconnect(CLOSE_NORMAL, "client shutdown").await {
                tracing::debug!(channel = manager.channel(), error = %e, "Disconnect skipped");
            }
            manager.shutdown().await;
        }
        tracing::info!("All channels closed");
        tracing::debug!(metrics = %metrics::gather_metrics(), "Final metrics");
    }

    /// Connect and run until Ctrl-C
    pub async fn run_until_stopped(self) -> Result<()> {
        self.connect_all()?;
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown signal received");
        self.shutdown().await;
        Ok(())
    }
}

fn log_traffic(manager: &ConnectionManager) {
    let channel = manager.channel().to_string();
    manager.on_message(move |message: &InboundMessage| {
        tracing::info!(channel = %channel, kind = message.kind(), "Inbound message");
    });

    let channel = manager.channel().to_string();
    manager.on_event(move |event| match event {
        ConnectionEvent::StateChanged { from, to } => {
            tracing::info!(channel = %channel, from = %from, to = %to, "Channel state changed");
        }
        ConnectionEvent::Reconnecting { attempt, delay } => {
            tracing::info!(
                channel = %channel,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Channel reconnecting"
            );
        }
        ConnectionEvent::Error { error, fatal } => {
            tracing::warn!(channel = %channel, error = %error, fatal, "Channel error");
        }
    });
}
