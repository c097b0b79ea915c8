//! Channel Facades
//!
//! Typed wrappers over a `ConnectionManager` for the realtime channels the
//! backend exposes.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::dto::{
    to_outbound, ChatMessageRequest, InboundMessage, MarkAllReadRequest, MarkReadRequest,
    NotificationReadRequest, TypingRequest,
};
use crate::application::services::{
    ConnectionManager, ManagerConfig, MessageDispatcher, UnreadTracker,
};
use crate::config::{ChannelSettings, Settings};
use crate::shared::error::{ClientError, ClientResult};

/// Known realtime channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Chat,
    Notifications,
    Assistant,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [Self::Chat, Self::Notifications, Self::Assistant];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Notifications => "notifications",
            Self::Assistant => "assistant",
        }
    }

    /// Configured path segment under `/ws/`
    pub fn path<'a>(&self, channels: &'a ChannelSettings) -> &'a str {
        match self {
            Self::Chat => &channels.chat,
            Self::Notifications => &channels.notifications,
            Self::Assistant => &channels.assistant,
        }
    }

    pub fn manager_config(&self, settings: &Settings) -> ManagerConfig {
        ManagerConfig::from_settings(settings, self.path(&settings.channels))
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "notifications" | "notification" => Ok(Self::Notifications),
            "assistant" | "ai" => Ok(Self::Assistant),
            other => Err(ClientError::Config(format!("unknown channel `{}`", other))),
        }
    }
}

/// Chat channel with unread bookkeeping
pub struct ChatChannel {
    manager: Arc<ConnectionManager>,
    unread: UnreadTracker,
    dispatcher: MessageDispatcher,
}

impl ChatChannel {
    pub fn new(manager: Arc<ConnectionManager>, unread: UnreadTracker) -> Self {
        let dispatcher = MessageDispatcher::new();
        unread.attach(&manager);
        dispatcher.attach(&manager);
        Self {
            manager,
            unread,
            dispatcher,
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn unread(&self) -> &UnreadTracker {
        &self.unread
    }

    /// Route one message type to a handler.
    pub fn on<F>(&self, kind: &str, handler: F) -> &Self
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.dispatcher.on(kind, handler);
        self
    }

    pub fn send_chat_message(
        &self,
        conversation_id: impl Into<Value>,
        content: &str,
    ) -> ClientResult<()> {
        let message = to_outbound(&ChatMessageRequest::new(conversation_id, content))?;
        self.manager.send(&message)
    }

    pub fn mark_read(&self, conversation_id: impl Into<Value>) -> ClientResult<()> {
        self.manager
            .send(&to_outbound(&MarkReadRequest::new(conversation_id))?)
    }

    pub fn send_typing(&self, conversation_id: impl Into<Value>, is_typing: bool) -> ClientResult<()> {
        self.manager
            .send(&to_outbound(&TypingRequest::new(conversation_id, is_typing))?)
    }
}

/// Notification channel
pub struct NotificationChannel {
    manager: Arc<ConnectionManager>,
    dispatcher: MessageDispatcher,
}

impl NotificationChannel {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        let dispatcher = MessageDispatcher::new();
        dispatcher.attach(&manager);
        Self {
            manager,
            dispatcher,
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn on<F>(&self, kind: &str, handler: F) -> &Self
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.dispatcher.on(kind, handler);
        self
    }

    pub fn mark_notification_read(&self, notification_id: impl Into<Value>) -> ClientResult<()> {
        self.manager
            .send(&to_outbound(&NotificationReadRequest::new(notification_id))?)
    }

    pub fn mark_all_read(&self) -> ClientResult<()> {
        self.manager
            .send(&to_outbound(&MarkAllReadRequest::default())?)
    }
}
