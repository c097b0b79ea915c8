//! Request DTOs
//!
//! Typed outbound requests for the channel facades. Each serializes to a
//! `type`-tagged envelope and is validated before it reaches the socket.

use serde::Serialize;
use serde_json::Value;
use validator::Validate;

use super::envelope::OutboundMessage;
use crate::shared::error::ClientResult;
use crate::shared::validation::validation_error;

/// Longest chat message the client will send
pub const MAX_MESSAGE_LENGTH: u64 = 4000;

/// Chat message request
#[derive(Debug, Clone, Serialize, Validate)]
pub struct ChatMessageRequest {
    #[serde(rename = "type")]
    kind: &'static str,

    pub conversation_id: Value,

    #[validate(length(min = 1, max = 4000, message = "Message must be 1-4000 characters"))]
    pub content: String,
}

impl ChatMessageRequest {
    /// Surrounding whitespace is trimmed, so a blank message fails validation.
    pub fn new(conversation_id: impl Into<Value>, content: &str) -> Self {
        Self {
            kind: "chat_message",
            conversation_id: conversation_id.into(),
            content: content.trim().to_string(),
        }
    }
}

/// Typing indicator request
#[derive(Debug, Clone, Serialize, Validate)]
pub struct TypingRequest {
    #[serde(rename = "type")]
    kind: &'static str,

    pub conversation_id: Value,
    pub is_typing: bool,
}

impl TypingRequest {
    pub fn new(conversation_id: impl Into<Value>, is_typing: bool) -> Self {
        Self {
            kind: "typing",
            conversation_id: conversation_id.into(),
            is_typing,
        }
    }
}

/// Conversation read receipt
#[derive(Debug, Clone, Serialize, Validate)]
pub struct MarkReadRequest {
    #[serde(rename = "type")]
    kind: &'static str,

    pub conversation_id: Value,
}

impl MarkReadRequest {
    pub fn new(conversation_id: impl Into<Value>) -> Self {
        Self {
            kind: "mark_read",
            conversation_id: conversation_id.into(),
        }
    }
}

/// Single notification read request
#[derive(Debug, Clone, Serialize, Validate)]
pub struct NotificationReadRequest {
    #[serde(rename = "type")]
    kind: &'static str,

    pub notification_id: Value,
}

impl NotificationReadRequest {
    pub fn new(notification_id: impl Into<Value>) -> Self {
        Self {
            kind: "mark_read",
            notification_id: notification_id.into(),
        }
    }
}

/// Mark every notification read
#[derive(Debug, Clone, Serialize, Validate)]
pub struct MarkAllReadRequest {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl Default for MarkAllReadRequest {
    fn default() -> Self {
        Self {
            kind: "mark_all_read",
        }
    }
}

/// Validate a request and convert it into an envelope.
pub fn to_outbound<T: Serialize + Validate>(request: &T) -> ClientResult<OutboundMessage> {
    request.validate().map_err(validation_error)?;
    OutboundMessage::from_serialize(request)
}
