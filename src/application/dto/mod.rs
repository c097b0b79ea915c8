//! Data Transfer Objects
//!
//! Wire formats exchanged over realtime channels.

pub mod envelope;
pub mod request;

pub use envelope::{
    extract_unread_count, InboundMessage, OutboundMessage, TYPE_CONNECTION_ESTABLISHED,
    TYPE_ERROR, TYPE_PING, TYPE_PONG,
};
pub use request::{
    to_outbound, ChatMessageRequest, MarkAllReadRequest, MarkReadRequest,
    NotificationReadRequest, TypingRequest, MAX_MESSAGE_LENGTH,
};
