//! Wire Envelopes
//!
//! Every frame on a channel is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::shared::error::ClientError;

pub const TYPE_PING: &str = "ping";
pub const TYPE_PONG: &str = "pong";
pub const TYPE_ERROR: &str = "error";
pub const TYPE_CONNECTION_ESTABLISHED: &str = "connection_established";

/// Inbound message
///
/// Control tags are decoded; everything else is kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Ping { timestamp: Option<i64> },
    Pong { timestamp: Option<i64> },
    Error { message: String },
    ConnectionEstablished { payload: Value },
    Event { kind: String, payload: Value },
}

impl InboundMessage {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, ClientError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ClientError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Serialization("message has no string `type` tag".into()))?
            .to_string();

        let message = match kind.as_str() {
            TYPE_PING => Self::Ping {
                timestamp: value.get("timestamp").and_then(Value::as_i64),
            },
            TYPE_PONG => Self::Pong {
                timestamp: value.get("timestamp").and_then(Value::as_i64),
            },
            TYPE_ERROR => Self::Error {
                message: value
                    .get("message")
                    .or_else(|| value.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown server error")
                    .to_string(),
            },
            TYPE_CONNECTION_ESTABLISHED => Self::ConnectionEstablished { payload: value },
            _ => Self::Event {
                kind,
                payload: value,
            },
        };
        Ok(message)
    }

    /// The `type` tag
    pub fn kind(&self) -> &str {
        match self {
            Self::Ping { .. } => TYPE_PING,
            Self::Pong { .. } => TYPE_PONG,
            Self::Error { .. } => TYPE_ERROR,
            Self::ConnectionEstablished { .. } => TYPE_CONNECTION_ESTABLISHED,
            Self::Event { kind, .. } => kind,
        }
    }

    /// Full JSON object for forwarded messages
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::ConnectionEstablished { payload } | Self::Event { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Convenience accessor for a string field of the payload
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.payload()?.get(field)?.as_str()
    }

    /// Convenience accessor for an id-like field that may be a number or string
    pub fn id_field(&self, field: &str) -> Option<String> {
        match self.payload()?.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Read an unread total from `unread_count`, `count` or `total_unread`.
///
/// Shared by server pushes and the REST snapshot body.
pub fn extract_unread_count(payload: &Value) -> Option<u64> {
    ["unread_count", "count", "total_unread"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_u64))
}

/// Outbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OutboundMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Add a field; `type` is reserved and ignored.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "type" {
            self.fields.insert(key, value.into());
        }
        self
    }

    pub fn ping(timestamp_ms: i64) -> Self {
        Self::new(TYPE_PING).with("timestamp", timestamp_ms)
    }

    pub fn pong(timestamp_ms: i64) -> Self {
        Self::new(TYPE_PONG).with("timestamp", timestamp_ms)
    }

    pub fn chat_message(conversation_id: impl Into<Value>, content: impl Into<String>) -> Self {
        Self::new("chat_message")
            .with("content", content.into())
            .with("conversation_id", conversation_id)
    }

    /// Build from any serializable object carrying its own `type` tag.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, ClientError> {
        let value = serde_json::to_value(value)?;
        match value {
            Value::Object(mut fields) => {
                let kind = match fields.remove("type") {
                    Some(Value::String(kind)) => kind,
                    _ => {
                        return Err(ClientError::Serialization(
                            "outbound message needs a string `type` tag".into(),
                        ))
                    }
                };
                Ok(Self { kind, fields })
            }
            _ => Err(ClientError::Serialization(
                "outbound message must be a JSON object".into(),
            )),
        }
    }

    pub fn to_json(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string(self)?)
    }
}
