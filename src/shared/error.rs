//! Client Error Types
//!
//! Centralized error handling for realtime channels.

use std::time::Duration;

use crate::domain::ConnectionState;

/// Realtime client error type
///
/// Cloneable so the same error can be handed to every event subscriber.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("Not connected (state: {state})")]
    NotConnected { state: ConnectionState },

    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Reconnection abandoned after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Connection timed out after {}ms", .0.as_millis())]
    ConnectTimeout(Duration),

    #[error("Heartbeat timeout: {missed} pongs missed")]
    HeartbeatTimeout { missed: u32 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid message: {0}")]
    Validation(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection manager has shut down")]
    ManagerClosed,
}

impl ClientError {
    /// Whether retrying can never succeed without user action.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::MissingCredentials
                | ClientError::AuthRejected(_)
                | ClientError::AccessDenied(_)
                | ClientError::RetriesExhausted { .. }
                | ClientError::InvalidUrl(_)
                | ClientError::Config(_)
                | ClientError::ManagerClosed
        )
    }

    /// Short machine-readable label, used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::NotConnected { .. } => "not_connected",
            ClientError::MissingCredentials => "missing_credentials",
            ClientError::AuthRejected(_) => "auth_rejected",
            ClientError::AccessDenied(_) => "access_denied",
            ClientError::RetriesExhausted { .. } => "retries_exhausted",
            ClientError::ConnectTimeout(_) => "connect_timeout",
            ClientError::HeartbeatTimeout { .. } => "heartbeat_timeout",
            ClientError::Transport(_) => "transport",
            ClientError::Server(_) => "server",
            ClientError::InvalidToken(_) => "invalid_token",
            ClientError::InvalidUrl(_) => "invalid_url",
            ClientError::Serialization(_) => "serialization",
            ClientError::Validation(_) => "validation",
            ClientError::Http(_) => "http",
            ClientError::Config(_) => "config",
            ClientError::ManagerClosed => "manager_closed",
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(e: url::ParseError) -> Self {
        ClientError::InvalidUrl(e.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(e.to_string())
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(e: config::ConfigError) -> Self {
        ClientError::Config(e.to_string())
    }
}

/// Result alias used across the crate
pub type ClientResult<T> = Result<T, ClientError>;
