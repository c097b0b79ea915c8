//! Connection state and close-code classification.

use serde::{Deserialize, Serialize};

/// Normal closure; never retried.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (server restart, page navigation).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close frame carried no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Server hit an internal error.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// Application code used when the client gives up on a silent socket.
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4000;
/// Default application code for a rejected token.
pub const CLOSE_AUTH_FAILED: u16 = 4001;
/// Default application code for a forbidden channel.
pub const CLOSE_ACCESS_DENIED: u16 = 4003;

/// Lifecycle state of one logical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// `Connecting` or `Open`: a new `connect()` is a no-op.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub const ALL: [ConnectionState; 5] = [
        Self::Idle,
        Self::Connecting,
        Self::Open,
        Self::Closing,
        Self::Closed,
    ];
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Host environment changes that affect whether a channel should be up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentSignal {
    /// App moved to the background
    Hidden,
    /// App is in the foreground again
    Visible,
    /// Network came back
    Online,
    /// Network lost
    Offline,
}

/// What a close code means for the reconnect state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Orderly close, stay closed.
    Normal,
    /// Transient failure, feed the retry policy.
    Retry,
    /// Token rejected; retrying with the same token cannot succeed.
    AuthFailed,
    /// Channel forbidden for this user.
    AccessDenied,
}

impl CloseDisposition {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AuthFailed | Self::AccessDenied)
    }
}

/// Maps close codes to dispositions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosePolicy {
    pub auth_failure_codes: Vec<u16>,
    pub access_denied_codes: Vec<u16>,
}

impl Default for ClosePolicy {
    fn default() -> Self {
        Self {
            auth_failure_codes: vec![CLOSE_AUTH_FAILED],
            access_denied_codes: vec![CLOSE_ACCESS_DENIED],
        }
    }
}

impl ClosePolicy {
    pub fn classify(&self, code: u16) -> CloseDisposition {
        if code == CLOSE_NORMAL {
            CloseDisposition::Normal
        } else if self.auth_failure_codes.contains(&code) {
            CloseDisposition::AuthFailed
        } else if self.access_denied_codes.contains(&code) {
            CloseDisposition::AccessDenied
        } else {
            // 1006, 1011 and anything unrecognised
            CloseDisposition::Retry
        }
    }
}
