//! Bearer credentials and token expiry.
//!
//! The client never holds the signing key, so the token is treated as
//! opaque except for the `exp` claim in its payload segment.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::shared::error::ClientError;

/// A bearer token plus its decoded expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Wrap a token, deriving expiry when the payload is decodable.
    pub fn from_token(token: impl Into<String>) -> Self {
        let token = token.into();
        let expires_at = match decode_expiry(&token) {
            Ok(exp) => Some(exp),
            Err(e) => {
                tracing::debug!(error = %e, "Token expiry unavailable");
                None
            }
        };
        Self { token, expires_at }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Remaining lifetime; negative once expired.
    pub fn time_to_expiry(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.expires_at.map(|exp| exp - now)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of the current bearer token.
///
/// The manager reads the token on every connection attempt and follows
/// changes through the watch receiver. `None` means logged out.
pub trait AuthProvider: Send + Sync {
    fn current_token(&self) -> Option<String>;

    fn subscribe(&self) -> watch::Receiver<Option<String>>;
}

/// Decode the `exp` claim from a JWT-shaped token without verifying it.
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>, ClientError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_), Some(payload)) if !payload.is_empty() => payload,
        _ => return Err(ClientError::InvalidToken("missing payload segment".into())),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ClientError::InvalidToken(format!("payload is not base64url: {}", e)))?;

    let claims: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| ClientError::InvalidToken(format!("payload is not JSON: {}", e)))?;

    let exp = claims
        .get("exp")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .ok_or_else(|| ClientError::InvalidToken("no exp claim".into()))?;

    DateTime::from_timestamp(exp, 0)
        .ok_or_else(|| ClientError::InvalidToken(format!("exp out of range: {}", exp)))
}
