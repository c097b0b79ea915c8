//! Token Store
//!
//! In-process `AuthProvider` backed by a `watch` channel. Whoever owns the
//! login flow calls `set_token` / `clear`; every manager subscribed to the
//! store follows along.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::domain::{decode_expiry, AuthProvider};

#[derive(Debug, Clone)]
pub struct TokenStore {
    sender: Arc<watch::Sender<Option<String>>>,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TokenStore {
    pub fn new(token: Option<String>) -> Self {
        let (sender, _) = watch::channel(token);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self::new(Some(token.into()))
    }

    /// Replace the token; subscribers are notified even if it is unchanged.
    pub fn set_token(&self, token: impl Into<String>) {
        self.sender.send_replace(Some(token.into()));
        tracing::debug!("Auth token replaced");
    }

    /// Log out.
    pub fn clear(&self) {
        if self.sender.send_replace(None).is_some() {
            tracing::info!("Auth token cleared");
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.sender
            .borrow()
            .as_deref()
            .and_then(|token| decode_expiry(token).ok())
    }
}

impl AuthProvider for TokenStore {
    fn current_token(&self) -> Option<String> {
        self.sender.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.sender.subscribe()
    }
}
