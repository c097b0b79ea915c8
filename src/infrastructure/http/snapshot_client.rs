//! Unread Snapshot Client
//!
//! REST source of truth for the unread count, used to correct the
//! incrementally tracked value whenever a chat channel is established.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::application::dto::extract_unread_count;
use crate::application::services::SnapshotSource;
use crate::config::Settings;
use crate::domain::AuthProvider;
use crate::shared::error::{ClientError, ClientResult};

/// `GET <http_base_url><snapshot_path>` with a bearer token
#[derive(Clone)]
pub struct HttpSnapshotClient {
    client: reqwest::Client,
    url: Url,
    auth: Arc<dyn AuthProvider>,
}

impl HttpSnapshotClient {
    /// Creates a client for one snapshot endpoint.
    ///
    /// # Arguments
    /// * `http_base_url` - REST base, optionally with a path prefix
    /// * `snapshot_path` - Endpoint path relative to the base
    /// * `timeout` - Per-request timeout
    /// * `auth` - Token source; read on every request
    pub fn new(
        http_base_url: &str,
        snapshot_path: &str,
        timeout: Duration,
        auth: Arc<dyn AuthProvider>,
    ) -> ClientResult<Self> {
        let url = snapshot_url(http_base_url, snapshot_path)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url, auth })
    }

    pub fn from_settings(settings: &Settings, auth: Arc<dyn AuthProvider>) -> ClientResult<Self> {
        Self::new(
            &settings.server.http_base_url,
            &settings.unread.snapshot_path,
            Duration::from_millis(settings.unread.request_timeout_ms),
            auth,
        )
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotClient {
    #[instrument(skip(self), fields(url = %self.url.path()))]
    async fn fetch_unread_count(&self) -> ClientResult<u64> {
        let token = self
            .auth
            .current_token()
            .ok_or(ClientError::MissingCredentials)?;

        let response = self
            .client
            .get(self.url.clone())
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => {
                return Err(ClientError::AuthRejected("unread snapshot returned 401".into()))
            }
            StatusCode::FORBIDDEN => {
                return Err(ClientError::AccessDenied("unread snapshot returned 403".into()))
            }
            status if !status.is_success() => {
                return Err(ClientError::Http(format!("unread snapshot returned {}", status)))
            }
            _ => {}
        }

        let body: Value = response.json().await?;
        let count = extract_unread_count(&body).ok_or_else(|| {
            ClientError::Serialization("unread snapshot body has no count field".into())
        })?;
        debug!(count, "Fetched unread snapshot");
        Ok(count)
    }
}

/// Join the endpoint path onto the base, keeping any base path prefix.
fn snapshot_url(http_base_url: &str, snapshot_path: &str) -> ClientResult<Url> {
    let mut base = Url::parse(http_base_url)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join(snapshot_path.trim_start_matches('/'))?)
}
