//! # Chat Realtime
//!
//! Command-line client that keeps the realtime channels of a chat backend
//! open and logs their traffic.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - The auth token from `AUTH_TOKEN`
//! - One connection manager per channel

use anyhow::{Context, Result};
use tracing::info;

use chat_realtime::config::Settings;
use chat_realtime::infrastructure::auth::TokenStore;
use chat_realtime::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    chat_realtime::telemetry::init_tracing();

    info!("Starting Chat Realtime client...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        ws_base_url = %settings.server.ws_base_url,
        http_base_url = %settings.server.http_base_url,
        environment = %settings.environment,
        "Configuration loaded"
    );

    let token = std::env::var("AUTH_TOKEN").context("AUTH_TOKEN must be set")?;
    let tokens = TokenStore::with_token(token);
    if let Some(expires_at) = tokens.expires_at() {
        info!(%expires_at, "Auth token loaded");
    }

    // Build and run the application
    let application = Application::build(settings, tokens)?;

    info!("Channels starting");
    application.run_until_stopped().await?;

    Ok(())
}
