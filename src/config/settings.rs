//! Client settings and configuration structures.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

use crate::shared::error::{ClientError, ClientResult};
use crate::shared::validation::validation_message;

/// Root configuration structure containing all client settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    /// Backend endpoints (WebSocket and REST)
    #[validate(nested)]
    pub server: ServerSettings,

    /// Connect timeout and debounce window
    #[validate(nested)]
    pub connection: ConnectionSettings,

    /// Backoff policy
    #[validate(nested)]
    pub reconnect: ReconnectSettings,

    /// Ping/pong keepalive
    #[validate(nested)]
    pub heartbeat: HeartbeatSettings,

    /// Token-expiry coordination
    #[validate(nested)]
    pub auth: AuthSettings,

    /// Application close codes that must never be retried
    pub close_codes: CloseCodeSettings,

    /// Channel paths under `/ws/`
    #[validate(nested)]
    pub channels: ChannelSettings,

    /// Authoritative unread snapshot endpoint
    #[validate(nested)]
    pub unread: UnreadSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Backend endpoints.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerSettings {
    /// WebSocket base URL (e.g., "wss://api.example.com")
    #[validate(url(message = "ws_base_url must be a valid URL"))]
    pub ws_base_url: String,

    /// REST base URL used for authoritative snapshots
    #[validate(url(message = "http_base_url must be a valid URL"))]
    pub http_base_url: String,
}

/// Connection attempt settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConnectionSettings {
    /// Time allowed for a socket to reach Open, in milliseconds
    #[validate(range(min = 1, message = "connect_timeout_ms must be positive"))]
    pub connect_timeout_ms: u64,

    /// Minimum spacing between socket creations, in milliseconds
    pub debounce_ms: u64,
}

/// Reconnection backoff settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReconnectSettings {
    /// First retry delay in milliseconds
    #[validate(range(min = 1, message = "base_delay_ms must be positive"))]
    pub base_delay_ms: u64,

    /// Upper bound for the exponential delay in milliseconds
    #[validate(range(min = 1, message = "max_delay_ms must be positive"))]
    pub max_delay_ms: u64,

    /// Consecutive failures tolerated before giving up
    pub max_attempts: u32,
}

/// Heartbeat settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HeartbeatSettings {
    /// Ping interval in milliseconds (default: 30000)
    #[validate(range(min = 100, message = "ping_interval_ms must be at least 100"))]
    pub ping_interval_ms: u64,

    /// Consecutive unanswered pings before the socket is recycled (0 disables)
    pub max_missed_pongs: u32,
}

/// Token-expiry coordination settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AuthSettings {
    /// Expiry horizon that triggers proactive refresh scheduling, in seconds
    #[validate(range(min = 1, message = "refresh_threshold_secs must be positive"))]
    pub refresh_threshold_secs: u64,

    /// How long before expiry the reconnect cycle runs, in seconds
    pub refresh_lead_secs: u64,
}

/// Close codes with special meaning.
#[derive(Debug, Clone, Deserialize)]
pub struct CloseCodeSettings {
    /// Codes meaning the token was rejected
    pub auth_failure: Vec<u16>,

    /// Codes meaning the channel is forbidden
    pub access_denied: Vec<u16>,
}

/// Channel paths.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChannelSettings {
    #[validate(length(min = 1, message = "chat channel path must not be empty"))]
    pub chat: String,

    #[validate(length(min = 1, message = "notifications channel path must not be empty"))]
    pub notifications: String,

    #[validate(length(min = 1, message = "assistant channel path must not be empty"))]
    pub assistant: String,
}

/// Unread snapshot endpoint.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UnreadSettings {
    /// Path appended to `server.http_base_url`
    #[validate(length(min = 1, message = "snapshot_path must not be empty"))]
    pub snapshot_path: String,

    /// Request timeout in milliseconds
    #[validate(range(min = 1, message = "request_timeout_ms must be positive"))]
    pub request_timeout_ms: u64,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. Built-in defaults
    /// 2. config/default.toml (base configuration)
    /// 3. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 4. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if configuration cannot be loaded or
    /// parsed, or if a value fails validation.
    pub fn load() -> ClientResult<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        let config = Self::with_defaults(&environment)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__RECONNECT__MAX_ATTEMPTS=8 -> reconnect.max_attempts = 8
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("server.ws_base_url", std::env::var("WS_BASE_URL").ok())?
            .set_override_option("server.http_base_url", std::env::var("HTTP_BASE_URL").ok())?
            .build()?;

        Self::from_config(config)
    }

    /// Settings built from defaults only.
    pub fn defaults() -> ClientResult<Self> {
        Self::from_config(Self::with_defaults("development")?.build()?)
    }

    /// Deserialize and validate an already-layered configuration.
    pub fn from_config(config: Config) -> ClientResult<Self> {
        let settings: Self = config.try_deserialize()?;
        settings
            .validate()
            .map_err(|e| ClientError::Config(validation_message(&e)))?;
        settings.check_consistency()?;
        Ok(settings)
    }

    fn with_defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("environment", environment)?
            .set_default("server.ws_base_url", "ws://localhost:8000")?
            .set_default("server.http_base_url", "http://localhost:8000")?
            .set_default("connection.connect_timeout_ms", 10000_i64)?
            .set_default("connection.debounce_ms", 500_i64)?
            .set_default("reconnect.base_delay_ms", 1000_i64)?
            .set_default("reconnect.max_delay_ms", 30000_i64)?
            .set_default("reconnect.max_attempts", 5_i64)?
            .set_default("heartbeat.ping_interval_ms", 30000_i64)?
            .set_default("heartbeat.max_missed_pongs", 2_i64)?
            .set_default("auth.refresh_threshold_secs", 300_i64)?
            .set_default("auth.refresh_lead_secs", 60_i64)?
            .set_default("close_codes.auth_failure", vec![4001_i64])?
            .set_default("close_codes.access_denied", vec![4003_i64])?
            .set_default("channels.chat", "chat")?
            .set_default("channels.notifications", "notifications")?
            .set_default("channels.assistant", "assistant")?
            .set_default("unread.snapshot_path", "/api/chat/unread-count/")?
            .set_default("unread.request_timeout_ms", 10000_i64)
    }

    /// Cross-field rules the derive cannot express.
    fn check_consistency(&self) -> ClientResult<()> {
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(ClientError::Config(format!(
                "reconnect.base_delay_ms ({}) must not exceed reconnect.max_delay_ms ({})",
                self.reconnect.base_delay_ms, self.reconnect.max_delay_ms
            )));
        }
        if self.auth.refresh_lead_secs >= self.auth.refresh_threshold_secs {
            return Err(ClientError::Config(format!(
                "auth.refresh_lead_secs ({}) must be below auth.refresh_threshold_secs ({})",
                self.auth.refresh_lead_secs, self.auth.refresh_threshold_secs
            )));
        }
        Ok(())
    }
}
