//! # Configuration Module
//!
//! Realtime client settings, layered in this order (later wins):
//! - Built-in defaults
//! - `config/default.toml` and `config/{environment}.toml`, both optional
//! - Environment variables prefixed with `APP__`, after `.env` is loaded
//!   through dotenvy
//!
//! ```rust,ignore
//! use chat_realtime::config::Settings;
//!
//! let settings = Settings::load()?;
//! tracing::info!(url = %settings.server.ws_base_url, "Realtime backend");
//! ```

mod settings;

pub use settings::*;
