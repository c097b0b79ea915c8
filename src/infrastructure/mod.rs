//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - WebSocket transport (tokio-tungstenite)
//! - REST snapshot client (reqwest)
//! - Token storage
//! - Prometheus metrics

pub mod auth;
pub mod http;
pub mod metrics;
pub mod websocket;
