//! # Chat Realtime Library
//!
//! This crate provides resilient realtime channels for a chat backend:
//! - One WebSocket per logical channel (chat, notifications, assistant)
//! - Exponential-backoff reconnection with a bounded retry budget
//! - Ping/pong heartbeat with missed-pong detection
//! - Proactive reconnection ahead of bearer-token expiry
//! - De-duplicated unread counts corrected by a REST snapshot
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Connection state, credentials, retry and heartbeat
//!   value objects, collaborator traits
//! - **Application Layer**: The connection manager, its subscribers and DTOs
//! - **Infrastructure Layer**: WebSocket transport, HTTP snapshot client,
//!   token store, metrics
//! - **Presentation Layer**: Channel facades and environment signals
//!
//! ## Module Structure
//!
//! ```text
//! chat_realtime/
//! +-- config/         Configuration management
//! +-- domain/         Entities, value objects, and collaborator traits
//! +-- application/    Connection manager, subscribers, and DTOs
//! +-- infrastructure/ Transport, REST client, token store, metrics
//! +-- presentation/   Channel facades and environment monitor
//! +-- shared/         Common utilities (errors, validation)
//! ```

// Configuration module
pub mod config;

// Domain layer - Connection lifecycle types
pub mod domain;

// Application layer - Connection manager and subscribers
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - Channel facades
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup
pub mod startup;

// Telemetry and observability
pub mod telemetry;
