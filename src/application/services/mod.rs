//! Application Services
//!
//! Channel lifecycle and the subscribers built on top of it.
//!
//! ## Available Services
//!
//! - **ConnectionManager**: one resilient socket per channel, with retry,
//!   heartbeat and token-expiry handling
//! - **Timers**: deadline table owned by a manager's event loop
//! - **MessageDispatcher**: routes inbound messages by `type` tag
//! - **UnreadTracker**: de-duplicated unread count with snapshot correction

pub mod connection_manager;
pub mod dispatcher;
pub mod timers;
pub mod unread_service;

// Re-export connection manager types
pub use connection_manager::{
    ConnectionEvent, ConnectionManager, EventHandler, ManagerConfig, ManagerStatus,
    MessageHandler, StateHandler,
};

// Re-export subscriber types
pub use dispatcher::MessageDispatcher;
pub use timers::{TimerKind, Timers};
pub use unread_service::{CountHandler, SnapshotSource, UnreadTracker, DEFAULT_DEDUP_WINDOW};
