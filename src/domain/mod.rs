//! # Domain Layer
//!
//! Connection lifecycle types for one realtime channel. Nothing here talks
//! to the network; sockets and tokens arrive through the collaborator
//! traits declared alongside the entities.
//!
//! ## Structure
//!
//! - **entities**: ConnectionState, Credentials, Socket and collaborator traits
//! - **value_objects**: RetryPolicy, HeartbeatState

pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::*;
pub use value_objects::*;
