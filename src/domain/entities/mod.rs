//! # Domain Entities
//!
//! Core objects owned by one realtime channel.
//!
//! - **ConnectionState**: lifecycle of a channel, plus close-code classification
//! - **Credentials**: bearer token with its decoded expiry
//! - **Socket**: transport-agnostic frame/event channel pair
//!
//! ## Collaborator Traits
//!
//! `Connector` and `AuthProvider` define what the manager consumes; the
//! infrastructure layer implements them.

mod connection;
mod credentials;
mod socket;

pub use connection::{
    CloseDisposition, ClosePolicy, ConnectionState, EnvironmentSignal, CLOSE_ABNORMAL, CLOSE_ACCESS_DENIED,
    CLOSE_AUTH_FAILED, CLOSE_GOING_AWAY, CLOSE_HEARTBEAT_TIMEOUT, CLOSE_INTERNAL_ERROR,
    CLOSE_NORMAL, CLOSE_NO_STATUS,
};
pub use credentials::{decode_expiry, AuthProvider, Credentials};
pub use socket::{Connector, Frame, Socket, TransportEvent};
