//! Presentation Layer
//!
//! Channel facades and environment triggers: the surface UI glue and the
//! binary talk to.

pub mod channels;
pub mod environment;

pub use channels::{ChannelKind, ChatChannel, NotificationChannel};
pub use environment::{EnvironmentMonitor, EnvironmentSignal};
