//! # Domain Value Objects
//!
//! Small state holders owned by the connection manager.
//!
//! - **RetryPolicy**: attempt counter and backoff formula
//! - **HeartbeatState**: last pong, outstanding ping, missed count

mod heartbeat;
mod retry_policy;

pub use heartbeat::*;
pub use retry_policy::*;
