//! HTTP Clients
//!
//! `reqwest`-backed REST collaborators.

mod snapshot_client;

pub use snapshot_client::HttpSnapshotClient;
