//! Transport-agnostic socket handle.
//!
//! A connector hands the manager one `Socket`: a writer channel for frames
//! and a reader channel for transport events. Dropping the writer closes the
//! underlying connection.

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::shared::error::ClientError;

/// Outbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close { code: u16, reason: String },
}

/// Inbound transport event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    Closed { code: u16, reason: String },
    /// Read or write failure; the socket is unusable afterwards.
    Error(String),
}

/// One live connection
#[derive(Debug)]
pub struct Socket {
    pub outbound: mpsc::UnboundedSender<Frame>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Socket {
    pub fn new(
        outbound: mpsc::UnboundedSender<Frame>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }
}

/// Creates sockets for the connection manager.
///
/// Implemented by the WebSocket transport in the infrastructure layer and by
/// in-memory fakes in tests. Each call must produce a fresh, independent
/// socket; the manager guarantees at most one is alive at a time.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: Url) -> Result<Socket, ClientError>;
}
