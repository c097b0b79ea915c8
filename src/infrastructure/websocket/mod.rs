//! WebSocket Transport
//!
//! Real-network implementation of the `Connector` trait.
//!
//! # Architecture
//!
//! ```text
//! +---------------------+
//! |  ConnectionManager  |
//! +---------------------+
//!     | Frame      ^ TransportEvent
//!     v            |
//! +---------------------+
//! |  writer / reader    |  <-- pump tasks per socket
//! +---------------------+
//!          |
//!          v
//! +---------------------+
//! |  tokio-tungstenite  |
//! +---------------------+
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chat_realtime::infrastructure::websocket::WsConnector;
//!
//! let connector = Arc::new(WsConnector::default());
//! let manager = ConnectionManager::new(config, connector, tokens);
//! ```

mod connector;

pub use connector::WsConnector;
