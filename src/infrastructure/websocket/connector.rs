//! WebSocket Connector
//!
//! `Connector` implementation over `tokio-tungstenite`.
//!
//! Each successful handshake spawns two pump tasks:
//! - a writer that drains the manager's frame channel into the socket sink
//! - a reader that turns socket messages into `TransportEvent`s
//!
//! Dropping the manager's side of either channel ends the matching pump;
//! the socket closes once both halves are gone.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::connect_async;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::domain::{
    Connector, Frame, Socket, TransportEvent, CLOSE_ABNORMAL, CLOSE_NO_STATUS,
};
use crate::shared::error::ClientError;

/// Upper bound on flushing the close frame to a peer that stopped reading
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connector for real WebSocket servers.
///
/// The connect timeout itself belongs to the connection manager; `handshake_timeout`
/// only bounds a single handshake so a wedged TCP connect does not leak tasks
/// after the manager has moved on.
#[derive(Debug, Clone)]
pub struct WsConnector {
    handshake_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl WsConnector {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    /// Performs the handshake and starts the pumps.
    ///
    /// # Returns
    /// * `Ok(Socket)` - Once the handshake completes
    /// * `Err(ClientError::AuthRejected)` - HTTP 401 during the handshake
    /// * `Err(ClientError::AccessDenied)` - HTTP 403 during the handshake
    /// * `Err(ClientError::Transport)` - Any other failure
    #[instrument(skip(self, url), fields(host = url.host_str().unwrap_or_default(), path = url.path()))]
    async fn connect(&self, url: Url) -> Result<Socket, ClientError> {
        let handshake = connect_async(url.as_str());
        let (stream, response) = match tokio::time::timeout(self.handshake_timeout, handshake).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => return Err(handshake_error(e)),
            Err(_) => {
                return Err(ClientError::Transport(format!(
                    "handshake timed out after {}ms",
                    self.handshake_timeout.as_millis()
                )))
            }
        };
        debug!(status = %response.status(), "WebSocket handshake complete");

        let (mut sink, mut source) = stream.split();
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<Frame>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<TransportEvent>();

        // Writer pump
        let writer_events = events_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = frames_rx.recv().await {
                let (message, closing) = match frame {
                    Frame::Text(text) => (Message::text(text), false),
                    Frame::Close { code, reason } => (
                        Message::Close(Some(CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        })),
                        true,
                    ),
                };
                if let Err(e) = sink.send(message).await {
                    warn!(error = %e, "WebSocket write failed");
                    let _ = writer_events.send(TransportEvent::Error(e.to_string()));
                    return;
                }
                if closing {
                    break;
                }
            }
            if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
                debug!("WebSocket close did not flush; dropping sink");
            }
            debug!("WebSocket writer finished");
        });

        // Reader pump
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    next = source.next() => next,
                    _ = events_tx.closed() => {
                        debug!("Socket released by manager");
                        break;
                    }
                };
                let event = match next {
                    Some(Ok(Message::Text(text))) => TransportEvent::Text(text.as_str().to_owned()),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => TransportEvent::Text(text),
                        Err(_) => {
                            debug!(bytes = data.len(), "Ignoring non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => close_event(frame),
                    // Control frames are answered by tungstenite itself
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                        TransportEvent::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: "connection lost".into(),
                        }
                    }
                    Some(Err(e)) => TransportEvent::Error(e.to_string()),
                };

                let terminal = !matches!(event, TransportEvent::Text(_));
                if events_tx.send(event).is_err() || terminal {
                    break;
                }
            }
            debug!("WebSocket reader finished");
        });

        Ok(Socket::new(frames_tx, events_rx))
    }
}

/// Map a handshake failure to a client error.
fn handshake_error(error: WsError) -> ClientError {
    match error {
        WsError::Http(response) => status_error(response.status().as_u16()),
        WsError::Url(e) => ClientError::InvalidUrl(e.to_string()),
        other => ClientError::Transport(other.to_string()),
    }
}

/// 401 and 403 are terminal; anything else is worth retrying.
pub(crate) fn status_error(status: u16) -> ClientError {
    match status {
        401 => ClientError::AuthRejected("handshake rejected with HTTP 401".into()),
        403 => ClientError::AccessDenied("handshake rejected with HTTP 403".into()),
        status => ClientError::Transport(format!("handshake failed with HTTP {}", status)),
    }
}

fn close_event(frame: Option<CloseFrame>) -> TransportEvent {
    match frame {
        Some(frame) => TransportEvent::Closed {
            code: u16::from(frame.code),
            reason: frame.reason.as_str().to_owned(),
        },
        None => TransportEvent::Closed {
            code: CLOSE_NO_STATUS,
            reason: String::new(),
        },
    }
}
