//! Transport seam between the connection logic and the wire.
//!
//! The connection owns reconnect/replay/health semantics; a transport
//! only produces one live session at a time. Production uses
//! [`WsTransport`]; tests inject the scripted mock from
//! [`crate::hub::mock`].

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::WsError;

/// Channel capacity for one session's frame queues.
const SESSION_QUEUE: usize = 256;

/// One live session: text frames in both directions.
///
/// The session is over when `inbound` yields `None`; dropping the session
/// tears the underlying socket down.
pub struct TransportSession {
    /// Frames to the hub.
    pub outbound: mpsc::Sender<String>,
    /// Frames from the hub.
    pub inbound: mpsc::Receiver<String>,
}

/// Produces live hub sessions.
pub trait HubTransport: Send + Sync {
    /// Establish one session. Failures are returned, never retried here;
    /// retrying is the connection's job.
    fn connect(&self) -> BoxFuture<'_, Result<TransportSession, WsError>>;
}

/// WebSocket transport over `tokio-tungstenite`.
pub struct WsTransport {
    url: Url,
}

impl WsTransport {
    /// Create a transport for the given hub URL.
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Parse and create from a string URL.
    pub fn from_str(url: &str) -> Result<Self, WsError> {
        let url = Url::parse(url).map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(url))
    }
}

impl HubTransport for WsTransport {
    fn connect(&self) -> BoxFuture<'_, Result<TransportSession, WsError>> {
        Box::pin(async move {
            info!(url = %self.url, "Connecting to hub");

            let (ws_stream, _) = connect_async(self.url.as_str())
                .await
                .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

            let (mut write, mut read) = ws_stream.split();
            let (out_tx, mut out_rx) = mpsc::channel::<String>(SESSION_QUEUE);
            let (in_tx, in_rx) = mpsc::channel::<String>(SESSION_QUEUE);

            // One pump owns both socket halves; it ends when either side
            // closes, which drops `in_tx` and signals the session's end.
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        frame = out_rx.recv() => match frame {
                            Some(text) => {
                                if let Err(e) = write.send(Message::Text(text)).await {
                                    error!(error = %e, "WebSocket send failed");
                                    break;
                                }
                            }
                            // Session dropped by the connection.
                            None => {
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                        },
                        frame = read.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                if in_tx.send(text).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Ping(_))) => {
                                // tungstenite auto-responds to pings
                                debug!("Received transport ping");
                            }
                            Some(Ok(Message::Close(frame))) => {
                                warn!(frame = ?frame, "WebSocket closed by hub");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!(error = %e, "WebSocket error");
                                break;
                            }
                            None => break,
                        },
                    }
                }
            });

            Ok(TransportSession {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_urls() {
        assert!(WsTransport::from_str("not a url").is_err());
        assert!(WsTransport::from_str("wss://hub.example.com/md").is_ok());
    }
}
