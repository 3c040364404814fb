//! Scripted in-process hub for unit and integration testing.
//!
//! Each `connect` hands the test a [`MockRemote`]: the remote end of the
//! session. The test feeds frames to the client through `to_client` and
//! observes everything the client sent through `from_client`; dropping
//! `to_client` simulates the hub closing the connection.

use std::sync::atomic::{AtomicU32, Ordering};

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use super::transport::{HubTransport, TransportSession};
use crate::error::WsError;

const MOCK_QUEUE: usize = 64;

/// The hub's end of one mock session.
pub struct MockRemote {
    /// Frames delivered to the client. Drop to close the session.
    pub to_client: mpsc::Sender<String>,
    /// Frames the client sent.
    pub from_client: mpsc::Receiver<String>,
}

/// Transport producing scripted sessions.
pub struct MockTransport {
    sessions: mpsc::UnboundedSender<MockRemote>,
    fail_connects: AtomicU32,
    connect_count: AtomicU32,
}

impl MockTransport {
    /// Create a transport and the stream of remote ends it will produce,
    /// one per successful connect.
    pub fn new() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<MockRemote>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            std::sync::Arc::new(Self {
                sessions: tx,
                fail_connects: AtomicU32::new(0),
                connect_count: AtomicU32::new(0),
            }),
            rx,
        )
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.fail_connects.store(count, Ordering::SeqCst);
    }

    /// Total connect attempts observed (including failed ones).
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }
}

impl HubTransport for MockTransport {
    fn connect(&self) -> BoxFuture<'_, Result<TransportSession, WsError>> {
        Box::pin(async move {
            self.connect_count.fetch_add(1, Ordering::SeqCst);

            let failing = self
                .fail_connects
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(WsError::ConnectionFailed("scripted failure".to_string()));
            }

            let (in_tx, in_rx) = mpsc::channel(MOCK_QUEUE);
            let (out_tx, out_rx) = mpsc::channel(MOCK_QUEUE);

            self.sessions
                .send(MockRemote {
                    to_client: in_tx,
                    from_client: out_rx,
                })
                .map_err(|_| WsError::ConnectionFailed("mock harness dropped".to_string()))?;

            Ok(TransportSession {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}
