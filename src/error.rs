//! Unified error types for the synchronization layer.

use thiserror::Error;

use crate::feed::reassembler::HalfKind;
use crate::keys::BookKey;

/// Unified error type for the synchronization layer.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Feed processing error.
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while decoding and reassembling feed messages.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Two halves of the same kind arrived for one key. The protocol
    /// publishes exactly one top half and one depth half per update, so
    /// this is a logic error that must never be merged silently.
    #[error("pairing violation on {key}: duplicate {kind} half")]
    PairingViolation {
        /// Key the halves arrived on.
        key: BookKey,
        /// The duplicated half kind.
        kind: HalfKind,
    },

    /// A payload field could not be decoded.
    #[error("failed to decode feed payload: {0}")]
    Decode(String),

    /// Entry carried an out-of-range timestamp.
    #[error("entry timestamp out of range: {0}")]
    BadTimestamp(i64),
}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("websocket connection closed: code={code:?}, reason={reason}")]
    ConnectionClosed {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, SyncError>;
