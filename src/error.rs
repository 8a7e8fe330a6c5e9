//! Puppetry stream error types.
//!
//! # Error Classification
//!
//! Errors fall into three scopes:
//!
//! - **Connection-local**: `Framing`, `TruncatedStream`, `PeerClosed` and most
//!   `Io` errors close the affected connection and nothing else.
//! - **Global**: `Upstream` is only raised by the relay when its single
//!   upstream source fails, and shuts the whole relay down.
//! - **Not an error**: an `Io` error of kind `WouldBlock` means "no bytes yet";
//!   callers check [`PuppetryError::is_would_block`] and retry on the next tick.

use std::io;

use thiserror::Error;

/// Puppetry stream errors.
#[derive(Error, Debug)]
pub enum PuppetryError {
    /// Malformed length prefix (non-numeric, empty, or out of range).
    #[error("Framing error: {0}")]
    Framing(String),

    /// Stream ended in the middle of a frame.
    #[error("Stream truncated mid-frame ({buffered} bytes buffered)")]
    TruncatedStream {
        /// Bytes of the incomplete frame that had been received.
        buffered: usize,
    },

    /// Peer closed the stream cleanly between frames.
    #[error("Peer closed connection")]
    PeerClosed,

    /// Relay upstream failed; fatal to the whole relay.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Payload could not be encoded or decoded by the selected notation.
    #[error("Notation error: {0}")]
    Notation(String),

    /// Well-formed payload that violates the message envelope convention.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation requires a connected session.
    #[error("Session not connected")]
    NotConnected,

    /// Session was closed and accepts no further operations.
    #[error("Session closed")]
    SessionClosed,

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PuppetryError {
    /// True when the error only means "no data available right now".
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::WouldBlock)
    }

    /// True for a clean peer close, which is not logged as a failure.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, Self::PeerClosed)
    }

    /// True when the affected connection must be torn down.
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            Self::Framing(_)
            | Self::TruncatedStream { .. }
            | Self::PeerClosed
            | Self::Upstream(_)
            | Self::NotConnected
            | Self::SessionClosed => true,
            Self::Io(e) => !matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

/// Result type alias for puppetry operations
pub type Result<T> = std::result::Result<T, PuppetryError>;

impl From<toml::de::Error> for PuppetryError {
    fn from(err: toml::de::Error) -> Self {
        PuppetryError::Config(err.to_string())
    }
}
