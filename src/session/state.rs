//! Session lifecycle state, host-facing events and counters.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::protocol::JointUpdates;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No socket
    #[default]
    Disconnected,
    /// Socket being opened
    Connecting,
    /// Connected, waiting for the first inbound message
    AwaitingHandshake,
    /// Channel negotiated, streaming
    Active,
}

impl SessionState {
    /// Get state name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHandshake => "awaiting_handshake",
            Self::Active => "active",
        }
    }

    /// Whether a socket is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::AwaitingHandshake | Self::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Something the host should react to, drained after ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Handshake finished on this channel
    Activated {
        /// Negotiated pump name
        pump: String,
    },
    /// Remote sent joint transforms (`set` or legacy `move`)
    PoseReceived {
        /// Joint updates carried by the command
        joints: JointUpdates,
    },
    /// Remote asked for the skeleton description
    SkeletonRequested {
        /// Raw request body, for any reply routing fields
        request: Value,
    },
    /// Connection closed, locally or by the peer
    Disconnected,
}

/// Session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Successful connects
    pub connects: u64,
    /// Connections closed
    pub disconnects: u64,
    /// Frames received
    pub frames_received: u64,
    /// Frames fully written to the socket
    pub frames_sent: u64,
    /// Bytes read from the socket
    pub bytes_received: u64,
    /// Bytes written to the socket
    pub bytes_sent: u64,
    /// Pose updates sent
    pub updates_sent: u64,
    /// Samples suppressed by the differ
    pub updates_suppressed: u64,
}
