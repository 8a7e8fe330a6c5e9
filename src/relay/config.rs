//! Relay server configuration.

use std::net::{SocketAddr, ToSocketAddrs};

use serde::{Deserialize, Serialize};

use crate::error::{PuppetryError, Result};

/// Default relay port.
pub const DEFAULT_RELAY_PORT: u16 = 15555;

/// Default per-client write queue depth, in frames.
pub const DEFAULT_CLIENT_QUEUE: usize = 1024;

/// Relay server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Listen host
    pub host: String,
    /// Listen port (0 picks an ephemeral port)
    pub port: u16,
    /// Set SO_REUSEADDR on the listening socket
    pub reuse_address: bool,
    /// Frames a client may have queued before it is dropped
    pub client_queue: usize,
    /// Reject frames longer than this many bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frame_len: Option<usize>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_RELAY_PORT,
            reuse_address: true,
            client_queue: DEFAULT_CLIENT_QUEUE,
            max_frame_len: None,
        }
    }
}

impl RelayConfig {
    /// Listen on a specific port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the per-client queue depth.
    pub fn with_client_queue(mut self, frames: usize) -> Self {
        self.client_queue = frames;
        self
    }

    /// Enable the frame size guard.
    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = Some(max);
        self
    }

    /// Resolve the listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                PuppetryError::Config(format!("cannot resolve {}:{}", self.host, self.port))
            })
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<()> {
        if self.client_queue == 0 {
            return Err(PuppetryError::Config(
                "client_queue must be positive".to_string(),
            ));
        }
        if self.max_frame_len == Some(0) {
            return Err(PuppetryError::Config(
                "max_frame_len must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}
