//! Session client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PuppetryError, Result};
use crate::notation::Notation;

/// Lowest port a session may target.
pub const MIN_PORT: u16 = 1024;

/// Session client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Consumer host
    pub host: String,
    /// Consumer TCP port (1024-65535)
    pub port: u16,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Network poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Heartbeat resend interval in milliseconds
    pub heartbeat_ms: u64,
    /// Payload notation
    pub notation: Notation,
    /// Retry the connection while disconnected
    pub auto_reconnect: bool,
    /// Delay between reconnect attempts in milliseconds
    pub reconnect_delay_ms: u64,
    /// Clear the diff cache whenever the session becomes active
    pub reset_on_activate: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            connect_timeout_ms: 1000,
            read_timeout_ms: 100,
            poll_interval_ms: 10,
            heartbeat_ms: 500,
            notation: Notation::Json,
            auto_reconnect: false,
            reconnect_delay_ms: 1000,
            reset_on_activate: true,
        }
    }
}

impl SessionConfig {
    /// Target a specific host and port.
    pub fn with_target(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the payload notation.
    pub fn with_notation(mut self, notation: Notation) -> Self {
        self.notation = notation;
        self
    }

    /// Enable automatic reconnection.
    pub fn with_auto_reconnect(mut self, delay: Duration) -> Self {
        self.auto_reconnect = true;
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Network poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Heartbeat interval.
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    /// Reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Target address as `host:port`.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<()> {
        validate_port(self.port)?;
        if self.host.is_empty() {
            return Err(PuppetryError::Config("session host is empty".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(PuppetryError::Config(
                "connect_timeout_ms must be positive".to_string(),
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(PuppetryError::Config(
                "read_timeout_ms must be positive".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(PuppetryError::Config(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.heartbeat_ms == 0 {
            return Err(PuppetryError::Config(
                "heartbeat_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Check a consumer port is in the allowed range.
pub fn validate_port(port: u16) -> Result<()> {
    if port < MIN_PORT {
        return Err(PuppetryError::Config(format!(
            "port {port} outside {MIN_PORT}-65535"
        )));
    }
    Ok(())
}
