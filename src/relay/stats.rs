//! Relay statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Thread-safe relay counters
#[derive(Debug)]
pub struct RelayStats {
    /// Clients ever accepted
    connections_total: AtomicU64,
    /// Clients currently connected
    connections_active: AtomicU64,
    /// Frames read from upstream
    upstream_frames: AtomicU64,
    /// Payload bytes read from upstream
    upstream_bytes: AtomicU64,
    /// Frames forwarded from clients to upstream
    client_frames: AtomicU64,
    /// Clients dropped for falling behind
    clients_dropped: AtomicU64,
    started_at: Instant,
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            upstream_frames: AtomicU64::new(0),
            upstream_bytes: AtomicU64::new(0),
            client_frames: AtomicU64::new(0),
            clients_dropped: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record an accepted client
    pub fn record_connect(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a client leaving
    pub fn record_disconnect(&self) {
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Record an upstream frame
    pub fn record_upstream_frame(&self, len: usize) {
        self.upstream_frames.fetch_add(1, Ordering::Relaxed);
        self.upstream_bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Record a frame forwarded upstream
    pub fn record_client_frame(&self) {
        self.client_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a client dropped for overflowing its queue
    pub fn record_dropped(&self) {
        self.clients_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total connections
    pub fn connections_total(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    /// Get active connections
    pub fn connections_active(&self) -> u64 {
        self.connections_active.load(Ordering::Relaxed)
    }

    /// Get upstream frame count
    pub fn upstream_frames(&self) -> u64 {
        self.upstream_frames.load(Ordering::Relaxed)
    }

    /// Get forwarded client frame count
    pub fn client_frames(&self) -> u64 {
        self.client_frames.load(Ordering::Relaxed)
    }

    /// Get dropped client count
    pub fn clients_dropped(&self) -> u64 {
        self.clients_dropped.load(Ordering::Relaxed)
    }

    /// Get uptime
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Snapshot for logging or serialization.
    pub fn summary(&self) -> RelayStatsSummary {
        RelayStatsSummary {
            connections_total: self.connections_total(),
            connections_active: self.connections_active(),
            upstream_frames: self.upstream_frames(),
            upstream_bytes: self.upstream_bytes.load(Ordering::Relaxed),
            client_frames: self.client_frames(),
            clients_dropped: self.clients_dropped(),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

/// Statistics summary for serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayStatsSummary {
    /// Clients ever accepted.
    pub connections_total: u64,
    /// Clients currently connected.
    pub connections_active: u64,
    /// Frames read from upstream.
    pub upstream_frames: u64,
    /// Payload bytes read from upstream.
    pub upstream_bytes: u64,
    /// Frames forwarded upstream.
    pub client_frames: u64,
    /// Clients dropped for falling behind.
    pub clients_dropped: u64,
    /// Relay uptime in seconds.
    pub uptime_secs: u64,
}
