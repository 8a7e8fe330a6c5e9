//! Change detection between pose samples.
//!
//! The differ builds the update map for enabled channels and decides whether
//! it is worth sending. A send is warranted when a joint is new, any field
//! changed, appeared or disappeared, or the heartbeat interval has elapsed
//! since the last send. Suppressed samples leave the cache untouched.

use std::time::{Duration, Instant};

use super::snapshot::PoseSnapshot;
use super::transmit::TransmitConfig;
use crate::protocol::{JointUpdate, JointUpdates};

/// Default heartbeat: resend unchanged state at least this often.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(500);

/// Result of diffing one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseDiff {
    /// Update map for every enabled joint present in the sample
    pub updates: JointUpdates,
    /// Whether the caller should transmit
    pub should_send: bool,
}

/// Previously-sent state plus the last send time.
#[derive(Debug, Clone)]
pub struct PoseDiffer {
    last: JointUpdates,
    last_sent: Option<Instant>,
    heartbeat: Duration,
}

impl Default for PoseDiffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseDiffer {
    /// Differ with the default heartbeat.
    pub fn new() -> Self {
        Self::with_heartbeat(DEFAULT_HEARTBEAT)
    }

    /// Differ with a custom heartbeat.
    pub fn with_heartbeat(heartbeat: Duration) -> Self {
        Self {
            last: JointUpdates::new(),
            last_sent: None,
            heartbeat,
        }
    }

    /// Heartbeat interval.
    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Last committed update map.
    pub fn last(&self) -> &JointUpdates {
        &self.last
    }

    /// Build the update map and decide whether to send it.
    pub fn diff(&self, snapshot: &PoseSnapshot, config: &TransmitConfig, now: Instant) -> PoseDiff {
        let updates = build_updates(snapshot, config);
        let should_send = self.heartbeat_due(now) || self.changed(&updates);
        PoseDiff {
            updates,
            should_send,
        }
    }

    /// Record a sent update map as the new baseline.
    pub fn commit(&mut self, updates: JointUpdates, now: Instant) {
        self.last = updates;
        self.last_sent = Some(now);
    }

    /// Forget all sent state; the next diff always sends.
    pub fn reset(&mut self) {
        self.last.clear();
        self.last_sent = None;
    }

    fn heartbeat_due(&self, now: Instant) -> bool {
        match self.last_sent {
            None => true,
            Some(sent) => now.saturating_duration_since(sent) >= self.heartbeat,
        }
    }

    fn changed(&self, updates: &JointUpdates) -> bool {
        let dropped = self.last.keys().any(|joint| !updates.contains_key(joint));
        dropped
            || updates.iter().any(|(joint, update)| match self.last.get(joint) {
                None => true,
                // Option equality covers changed, newly present and newly absent fields.
                Some(previous) => previous != update,
            })
    }
}

/// Project a snapshot onto the enabled channels.
pub fn build_updates(snapshot: &PoseSnapshot, config: &TransmitConfig) -> JointUpdates {
    config
        .enabled_joints()
        .filter_map(|(joint, channels)| {
            let pose = snapshot.get(joint)?;
            let update = JointUpdate {
                position: pose.position.filter(|_| channels.transmit_position),
                rotation: pose
                    .rotation
                    .filter(|_| channels.transmit_rotation)
                    .map(|q| q.canonicalize().xyz()),
            };
            (!update.is_empty()).then(|| (joint.to_string(), update))
        })
        .collect()
}
