//! Per-joint transmit configuration.
//!
//! Which joints stream, which of their channels, and how often the pose is
//! sampled. Hosts mutate it only through the methods below.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fastest allowed sampling interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(50);

/// Slowest allowed sampling interval.
pub const MAX_INTERVAL: Duration = Duration::from_secs(5);

/// Default sampling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Channel switches for one joint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointChannels {
    /// Send position
    #[serde(default)]
    pub transmit_position: bool,
    /// Send rotation
    #[serde(default)]
    pub transmit_rotation: bool,
    /// Free-form group tag (e.g. "face", "hands")
    #[serde(default)]
    pub group: String,
}

impl JointChannels {
    /// Whether either channel is on.
    pub fn is_enabled(&self) -> bool {
        self.transmit_position || self.transmit_rotation
    }
}

/// Transmit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitConfig {
    /// Sampling interval in milliseconds
    #[serde(default = "default_interval_ms")]
    interval_ms: u64,
    /// Joint switches by joint name
    #[serde(default)]
    joints: BTreeMap<String, JointChannels>,
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL.as_millis() as u64
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            joints: BTreeMap::new(),
        }
    }
}

impl TransmitConfig {
    /// Empty configuration (nothing transmitted).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sampling interval, clamped to the allowed range.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms).clamp(MIN_INTERVAL, MAX_INTERVAL)
    }

    /// Set the sampling interval; out-of-range values are clamped.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval_ms = interval.clamp(MIN_INTERVAL, MAX_INTERVAL).as_millis() as u64;
    }

    /// Builder form of [`TransmitConfig::set_interval`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.set_interval(interval);
        self
    }

    /// Enable a joint's channels.
    pub fn enable(&mut self, joint: impl Into<String>, position: bool, rotation: bool) {
        let entry = self.joints.entry(joint.into()).or_default();
        entry.transmit_position = position;
        entry.transmit_rotation = rotation;
    }

    /// Builder form of [`TransmitConfig::enable`].
    pub fn with_joint(mut self, joint: impl Into<String>, position: bool, rotation: bool) -> Self {
        self.enable(joint, position, rotation);
        self
    }

    /// Toggle position transmission for a joint.
    pub fn set_position(&mut self, joint: &str, on: bool) {
        self.joints.entry(joint.to_string()).or_default().transmit_position = on;
    }

    /// Toggle rotation transmission for a joint.
    pub fn set_rotation(&mut self, joint: &str, on: bool) {
        self.joints.entry(joint.to_string()).or_default().transmit_rotation = on;
    }

    /// Assign a joint to a group.
    pub fn set_group(&mut self, joint: &str, group: impl Into<String>) {
        self.joints.entry(joint.to_string()).or_default().group = group.into();
    }

    /// Set both channels for every joint in a group. Returns joints touched.
    pub fn set_group_enabled(&mut self, group: &str, position: bool, rotation: bool) -> usize {
        let mut touched = 0;
        for channels in self.joints.values_mut().filter(|c| c.group == group) {
            channels.transmit_position = position;
            channels.transmit_rotation = rotation;
            touched += 1;
        }
        touched
    }

    /// Turn off both channels for a joint.
    pub fn disable(&mut self, joint: &str) {
        if let Some(channels) = self.joints.get_mut(joint) {
            channels.transmit_position = false;
            channels.transmit_rotation = false;
        }
    }

    /// Channel switches for a joint.
    pub fn channels(&self, joint: &str) -> Option<&JointChannels> {
        self.joints.get(joint)
    }

    /// Whether a joint has any channel on.
    pub fn is_enabled(&self, joint: &str) -> bool {
        self.joints.get(joint).is_some_and(JointChannels::is_enabled)
    }

    /// Joints with at least one channel on, in name order.
    pub fn enabled_joints(&self) -> impl Iterator<Item = (&str, &JointChannels)> {
        self.joints
            .iter()
            .filter(|(_, c)| c.is_enabled())
            .map(|(k, c)| (k.as_str(), c))
    }

    /// Distinct group tags in use.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = self
            .joints
            .values()
            .map(|c| c.group.as_str())
            .filter(|g| !g.is_empty())
            .collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }
}
