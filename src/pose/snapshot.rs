//! Pose snapshots produced by the host once per sampling tick.

use std::collections::BTreeMap;

use super::quat::Quat;

/// Transform of one joint at sampling time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JointPose {
    /// Local position
    pub position: Option<[f32; 3]>,
    /// Local rotation (any sign, any norm; canonicalized by the differ)
    pub rotation: Option<Quat>,
}

impl JointPose {
    /// Pose with only a rotation.
    pub fn rotation(rotation: Quat) -> Self {
        Self {
            position: None,
            rotation: Some(rotation),
        }
    }

    /// Pose with only a position.
    pub fn position(position: [f32; 3]) -> Self {
        Self {
            position: Some(position),
            rotation: None,
        }
    }

    /// Pose with both fields.
    pub fn new(position: [f32; 3], rotation: Quat) -> Self {
        Self {
            position: Some(position),
            rotation: Some(rotation),
        }
    }
}

/// Joint name to pose, as sampled from the rig.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseSnapshot {
    joints: BTreeMap<String, JointPose>,
}

impl PoseSnapshot {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a joint pose.
    pub fn insert(&mut self, joint: impl Into<String>, pose: JointPose) {
        self.joints.insert(joint.into(), pose);
    }

    /// Builder form of [`PoseSnapshot::insert`].
    pub fn with_joint(mut self, joint: impl Into<String>, pose: JointPose) -> Self {
        self.insert(joint, pose);
        self
    }

    /// Look up a joint.
    pub fn get(&self, joint: &str) -> Option<&JointPose> {
        self.joints.get(joint)
    }

    /// Iterate joints in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &JointPose)> {
        self.joints.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of joints.
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// Whether the snapshot has no joints.
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, JointPose)> for PoseSnapshot {
    fn from_iter<I: IntoIterator<Item = (S, JointPose)>>(iter: I) -> Self {
        Self {
            joints: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Source of pose snapshots, implemented by the host.
pub trait PoseSource {
    /// Sample the current pose; `None` when no rig is available.
    fn sample(&mut self) -> Option<PoseSnapshot>;
}

impl<F> PoseSource for F
where
    F: FnMut() -> Option<PoseSnapshot>,
{
    fn sample(&mut self) -> Option<PoseSnapshot> {
        self()
    }
}
