//! Pose sampling, canonicalization and change detection.
//!
//! ```text
//! PoseSource ──sample()──> PoseSnapshot ──┐
//!                                         ├──> PoseDiffer::diff() ──> (updates, should_send)
//!            TransmitConfig ──────────────┘
//! ```
//!
//! The host owns the rig; this module only sees the abstract snapshot and
//! the transmit switches.

mod differ;
mod quat;
mod snapshot;
mod transmit;

pub use differ::{build_updates, PoseDiff, PoseDiffer, DEFAULT_HEARTBEAT};
pub use quat::Quat;
pub use snapshot::{JointPose, PoseSnapshot, PoseSource};
pub use transmit::{JointChannels, TransmitConfig, DEFAULT_INTERVAL, MAX_INTERVAL, MIN_INTERVAL};
