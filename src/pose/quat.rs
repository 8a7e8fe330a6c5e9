//! Unit quaternion with canonical sign.
//!
//! `q` and `-q` encode the same rotation. Sending both forms across ticks
//! makes consumers interpolate the long way round, so every rotation is
//! canonicalized to `w >= 0` before it is diffed or sent. Only `x, y, z`
//! travel on the wire; [`Quat::from_xyz`] rebuilds `w`.

use serde::{Deserialize, Serialize};

/// Tolerance on `|q|^2 - 1` under which a quaternion counts as normalized.
const NORM_EPSILON: f64 = 1e-6;

/// Quaternion `w + xi + yj + zk`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    /// i component
    pub x: f32,
    /// j component
    pub y: f32,
    /// k component
    pub z: f32,
    /// Scalar component
    pub w: f32,
}

impl Quat {
    /// Identity rotation.
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Create from components.
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians about a unit `axis`.
    pub fn from_axis_angle(axis: [f32; 3], angle: f32) -> Self {
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(axis[0] * s, axis[1] * s, axis[2] * s, c)
    }

    /// Rebuild a unit quaternion from its imaginary part, choosing `w >= 0`.
    pub fn from_xyz(xyz: [f32; 3]) -> Self {
        let [x, y, z] = xyz;
        let rest = 1.0 - f64::from(x).powi(2) - f64::from(y).powi(2) - f64::from(z).powi(2);
        Self::new(x, y, z, rest.max(0.0).sqrt() as f32)
    }

    /// Squared norm, computed in f64.
    pub fn norm_squared(&self) -> f64 {
        [self.x, self.y, self.z, self.w]
            .iter()
            .map(|c| f64::from(*c).powi(2))
            .sum()
    }

    /// Normalized copy; a zero quaternion becomes the identity.
    ///
    /// Already-normalized input is returned bit-for-bit unchanged.
    pub fn normalized(&self) -> Self {
        let norm_sq = self.norm_squared();
        if norm_sq == 0.0 || !norm_sq.is_finite() {
            return Self::IDENTITY;
        }
        if (norm_sq - 1.0).abs() <= NORM_EPSILON {
            return *self;
        }
        let inv = 1.0 / norm_sq.sqrt();
        Self::new(
            (f64::from(self.x) * inv) as f32,
            (f64::from(self.y) * inv) as f32,
            (f64::from(self.z) * inv) as f32,
            (f64::from(self.w) * inv) as f32,
        )
    }

    /// Normalize and flip sign so that `w >= 0`.
    pub fn canonicalize(&self) -> Self {
        let q = self.normalized();
        if q.w < 0.0 {
            Self::new(-q.x, -q.y, -q.z, -q.w)
        } else {
            q
        }
    }

    /// Imaginary part `[x, y, z]`.
    pub fn xyz(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Absolute 4D dot product; 1.0 means the same rotation.
    pub fn rotation_similarity(&self, other: &Self) -> f64 {
        let a = self.normalized();
        let b = other.normalized();
        (f64::from(a.x) * f64::from(b.x)
            + f64::from(a.y) * f64::from(b.y)
            + f64::from(a.z) * f64::from(b.z)
            + f64::from(a.w) * f64::from(b.w))
        .abs()
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}
