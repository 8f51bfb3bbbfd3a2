//! Orientation kinematics: quaternion to sagittal-plane angle.
//!
//! Movella DOT sensors report their attitude as a unit quaternion. The
//! flexion-extension (FE) angle of a body segment is the Tait-Bryan pitch
//! (rotation about the sensor Y axis, aerospace ZYX order):
//!
//! ```text
//! pitch = asin(clamp(2(w·y − z·x), −1, 1))
//! ```
//!
//! The same conversion feeds three clinical signals that differ only in how
//! they are referenced:
//! - FE angle and pelvic rotation are zeroed at the first sample of their trace,
//!   which removes the arbitrary sensor-mounting offset.
//! - Trunk lean is the absolute pitch, because it is defined against gravity.

use serde::{Deserialize, Serialize};

/// A quaternion in (w, x, y, z) order.
///
/// Unit quaternions represent rotations in 3D space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    /// Scalar (real) part
    pub w: f64,
    /// Vector part (x, y, z)
    pub xyz: [f64; 3],
}

impl Quaternion {
    /// Create a quaternion from components.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, xyz: [x, y, z] }
    }

    /// Identity quaternion (no rotation).
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            xyz: [0.0, 0.0, 0.0],
        }
    }

    /// Euclidean norm |q|. Should be ≈ 1 for sensor output.
    pub fn norm(&self) -> f64 {
        (self.w * self.w
            + self.xyz[0] * self.xyz[0]
            + self.xyz[1] * self.xyz[1]
            + self.xyz[2] * self.xyz[2])
            .sqrt()
    }

    /// True if |q| lies within `[1 - tolerance, 1 + tolerance]`.
    pub fn is_unit(&self, tolerance: f64) -> bool {
        let norm = self.norm();
        norm.is_finite() && (norm - 1.0).abs() <= tolerance
    }

    /// Pitch (rotation about Y) in degrees, in [-90, 90].
    ///
    /// The asin argument is clamped so values that drift slightly outside
    /// [-1, 1] through rounding saturate at ±90° instead of producing NaN.
    pub fn pitch_degrees(&self) -> f64 {
        let [x, y, z] = self.xyz;
        let arg = (2.0 * (self.w * y - z * x)).clamp(-1.0, 1.0);
        arg.asin().to_degrees()
    }

    /// Roll (rotation about X) in degrees.
    pub fn roll_degrees(&self) -> f64 {
        let [x, y, z] = self.xyz;
        (2.0 * (self.w * x + y * z))
            .atan2(1.0 - 2.0 * (x * x + y * y))
            .to_degrees()
    }

    /// Yaw (rotation about Z) in degrees.
    pub fn yaw_degrees(&self) -> f64 {
        let [x, y, z] = self.xyz;
        (2.0 * (self.w * z + x * y))
            .atan2(1.0 - 2.0 * (y * y + z * z))
            .to_degrees()
    }

    /// Full Euler decomposition.
    pub fn to_euler(&self) -> EulerAngles {
        EulerAngles {
            roll: self.roll_degrees(),
            pitch: self.pitch_degrees(),
            yaw: self.yaw_degrees(),
        }
    }
}

/// Tait-Bryan angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// How a pitch series is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroReference {
    /// Subtract the first sample's pitch so the series starts at exactly 0°.
    /// Used for FE angle and pelvic rotation.
    FirstSample,
    /// Keep the absolute pitch. Used for trunk lean.
    Absolute,
}

/// Convert a quaternion sequence to a pitch series in degrees.
///
/// Returns an empty vector for empty input.
pub fn pitch_series<'a, I>(quaternions: I, reference: ZeroReference) -> Vec<f64>
where
    I: IntoIterator<Item = &'a Quaternion>,
{
    let mut pitches: Vec<f64> = quaternions.into_iter().map(Quaternion::pitch_degrees).collect();

    if reference == ZeroReference::FirstSample {
        if let Some(&offset) = pitches.first() {
            for p in pitches.iter_mut() {
                *p -= offset;
            }
        }
    }

    pitches
}
