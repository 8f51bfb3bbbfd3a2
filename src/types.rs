//! Core data types for the lumbo-pelvic analysis engine.
//!
//! This module defines the entities that flow between the analysis layers:
//! raw samples and validated traces from ingestion, the synchronized angle
//! series, repetition windows and score sets.
//!
//! Design principle: Types should make intent obvious. If a concept exists,
//! it gets a type. Never pass raw tuples or untyped collections across boundaries.
//!
//! Every value here is created fresh for one analysis request and dropped once
//! the response has been produced.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::orientation::Quaternion;

/// Minimum number of data rows a sensor trace must carry.
pub const MIN_TRACE_SAMPLES: usize = 100;

/// Body segment a sensor is strapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorRole {
    /// Lumbar spine sensor (typically L1-L3).
    Spine,
    /// Pelvis / sacrum sensor.
    Pelvis,
}

impl SensorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorRole::Spine => "spine",
            SensorRole::Pelvis => "pelvis",
        }
    }
}

impl fmt::Display for SensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exercise performed during the recording.
///
/// Only sit-to-stand has a repetition scoring model; squat recordings get the
/// angle, coordination and distribution analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    Squat,
    #[default]
    SitToStand,
}

impl ExerciseType {
    pub fn has_repetition_scoring(&self) -> bool {
        matches!(self, ExerciseType::SitToStand)
    }
}

/// A single raw sample parsed from one CSV data row.
///
/// Never interpreted at this level, only preserved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Device clock timestamp (`SampleTimeFine`, microseconds), unwrapped.
    pub timestamp: f64,

    /// Orientation quaternion (w, x, y, z). Validated to be near unit norm.
    pub quaternion: Quaternion,

    /// Gyroscope reading [x, y, z] in deg/s, when the file carries it.
    pub angular_velocity: Option<[f64; 3]>,

    /// Acceleration reading [x, y, z] in m/s², when the file carries it.
    pub linear_acceleration: Option<[f64; 3]>,
}

impl RawSample {
    pub fn new(timestamp: f64, quaternion: Quaternion) -> Self {
        Self {
            timestamp,
            quaternion,
            angular_velocity: None,
            linear_acceleration: None,
        }
    }

    /// Magnitude of the acceleration vector, if present.
    pub fn accel_magnitude(&self) -> Option<f64> {
        self.linear_acceleration.map(magnitude)
    }
}

/// Euclidean norm of a three-axis reading.
pub fn magnitude(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Which optional channels a trace carries for every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelSet {
    pub gyroscope: bool,
    pub acceleration: bool,
    /// The acceleration channel is `FreeAcc_*`: gravity removed and earth
    /// framed, so its Z axis is vertical. Raw `Acc_*` is sensor framed.
    pub free_acceleration: bool,
}

/// A validated, immutable sequence of samples for one body segment.
///
/// Invariants (checked by ingestion, relied on everywhere downstream):
/// - at least [`MIN_TRACE_SAMPLES`] samples
/// - timestamps are non-decreasing
/// - every quaternion is within tolerance of unit norm
/// - an optional channel is either present on every sample or on none
#[derive(Debug, Clone)]
pub struct SensorTrace {
    role: SensorRole,
    samples: Vec<RawSample>,
    channels: ChannelSet,
}

impl SensorTrace {
    /// Wrap already-validated samples. Only ingestion should call this.
    pub(crate) fn from_validated(
        role: SensorRole,
        samples: Vec<RawSample>,
        channels: ChannelSet,
    ) -> Self {
        Self {
            role,
            samples,
            channels,
        }
    }

    pub fn role(&self) -> SensorRole {
        self.role
    }

    pub fn samples(&self) -> &[RawSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn channels(&self) -> ChannelSet {
        self.channels
    }

    /// Recording summary: sample count, duration and estimated rate.
    pub fn metadata(&self) -> TraceMetadata {
        TraceMetadata::from_timestamps(self.samples.iter().map(|s| s.timestamp))
    }
}

/// Summary of one recording, as shown after upload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TraceMetadata {
    pub total_samples: usize,
    pub duration_sec: f64,
    /// Samples per second; 0 when the duration is zero.
    pub sample_rate: f64,
}

impl TraceMetadata {
    /// Build from device timestamps in microseconds.
    pub fn from_timestamps<I>(timestamps: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut iter = timestamps.into_iter();
        let first = match iter.next() {
            Some(t) => t,
            None => {
                return Self {
                    total_samples: 0,
                    duration_sec: 0.0,
                    sample_rate: 0.0,
                }
            }
        };

        let mut count = 1;
        let mut last = first;
        for t in iter {
            count += 1;
            last = t;
        }

        let duration_sec = (last - first) / MICROS_PER_SECOND;
        let sample_rate = if duration_sec > 0.0 {
            count as f64 / duration_sec
        } else {
            0.0
        };

        Self {
            total_samples: count,
            duration_sec,
            sample_rate,
        }
    }
}

/// Device clock ticks per second (`SampleTimeFine` is in microseconds).
pub const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Synchronized sagittal-plane angle series for both sensors.
///
/// All four vectors have the same length and
/// `relative_fe[i] == spine_fe[i] - pelvis_fe[i]` holds exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleSeries {
    /// Seconds since the first spine sample.
    pub time: Vec<f64>,
    /// Spine FE angle in degrees, zeroed at the first sample.
    pub spine_fe: Vec<f64>,
    /// Pelvis FE angle in degrees, zeroed at the first sample.
    pub pelvis_fe: Vec<f64>,
    /// Spine minus pelvis (lumbar lordosis proxy) in degrees.
    pub relative_fe: Vec<f64>,
}

impl AngleSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

// ============================================================================
// REPETITION AND SCORE TYPES
// ============================================================================

/// One detected movement cycle, as a half-open sample range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepetitionWindow {
    /// Zero-based position among all detected windows.
    pub index: usize,
    /// First sample of the window (inclusive).
    pub start_index: usize,
    /// One past the last sample of the window.
    pub end_index: usize,
    /// True for windows detected after the repetition cap was reached.
    /// They are reported but left out of the aggregate.
    pub beyond_cap: bool,
    /// Pelvis seat-off peak inside the window.
    #[serde(skip)]
    pub seat_off_index: Option<usize>,
}

impl RepetitionWindow {
    pub fn new(index: usize, start_index: usize, end_index: usize) -> Self {
        Self {
            index,
            start_index,
            end_index,
            beyond_cap: false,
            seat_off_index: None,
        }
    }

    pub fn len(&self) -> usize {
        self.end_index - self.start_index
    }

    pub fn is_empty(&self) -> bool {
        self.end_index <= self.start_index
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start_index..self.end_index
    }
}

/// Movement-quality scores, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScoreSet {
    pub lordosis: f64,
    pub hip_hinge: f64,
    pub trunk_lean: f64,
}

/// Scores across all counted repetitions: mean and population std per metric.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AggregateScores {
    pub mean: ScoreSet,
    pub std: ScoreSet,
    /// Number of repetitions that contributed.
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_metadata_from_timestamps() {
        // 101 samples at 100 Hz spanning exactly one second
        let meta = TraceMetadata::from_timestamps((0..=100).map(|i| i as f64 * 10_000.0));
        assert_eq!(meta.total_samples, 101);
        assert!((meta.duration_sec - 1.0).abs() < 1e-12);
        assert!((meta.sample_rate - 101.0).abs() < 1e-9);
    }

    #[test]
    fn test_trace_metadata_empty_and_instant() {
        let empty = TraceMetadata::from_timestamps(std::iter::empty());
        assert_eq!(empty.total_samples, 0);
        assert_eq!(empty.sample_rate, 0.0);

        let instant = TraceMetadata::from_timestamps(vec![5.0, 5.0, 5.0]);
        assert_eq!(instant.total_samples, 3);
        assert_eq!(instant.sample_rate, 0.0);
    }

    #[test]
    fn test_repetition_window_range() {
        let window = RepetitionWindow::new(0, 10, 25);
        assert_eq!(window.len(), 15);
        assert_eq!(window.range(), 10..25);
        assert!(!window.is_empty());
        assert!(!window.beyond_cap);
    }

    #[test]
    fn test_raw_sample_accel_magnitude() {
        let mut sample = RawSample::new(0.0, Quaternion::identity());
        assert_eq!(sample.accel_magnitude(), None);

        sample.linear_acceleration = Some([3.0, 4.0, 0.0]);
        assert_eq!(sample.accel_magnitude(), Some(5.0));
    }

    #[test]
    fn test_sensor_role_display() {
        assert_eq!(SensorRole::Spine.to_string(), "spine");
        assert_eq!(SensorRole::Pelvis.as_str(), "pelvis");
    }

    #[test]
    fn test_exercise_type_scoring() {
        assert!(ExerciseType::SitToStand.has_repetition_scoring());
        assert!(!ExerciseType::Squat.has_repetition_scoring());
        assert_eq!(ExerciseType::default(), ExerciseType::SitToStand);
    }
}
