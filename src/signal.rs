//! Dual-sensor synchronization and derived kinematic signals.
//!
//! This module provides:
//! - Alignment of the spine and pelvis traces onto a common sample range
//! - The synchronized FE angle series (spine, pelvis, relative)
//! - Raw gyroscope/accelerometer channels, acceleration magnitude and jerk
//!
//! Synchronization is truncation only: both traces are cut to the shorter
//! length and sample `i` of one is paired with sample `i` of the other. If the
//! two sensors ran at different rates the later samples drift apart; that
//! limitation is accepted and no resampling is done.
//!
//! Angular velocity and acceleration come straight from the sensor channels.
//! They are never derived by differentiating the angle.

use serde::Serialize;
use tracing::debug;

use crate::error::ComputationError;
use crate::orientation::{pitch_series, ZeroReference};
use crate::types::{
    magnitude, AngleSeries, ChannelSet, RawSample, SensorTrace, MICROS_PER_SECOND,
};

/// Borrowed views of both traces, cut to the same length.
#[derive(Debug, Clone, Copy)]
pub struct SynchronizedPair<'a> {
    spine: &'a [RawSample],
    pelvis: &'a [RawSample],
    spine_channels: ChannelSet,
    pelvis_channels: ChannelSet,
}

impl<'a> SynchronizedPair<'a> {
    /// Truncate both traces to `min(len(spine), len(pelvis))` samples.
    pub fn truncate(spine: &'a SensorTrace, pelvis: &'a SensorTrace) -> Self {
        let common = spine.len().min(pelvis.len());
        if spine.len() != pelvis.len() {
            debug!(
                spine = spine.len(),
                pelvis = pelvis.len(),
                common,
                "truncating traces to common length"
            );
        }

        Self {
            spine: &spine.samples()[..common],
            pelvis: &pelvis.samples()[..common],
            spine_channels: spine.channels(),
            pelvis_channels: pelvis.channels(),
        }
    }

    pub fn len(&self) -> usize {
        self.spine.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spine.is_empty()
    }

    pub fn spine(&self) -> &'a [RawSample] {
        self.spine
    }

    pub fn pelvis(&self) -> &'a [RawSample] {
        self.pelvis
    }

    pub fn spine_channels(&self) -> ChannelSet {
        self.spine_channels
    }

    pub fn pelvis_channels(&self) -> ChannelSet {
        self.pelvis_channels
    }

    /// Build the FE angle series on the spine time base.
    ///
    /// Fails only if the pair is empty, which validated traces never are.
    pub fn angle_series(&self) -> Result<AngleSeries, ComputationError> {
        if self.is_empty() {
            return Err(ComputationError::InsufficientSamples {
                what: "angle series",
                needed: 1,
                got: 0,
            });
        }

        let spine_fe = pitch_series(
            self.spine.iter().map(|s| &s.quaternion),
            ZeroReference::FirstSample,
        );
        let pelvis_fe = pitch_series(
            self.pelvis.iter().map(|s| &s.quaternion),
            ZeroReference::FirstSample,
        );
        let relative_fe = relative_series(&spine_fe, &pelvis_fe)?;

        Ok(AngleSeries {
            time: relative_seconds(self.spine),
            spine_fe,
            pelvis_fe,
            relative_fe,
        })
    }

    /// Absolute spine pitch, used as trunk lean.
    pub fn trunk_lean(&self) -> Vec<f64> {
        pitch_series(self.spine.iter().map(|s| &s.quaternion), ZeroReference::Absolute)
    }
}

/// Seconds elapsed since the first sample.
pub fn relative_seconds(samples: &[RawSample]) -> Vec<f64> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    samples
        .iter()
        .map(|s| (s.timestamp - first.timestamp) / MICROS_PER_SECOND)
        .collect()
}

/// Pointwise `spine - pelvis`.
pub fn relative_series(spine: &[f64], pelvis: &[f64]) -> Result<Vec<f64>, ComputationError> {
    if spine.len() != pelvis.len() {
        return Err(ComputationError::LengthMismatch {
            what: "relative FE",
            left: spine.len(),
            right: pelvis.len(),
        });
    }
    Ok(spine.iter().zip(pelvis).map(|(s, p)| s - p).collect())
}

/// Three parallel per-axis series.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AxisSeries {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl AxisSeries {
    fn from_triplets<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<[f64; 3]>>,
    {
        let mut series = AxisSeries::default();
        for value in values {
            let [x, y, z] = value?;
            series.x.push(x);
            series.y.push(y);
            series.z.push(z);
        }
        Some(series)
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Euclidean norm per sample.
    pub fn magnitude(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| magnitude([self.x[i], self.y[i], self.z[i]]))
            .collect()
    }
}

/// Raw and derived channels for one body segment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SegmentSignals {
    /// Gyroscope in deg/s, when every sample carries it.
    pub angular_velocity: Option<AxisSeries>,
    /// Acceleration in m/s², when every sample carries it.
    pub acceleration: Option<AxisSeries>,
    /// |acceleration| per sample.
    pub accel_magnitude: Option<Vec<f64>>,
    /// d|a|/dt in m/s³; the first entry is always `None`.
    pub jerk: Option<Vec<Option<f64>>>,
}

impl SegmentSignals {
    pub fn from_samples(samples: &[RawSample]) -> Self {
        let angular_velocity = AxisSeries::from_triplets(samples.iter().map(|s| s.angular_velocity))
            .filter(|series| !series.is_empty());
        let acceleration =
            AxisSeries::from_triplets(samples.iter().map(|s| s.linear_acceleration))
                .filter(|series| !series.is_empty());

        let accel_magnitude = acceleration.as_ref().map(AxisSeries::magnitude);
        let jerk = accel_magnitude
            .as_ref()
            .map(|mag| jerk(mag, &relative_seconds(samples)));

        Self {
            angular_velocity,
            acceleration,
            accel_magnitude,
            jerk,
        }
    }
}

/// Derived channels for both segments over the synchronized range.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DerivedSignals {
    pub spine: SegmentSignals,
    pub pelvis: SegmentSignals,
}

impl DerivedSignals {
    pub fn from_pair(pair: &SynchronizedPair<'_>) -> Self {
        Self {
            spine: SegmentSignals::from_samples(pair.spine()),
            pelvis: SegmentSignals::from_samples(pair.pelvis()),
        }
    }
}

/// Forward-difference jerk of an acceleration magnitude signal.
///
/// `jerk[i] = (a[i] - a[i-1]) / (t[i] - t[i-1])` for `i >= 1`. The first
/// sample has no predecessor and any sample whose interval is not positive
/// (duplicate timestamps) is undefined; both are `None`, never zero.
pub fn jerk(magnitude: &[f64], time: &[f64]) -> Vec<Option<f64>> {
    let n = magnitude.len().min(time.len());
    let mut out = Vec::with_capacity(n);
    if n == 0 {
        return out;
    }

    out.push(None);
    for i in 1..n {
        let dt = time[i] - time[i - 1];
        if dt > 0.0 {
            out.push(Some((magnitude[i] - magnitude[i - 1]) / dt));
        } else {
            out.push(None);
        }
    }
    out
}
