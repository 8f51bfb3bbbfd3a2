//! Response model and JSON rendering.
//!
//! This module provides the structured JSON that the dashboard front end
//! consumes. One [`AnalysisResponse`] is produced per request:
//! - `status: "success"` with a `data` block holding every series and summary
//! - `status: "error"` with a human-readable `message` and an `error_code`
//!
//! Computation runs at full precision; floats are rounded only when the
//! response is rendered. p-values keep 4 decimals so small values stay
//! distinguishable from zero.

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::config::P_VALUE_DECIMALS;
use crate::scoring::SitToStandAnalysis;
use crate::signal::{AxisSeries, SegmentSignals};
use crate::statistics::{
    AccelerationStats, Coordination, DescriptiveStats, Distribution, VelocityStats,
};
use crate::types::{AngleSeries, ExerciseType};

/// Outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Top-level response object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AnalysisData>,
}

impl AnalysisResponse {
    pub fn success(data: AnalysisData) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: None,
            error_code: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>, error_code: Option<&str>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            error_code: error_code.map(str::to_string),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// JSON tree with floats rounded to `decimals` (p-values to 4).
    pub fn to_value(&self, decimals: u32) -> serde_json::Result<Value> {
        let mut value = serde_json::to_value(self)?;
        round_floats(&mut value, decimals, None);
        Ok(value)
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self, decimals: u32) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_value(decimals)?)
    }

    /// Single-line JSON.
    pub fn to_compact_json(&self, decimals: u32) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_value(decimals)?)
    }
}

/// Everything produced for a successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisData {
    pub time_series: TimeSeries,
    pub angular_velocity: SegmentPair<Option<GyroSeries>>,
    pub acceleration: SegmentPair<Option<AccelerationSeries>>,
    pub statistics: StatisticsBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sit_to_stand_analysis: Option<SitToStandAnalysis>,
    pub metadata: RequestMetadata,
    pub warnings: Vec<String>,
}

/// A value for each body segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentPair<T> {
    pub spine: T,
    pub pelvis: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub time: Vec<f64>,
    pub spine_fe: Vec<f64>,
    pub pelvis_fe: Vec<f64>,
    pub relative_fe: Vec<f64>,
}

impl From<AngleSeries> for TimeSeries {
    fn from(series: AngleSeries) -> Self {
        Self {
            time: series.time,
            spine_fe: series.spine_fe,
            pelvis_fe: series.pelvis_fe,
            relative_fe: series.relative_fe,
        }
    }
}

/// Raw gyroscope axes in deg/s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GyroSeries {
    pub gyr_x: Vec<f64>,
    pub gyr_y: Vec<f64>,
    pub gyr_z: Vec<f64>,
}

impl From<&AxisSeries> for GyroSeries {
    fn from(axes: &AxisSeries) -> Self {
        Self {
            gyr_x: axes.x.clone(),
            gyr_y: axes.y.clone(),
            gyr_z: axes.z.clone(),
        }
    }
}

/// Acceleration axes, magnitude (m/s²) and jerk (m/s³, `null` where
/// undefined).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccelerationSeries {
    pub acc_x: Vec<f64>,
    pub acc_y: Vec<f64>,
    pub acc_z: Vec<f64>,
    pub magnitude: Vec<f64>,
    pub jerk: Vec<Option<f64>>,
}

impl AccelerationSeries {
    pub fn from_signals(signals: &SegmentSignals) -> Option<Self> {
        let axes = signals.acceleration.as_ref()?;
        Some(Self {
            acc_x: axes.x.clone(),
            acc_y: axes.y.clone(),
            acc_z: axes.z.clone(),
            magnitude: signals.accel_magnitude.clone().unwrap_or_else(|| axes.magnitude()),
            jerk: signals.jerk.clone().unwrap_or_default(),
        })
    }
}

/// Descriptive angle statistics plus angular velocity when a gyroscope was
/// present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelStatistics {
    #[serde(flatten)]
    pub angles: DescriptiveStats,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<VelocityStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionBlock {
    pub spine: Distribution,
    pub pelvis: Distribution,
    pub relative: Distribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsBlock {
    pub spine: ChannelStatistics,
    pub pelvis: ChannelStatistics,
    pub relative: ChannelStatistics,
    pub acceleration: SegmentPair<Option<AccelerationStats>>,
    pub coordination: Coordination,
    pub distribution: DistributionBlock,
}

/// Request summary shown above the charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestMetadata {
    pub duration_sec: f64,
    /// Synchronized sample count.
    pub total_samples: usize,
    pub sample_rate: f64,
    pub spine_file: String,
    pub pelvis_file: String,
    pub spine_samples: usize,
    pub pelvis_samples: usize,
    pub exercise: ExerciseType,
}

/// Round `x` to `decimals` places; never yields negative zero.
pub fn round_to(x: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (x * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

fn round_floats(value: &mut Value, decimals: u32, key: Option<&str>) {
    let places = if key == Some("p_value") {
        P_VALUE_DECIMALS
    } else {
        decimals
    };
    match value {
        Value::Number(n) => {
            if let Some(x) = n.as_f64().filter(|_| n.is_f64()) {
                *n = Number::from_f64(round_to(x, places)).unwrap_or_else(|| n.clone());
            }
        }
        Value::Array(items) => {
            for item in items {
                round_floats(item, decimals, key);
            }
        }
        Value::Object(map) => round_object(map, decimals),
        _ => {}
    }
}

fn round_object(map: &mut Map<String, Value>, decimals: u32) {
    for (k, v) in map.iter_mut() {
        round_floats(v, decimals, Some(k.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normality::NormalityTest;
    use crate::statistics::{Histogram, Quartiles};

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(-0.001, 2), 0.0);
        assert!(round_to(-0.001, 2).is_sign_positive());
        assert_eq!(round_to(2.5, 0), 3.0);
    }

    #[test]
    fn test_error_response_shape() {
        let response = AnalysisResponse::error("Missing required columns: Quat_Z", Some("E003"));
        let value = response.to_value(2).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error_code"], "E003");
        assert!(value.get("data").is_none());
        assert!(!response.is_success());
    }

    #[test]
    fn test_p_value_keeps_four_decimals() {
        let distribution = Distribution {
            histogram: Histogram {
                bin_edges: vec![0.123456, 1.0],
                counts: vec![3],
            },
            quartiles: Some(Quartiles {
                q25: 0.33333,
                q50: 0.5,
                q75: 0.66666,
            }),
            normality_test: NormalityTest {
                p_value: Some(0.0123456),
                is_normal: Some(false),
            },
        };
        let mut value = serde_json::to_value(&distribution).unwrap();
        round_floats(&mut value, 2, None);

        assert_eq!(value["normality_test"]["p_value"], 0.0123);
        assert_eq!(value["quartiles"]["q25"], 0.33);
        assert_eq!(value["histogram"]["bin_edges"][0], 0.12);
        assert_eq!(value["histogram"]["counts"][0], 3);
    }

    #[test]
    fn test_channel_statistics_flattens_velocity() {
        let without = ChannelStatistics {
            angles: DescriptiveStats::default(),
            velocity: None,
        };
        let value = serde_json::to_value(without).unwrap();
        assert!(value.get("rom").is_some());
        assert!(value.get("peak_angular_velocity").is_none());

        let with = ChannelStatistics {
            velocity: Some(VelocityStats {
                peak_angular_velocity: 120.0,
                mean_angular_velocity: 40.0,
                rms_angular_velocity: 55.0,
            }),
            ..without
        };
        let value = serde_json::to_value(with).unwrap();
        assert_eq!(value["peak_angular_velocity"], 120.0);
    }

    #[test]
    fn test_undefined_jerk_renders_null() {
        let mut value = serde_json::to_value(vec![None, Some(1.005_f64)]).unwrap();
        round_floats(&mut value, 2, None);
        assert_eq!(value[0], Value::Null);
    }
}
