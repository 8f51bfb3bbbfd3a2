//! Movement-quality scoring for sit-to-stand repetitions.
//!
//! Each repetition window gets three scores in [0, 100]:
//! - **Lordosis**: share of samples where the lumbar angle (spine − pelvis)
//!   stays at or below 0°.
//! - **Hip hinge**: pelvic rotation range, mapped linearly across
//!   `hip_hinge_range` and saturating outside it.
//! - **Trunk lean**: weighted blend of peak-lean fit, peak timing relative to
//!   seat-off, and smoothness of the trunk-lean angle.
//!
//! Scores are aggregated across counted repetitions as mean and population
//! standard deviation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::segmentation::{seat_off_index, Segmentation, SegmentationSource};
use crate::statistics::{describe, RunningStats};
use crate::types::{AggregateScores, AngleSeries, RepetitionWindow, ScoreSet};

/// Relative weights of the trunk-lean components. They should sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrunkLeanWeights {
    pub peak: f64,
    pub timing: f64,
    pub smoothness: f64,
}

impl Default for TrunkLeanWeights {
    fn default() -> Self {
        Self {
            peak: 0.5,
            timing: 0.3,
            smoothness: 0.2,
        }
    }
}

/// Configuration for repetition scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Pelvic rotation range (degrees) mapped to 0 and 100.
    pub hip_hinge_range: (f64, f64),

    /// Target band for peak absolute trunk lean (degrees).
    pub trunk_lean_range: (f64, f64),

    /// Degrees past the upper bound at which the peak component bottoms out
    /// at half credit.
    pub trunk_lean_excess_cap: f64,

    pub trunk_lean_weights: TrunkLeanWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            hip_hinge_range: (30.0, 60.0),
            trunk_lean_range: (20.0, 45.0),
            trunk_lean_excess_cap: 25.0,
            trunk_lean_weights: TrunkLeanWeights::default(),
        }
    }
}

// ============================================================================
// PER-METRIC SCORES
// ============================================================================

/// 100 × share of samples with `relative_fe <= 0`. Empty input scores 0.
pub fn lordosis_score(relative_fe: &[f64]) -> f64 {
    if relative_fe.is_empty() {
        return 0.0;
    }
    let in_target = relative_fe.iter().filter(|&&a| a <= 0.0).count();
    100.0 * in_target as f64 / relative_fe.len() as f64
}

/// Linear map of the rotation range from `(low, high)` onto `(0, 100)`.
pub fn hip_hinge_score(pelvic_rotation: &[f64], range: (f64, f64)) -> f64 {
    let Some(stats) = describe(pelvic_rotation) else {
        return 0.0;
    };
    let (low, high) = range;
    if high <= low {
        return if stats.rom >= high { 100.0 } else { 0.0 };
    }
    (100.0 * (stats.rom - low) / (high - low)).clamp(0.0, 100.0)
}

/// numpy-style gradient: central differences inside, one-sided at the ends.
fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let mut out = Vec::with_capacity(n);
    out.push(values[1] - values[0]);
    for i in 1..n - 1 {
        out.push((values[i + 1] - values[i - 1]) / 2.0);
    }
    out.push(values[n - 1] - values[n - 2]);
    out
}

/// Components of the trunk-lean score, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrunkLeanComponents {
    pub peak_fit: f64,
    pub timing: f64,
    pub smoothness: f64,
}

impl TrunkLeanComponents {
    /// Timing is the distance of the trunk-lean peak from the expected
    /// phase of the movement. That phase is `anchor`, the window-relative
    /// seat-off index, since the trunk leans furthest as the pelvis leaves
    /// the seat. Without a seat-off the expected phase is mid-window.
    pub fn compute(trunk_lean: &[f64], anchor: Option<usize>, config: &ScoringConfig) -> Self {
        let n = trunk_lean.len();
        if n == 0 {
            return Self {
                peak_fit: 0.0,
                timing: 0.0,
                smoothness: 0.0,
            };
        }

        let mut peak_index = 0;
        for (i, &v) in trunk_lean.iter().enumerate() {
            if v > trunk_lean[peak_index] {
                peak_index = i;
            }
        }
        let peak = trunk_lean[peak_index];

        let (low, high) = config.trunk_lean_range;
        let peak_fit = if peak < low {
            if low > 0.0 {
                (peak / low).max(0.0)
            } else {
                0.0
            }
        } else if peak <= high {
            1.0
        } else {
            let cap = config.trunk_lean_excess_cap.max(0.0);
            1.0 - (peak - high).min(cap) / 50.0
        };

        let half = n as f64 / 2.0;
        let anchor = anchor.map(|a| a as f64).unwrap_or(half);
        let timing = 1.0 - ((peak_index as f64 - anchor).abs() / half).min(1.0);

        let third = gradient(&gradient(&gradient(trunk_lean)));
        let smoothness = 1.0 / (1.0 + RunningStats::from_slice(&third).std_dev());

        Self {
            peak_fit: peak_fit.clamp(0.0, 1.0),
            timing,
            smoothness,
        }
    }

    pub fn score(&self, weights: &TrunkLeanWeights) -> f64 {
        let blended = weights.peak * self.peak_fit
            + weights.timing * self.timing
            + weights.smoothness * self.smoothness;
        (100.0 * blended).clamp(0.0, 100.0)
    }
}

pub fn trunk_lean_score(trunk_lean: &[f64], anchor: Option<usize>, config: &ScoringConfig) -> f64 {
    TrunkLeanComponents::compute(trunk_lean, anchor, config).score(&config.trunk_lean_weights)
}

/// All three scores for one window.
///
/// `seat_off` is an absolute sample index; it is made window-relative here.
pub fn score_window(
    window: &RepetitionWindow,
    angles: &AngleSeries,
    trunk_lean: &[f64],
    config: &ScoringConfig,
) -> ScoreSet {
    let end = window.end_index.min(angles.len()).min(trunk_lean.len());
    let start = window.start_index.min(end);
    let anchor = window
        .seat_off_index
        .filter(|&i| i >= start && i < end)
        .map(|i| i - start);

    ScoreSet {
        lordosis: lordosis_score(&angles.relative_fe[start..end]),
        hip_hinge: hip_hinge_score(&angles.pelvis_fe[start..end], config.hip_hinge_range),
        trunk_lean: trunk_lean_score(&trunk_lean[start..end], anchor, config),
    }
}

/// Mean and population std per metric.
pub fn aggregate<'a, I>(scores: I) -> AggregateScores
where
    I: IntoIterator<Item = &'a ScoreSet>,
{
    let mut lordosis = RunningStats::new();
    let mut hip_hinge = RunningStats::new();
    let mut trunk_lean = RunningStats::new();
    for s in scores {
        lordosis.update(s.lordosis);
        hip_hinge.update(s.hip_hinge);
        trunk_lean.update(s.trunk_lean);
    }

    AggregateScores {
        mean: ScoreSet {
            lordosis: lordosis.mean(),
            hip_hinge: hip_hinge.mean(),
            trunk_lean: trunk_lean.mean(),
        },
        std: ScoreSet {
            lordosis: lordosis.std_dev(),
            hip_hinge: hip_hinge.std_dev(),
            trunk_lean: trunk_lean.std_dev(),
        },
        count: lordosis.count(),
    }
}

// ============================================================================
// SIT-TO-STAND REPORT
// ============================================================================

/// One scored repetition as reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepetitionDetail {
    #[serde(flatten)]
    pub window: RepetitionWindow,
    pub start_time: f64,
    pub end_time: f64,
    pub duration_sec: f64,
    pub scores: ScoreSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AngleSummary {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LordosisData {
    pub time: Vec<f64>,
    pub angles: Vec<f64>,
    pub stats: AngleSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PelvicRotationData {
    pub time: Vec<f64>,
    pub angles: Vec<f64>,
    pub range: f64,
    /// Largest |rotation|.
    pub peak: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrunkLeanData {
    pub time: Vec<f64>,
    pub angles: Vec<f64>,
    pub peak: f64,
    pub peak_time: f64,
}

/// Full sit-to-stand block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SitToStandAnalysis {
    /// Repetitions that count towards the aggregate.
    pub repetitions: usize,
    pub segmentation_source: SegmentationSource,
    pub repetition_details: Vec<RepetitionDetail>,
    pub lordosis_data: LordosisData,
    pub pelvic_rotation_data: PelvicRotationData,
    pub trunk_lean_data: TrunkLeanData,
    /// Mean across counted repetitions.
    pub scores: ScoreSet,
    /// Population std across counted repetitions.
    pub score_variability: ScoreSet,
}

/// Score every window and build the report.
///
/// `seat_off_signal` is the pelvis signal whose peak |value| marks seat-off:
/// vertical free acceleration, or the magnitude of a raw accelerometer.
pub fn analyze_sit_to_stand(
    angles: &AngleSeries,
    trunk_lean: &[f64],
    segmentation: &Segmentation,
    seat_off_signal: Option<&[f64]>,
    config: &ScoringConfig,
) -> SitToStandAnalysis {
    let time_at = |i: usize| -> f64 {
        angles
            .time
            .get(i.min(angles.len().saturating_sub(1)))
            .copied()
            .unwrap_or_default()
    };

    let details: Vec<RepetitionDetail> = segmentation
        .windows
        .iter()
        .map(|window| {
            let mut window = *window;
            window.seat_off_index = seat_off_signal.and_then(|v| seat_off_index(v, &window));
            let scores = score_window(&window, angles, trunk_lean, config);
            let start_time = time_at(window.start_index);
            let end_time = time_at(window.end_index.saturating_sub(1));
            RepetitionDetail {
                window,
                start_time,
                end_time,
                duration_sec: end_time - start_time,
                scores,
            }
        })
        .collect();

    let aggregate = aggregate(
        details
            .iter()
            .filter(|d| !d.window.beyond_cap)
            .map(|d| &d.scores),
    );
    debug!(
        counted = aggregate.count,
        lordosis = aggregate.mean.lordosis,
        hip_hinge = aggregate.mean.hip_hinge,
        trunk_lean = aggregate.mean.trunk_lean,
        "repetitions scored"
    );

    let lordosis_stats = describe(&angles.relative_fe);
    let pelvis_stats = describe(&angles.pelvis_fe);

    let mut trunk_peak_index = 0;
    for (i, &v) in trunk_lean.iter().enumerate() {
        if v > trunk_lean[trunk_peak_index] {
            trunk_peak_index = i;
        }
    }

    SitToStandAnalysis {
        repetitions: aggregate.count,
        segmentation_source: segmentation.source,
        repetition_details: details,
        lordosis_data: LordosisData {
            time: angles.time.clone(),
            angles: angles.relative_fe.clone(),
            stats: lordosis_stats
                .map(|s| AngleSummary {
                    mean: s.mean,
                    max: s.max,
                    min: s.min,
                    std: s.std,
                })
                .unwrap_or(AngleSummary {
                    mean: 0.0,
                    max: 0.0,
                    min: 0.0,
                    std: 0.0,
                }),
        },
        pelvic_rotation_data: PelvicRotationData {
            time: angles.time.clone(),
            angles: angles.pelvis_fe.clone(),
            range: pelvis_stats.map(|s| s.rom).unwrap_or_default(),
            peak: angles.pelvis_fe.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())),
        },
        trunk_lean_data: TrunkLeanData {
            time: angles.time.clone(),
            angles: trunk_lean.to_vec(),
            peak: trunk_lean.get(trunk_peak_index).copied().unwrap_or_default(),
            peak_time: time_at(trunk_peak_index),
        },
        scores: aggregate.mean,
        score_variability: aggregate.std,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::{segment_repetitions, SegmentationConfig};
    use approx::assert_abs_diff_eq;

    fn ramp(from: f64, to: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| from + (to - from) * i as f64 / (n - 1) as f64)
            .collect()
    }

    fn angles_from(relative: Vec<f64>, pelvis: Vec<f64>) -> AngleSeries {
        let n = relative.len();
        AngleSeries {
            time: (0..n).map(|i| i as f64 * 0.01).collect(),
            spine_fe: relative.iter().zip(&pelvis).map(|(r, p)| r + p).collect(),
            pelvis_fe: pelvis,
            relative_fe: relative,
        }
    }

    #[test]
    fn test_lordosis_score() {
        assert_eq!(lordosis_score(&[0.0; 10]), 100.0);
        assert_eq!(lordosis_score(&[-1.0, 1.0, 0.0, 2.0]), 50.0);
        assert_eq!(lordosis_score(&[]), 0.0);
    }

    #[test]
    fn test_lordosis_score_monotonic() {
        let mut trace = vec![5.0; 40];
        let mut previous = lordosis_score(&trace);
        for i in 0..trace.len() {
            trace[i] = -1.0;
            let score = lordosis_score(&trace);
            assert!(score >= previous);
            previous = score;
        }
        assert_eq!(previous, 100.0);
    }

    #[test]
    fn test_hip_hinge_saturates() {
        let range = (30.0, 60.0);
        assert_eq!(hip_hinge_score(&ramp(0.0, 60.0, 50), range), 100.0);
        assert_eq!(hip_hinge_score(&ramp(0.0, 85.0, 50), range), 100.0);
        assert_eq!(hip_hinge_score(&ramp(0.0, 30.0, 50), range), 0.0);
        assert_eq!(hip_hinge_score(&ramp(0.0, 10.0, 50), range), 0.0);
        assert_abs_diff_eq!(hip_hinge_score(&ramp(-5.0, 40.0, 50), range), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gradient_matches_numpy() {
        assert_eq!(gradient(&[1.0, 2.0, 4.0, 7.0]), vec![1.0, 1.5, 2.5, 3.0]);
        assert_eq!(gradient(&[3.0]), vec![0.0]);
    }

    #[test]
    fn test_trunk_lean_bounded() {
        let config = ScoringConfig::default();
        for trace in [vec![0.0; 60], ramp(0.0, 90.0, 60), ramp(-30.0, -10.0, 60)] {
            let score = trunk_lean_score(&trace, None, &config);
            assert!((0.0..=100.0).contains(&score), "score = {}", score);
        }
    }

    #[test]
    fn test_trunk_lean_ideal_profile() {
        // Smooth bell peaking at 30° in the middle of the window
        let n = 101;
        let trace: Vec<f64> = (0..n)
            .map(|i| {
                let phase = std::f64::consts::PI * i as f64 / (n - 1) as f64;
                30.0 * phase.sin()
            })
            .collect();
        let parts = TrunkLeanComponents::compute(&trace, None, &ScoringConfig::default());
        assert_eq!(parts.peak_fit, 1.0);
        assert_abs_diff_eq!(parts.timing, 1.0 - 0.5 / 50.5, epsilon = 1e-9);
        assert!(parts.smoothness > 0.99);
    }

    #[test]
    fn test_trunk_lean_rewards_smoothness() {
        let config = ScoringConfig::default();
        let smooth: Vec<f64> = ramp(0.0, 30.0, 60);
        let jittery: Vec<f64> = smooth
            .iter()
            .enumerate()
            .map(|(i, v)| v + if i % 2 == 0 { 2.0 } else { -2.0 })
            .collect();
        let anchor = Some(59);
        assert!(
            trunk_lean_score(&smooth, anchor, &config) > trunk_lean_score(&jittery, anchor, &config)
        );
    }

    #[test]
    fn test_trunk_lean_rewards_timing() {
        let config = ScoringConfig::default();
        let trace = ramp(0.0, 30.0, 60);
        let near = trunk_lean_score(&trace, Some(55), &config);
        let far = trunk_lean_score(&trace, Some(5), &config);
        assert!(near > far);
    }

    #[test]
    fn test_timing_measured_from_seat_off_or_mid_window() {
        let config = ScoringConfig::default();
        let trace: Vec<f64> = (0..60).map(|i| if i == 45 { 30.0 } else { 10.0 }).collect();

        let at_seat_off = TrunkLeanComponents::compute(&trace, Some(45), &config);
        assert_abs_diff_eq!(at_seat_off.timing, 1.0, epsilon = 1e-12);

        // Peak 15 samples after mid-window, half-window is 30
        let mid_window = TrunkLeanComponents::compute(&trace, None, &config);
        assert_abs_diff_eq!(mid_window.timing, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_peak_fit_penalties() {
        let config = ScoringConfig::default();
        let low = TrunkLeanComponents::compute(&[0.0, 10.0, 0.0], None, &config);
        assert_abs_diff_eq!(low.peak_fit, 0.5, epsilon = 1e-12);

        let high = TrunkLeanComponents::compute(&[0.0, 95.0, 0.0], None, &config);
        assert_abs_diff_eq!(high.peak_fit, 0.5, epsilon = 1e-12);

        let slightly_high = TrunkLeanComponents::compute(&[0.0, 55.0, 0.0], None, &config);
        assert_abs_diff_eq!(slightly_high.peak_fit, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_aggregate_mean_and_population_std() {
        let scores = [
            ScoreSet {
                lordosis: 80.0,
                hip_hinge: 50.0,
                trunk_lean: 60.0,
            },
            ScoreSet {
                lordosis: 100.0,
                hip_hinge: 50.0,
                trunk_lean: 70.0,
            },
        ];
        let agg = aggregate(&scores);
        assert_eq!(agg.count, 2);
        assert_eq!(agg.mean.lordosis, 90.0);
        assert_eq!(agg.std.lordosis, 10.0);
        assert_eq!(agg.std.hip_hinge, 0.0);
        assert_eq!(agg.mean.trunk_lean, 65.0);
    }

    #[test]
    fn test_sit_to_stand_excludes_capped_windows() {
        let n = 300;
        let angles = angles_from(vec![-1.0; n], ramp(0.0, 45.0, n));
        let trunk = vec![25.0; n];
        let mut segmentation = segment_repetitions(None, None, n, &SegmentationConfig::default());
        segmentation.windows = vec![
            RepetitionWindow::new(0, 0, 100),
            RepetitionWindow::new(1, 100, 200),
            RepetitionWindow {
                beyond_cap: true,
                ..RepetitionWindow::new(2, 200, 300)
            },
        ];

        let report = analyze_sit_to_stand(&angles, &trunk, &segmentation, None, &ScoringConfig::default());
        assert_eq!(report.repetitions, 2);
        assert_eq!(report.repetition_details.len(), 3);
        assert_eq!(report.scores.lordosis, 100.0);
        assert_eq!(report.segmentation_source, SegmentationSource::WholeTrace);
        assert_abs_diff_eq!(report.pelvic_rotation_data.range, 45.0, epsilon = 1e-9);
        assert_abs_diff_eq!(report.repetition_details[0].start_time, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(report.repetition_details[0].end_time, 0.99, epsilon = 1e-12);
    }

    #[test]
    fn test_seat_off_anchor_applied_per_window() {
        let n = 200;
        let angles = angles_from(vec![0.0; n], vec![0.0; n]);
        let trunk: Vec<f64> = (0..n).map(|i| if i == 150 { 30.0 } else { 10.0 }).collect();
        let mut vertical = vec![0.0; n];
        vertical[150] = 8.0;

        let mut segmentation = segment_repetitions(None, None, n, &SegmentationConfig::default());
        segmentation.windows = vec![RepetitionWindow::new(0, 100, 200)];

        let report = analyze_sit_to_stand(
            &angles,
            &trunk,
            &segmentation,
            Some(&vertical),
            &ScoringConfig::default(),
        );
        let detail = &report.repetition_details[0];
        assert_eq!(detail.window.seat_off_index, Some(150));
        assert_eq!(report.trunk_lean_data.peak, 30.0);
        assert_abs_diff_eq!(report.trunk_lean_data.peak_time, 1.5, epsilon = 1e-12);
    }
}
