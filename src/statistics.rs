//! Descriptive statistics, coordination and distribution analysis.
//!
//! Everything here is a pure function over slices. Indeterminate results
//! (empty input, zero variance) come back as `None` or as a
//! [`ComputationError`] the caller turns into a warning.
//!
//! Standard deviations are population deviations (divide by `n`) throughout,
//! matching what clinicians see in the dashboard plots.

use serde::{Deserialize, Serialize};

use crate::error::ComputationError;
use crate::normality::{shapiro_wilk, NormalityTest};

/// Knobs for the statistics layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Equal-width histogram bins per channel.
    pub histogram_bin_count: usize,
    /// Largest lag (in samples, both directions) for cross-correlation.
    pub cross_correlation_max_lag: usize,
    /// Significance level for the normality decision.
    pub normality_alpha: f64,
    /// z-value for the residual band around the regression line.
    pub confidence_z: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            histogram_bin_count: 20,
            cross_correlation_max_lag: 50,
            normality_alpha: 0.05,
            confidence_z: 1.96,
        }
    }
}

// ============================================================================
// RUNNING MOMENTS
// ============================================================================

/// Single-pass mean, variance and extrema.
///
/// Uses Welford's incremental update for numerical stability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn from_slice(values: &[f64]) -> Self {
        let mut stats = Self::new();
        for &v in values {
            stats.update(v);
        }
        stats
    }

    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;

        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance; 0 for fewer than two samples.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / self.count as f64).max(0.0)
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

// ============================================================================
// PER-CHANNEL SUMMARIES
// ============================================================================

/// Summary of one angle channel, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DescriptiveStats {
    /// Range of motion (max − min).
    pub rom: f64,
    pub mean: f64,
    pub std: f64,
    pub max: f64,
    pub min: f64,
}

/// `None` for an empty slice.
pub fn describe(values: &[f64]) -> Option<DescriptiveStats> {
    let stats = RunningStats::from_slice(values);
    let (min, max) = (stats.min()?, stats.max()?);
    Some(DescriptiveStats {
        rom: max - min,
        mean: stats.mean(),
        std: stats.std_dev(),
        max,
        min,
    })
}

/// Sagittal angular velocity summary (deg/s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VelocityStats {
    pub peak_angular_velocity: f64,
    pub mean_angular_velocity: f64,
    pub rms_angular_velocity: f64,
}

/// Peak |v|, mean |v| and RMS of a gyroscope axis.
pub fn velocity_stats(velocity: &[f64]) -> Option<VelocityStats> {
    if velocity.is_empty() {
        return None;
    }
    let n = velocity.len() as f64;
    let peak = velocity.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let mean_abs = velocity.iter().map(|v| v.abs()).sum::<f64>() / n;
    let rms = (velocity.iter().map(|v| v * v).sum::<f64>() / n).sqrt();

    Some(VelocityStats {
        peak_angular_velocity: peak,
        mean_angular_velocity: mean_abs,
        rms_angular_velocity: rms,
    })
}

/// Jerk summary over the samples where jerk is defined (m/s³).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JerkStats {
    pub peak_jerk: f64,
    pub mean_jerk: f64,
    pub jerk_std: f64,
}

/// Acceleration magnitude summary (m/s²).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccelerationStats {
    pub mean_magnitude: f64,
    pub peak_magnitude: f64,
    /// Population std of the magnitude.
    pub variability: f64,
    pub jerk: Option<JerkStats>,
}

pub fn acceleration_stats(magnitude: &[f64], jerk: &[Option<f64>]) -> Option<AccelerationStats> {
    let moments = RunningStats::from_slice(magnitude);
    let peak = moments.max()?;

    let defined: Vec<f64> = jerk.iter().flatten().copied().collect();
    let jerk = (!defined.is_empty()).then(|| {
        let spread = RunningStats::from_slice(&defined);
        JerkStats {
            peak_jerk: defined.iter().fold(0.0_f64, |acc, j| acc.max(j.abs())),
            mean_jerk: defined.iter().map(|j| j.abs()).sum::<f64>() / defined.len() as f64,
            jerk_std: spread.std_dev(),
        }
    });

    Some(AccelerationStats {
        mean_magnitude: moments.mean(),
        peak_magnitude: peak,
        variability: moments.std_dev(),
        jerk,
    })
}

// ============================================================================
// COORDINATION
// ============================================================================

/// Ordinary least squares fit of `y` on `x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    /// `None` when `y` is constant.
    pub r_squared: Option<f64>,
    /// `None` when `y` is constant.
    pub pearson_r: Option<f64>,
    /// Population std of the residuals.
    pub residual_std: f64,
}

impl Regression {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

pub fn linear_regression(x: &[f64], y: &[f64]) -> Result<Regression, ComputationError> {
    if x.len() != y.len() {
        return Err(ComputationError::LengthMismatch {
            what: "regression",
            left: x.len(),
            right: y.len(),
        });
    }
    if x.len() < 2 {
        return Err(ComputationError::InsufficientSamples {
            what: "regression",
            needed: 2,
            got: x.len(),
        });
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    if sxx <= 0.0 {
        return Err(ComputationError::ZeroVariance { what: "pelvis FE" });
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let pearson_r = (syy > 0.0).then(|| (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0));
    let r_squared = pearson_r.map(|r| r * r);

    let residuals: Vec<f64> = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| yi - (slope * xi + intercept))
        .collect();

    Ok(Regression {
        slope,
        intercept,
        r_squared,
        pearson_r,
        residual_std: RunningStats::from_slice(&residuals).std_dev(),
    })
}

/// Two-point line across the pelvis range, for plotting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionLine {
    pub x: [f64; 2],
    pub y: [f64; 2],
}

/// Residual band around the regression line at the same two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceBand {
    pub upper: [f64; 2],
    pub lower: [f64; 2],
}

/// Share of the combined range of motion contributed by each segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContributionRatio {
    pub spine: f64,
    pub pelvis: f64,
}

/// `None` when neither segment moved.
pub fn contribution_ratio(spine_rom: f64, pelvis_rom: f64) -> Option<ContributionRatio> {
    let total = spine_rom + pelvis_rom;
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    Some(ContributionRatio {
        spine: spine_rom / total,
        pelvis: pelvis_rom / total,
    })
}

/// Normalized cross-correlation over a symmetric lag window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossCorrelation {
    pub lags: Vec<i64>,
    pub correlation: Vec<f64>,
    pub peak_lag: i64,
    pub peak_correlation: f64,
}

/// Correlation of `a[i + lag]` with `b[i]`, both z-scored, divided by `n`.
///
/// The lag window is cut to `n - 1` for short signals. `None` when either
/// signal is constant or the lengths differ.
pub fn cross_correlation(a: &[f64], b: &[f64], max_lag: usize) -> Option<CrossCorrelation> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let sa = RunningStats::from_slice(a);
    let sb = RunningStats::from_slice(b);
    if sa.std_dev() <= 0.0 || sb.std_dev() <= 0.0 {
        return None;
    }

    let n = a.len();
    let za: Vec<f64> = a.iter().map(|v| (v - sa.mean()) / sa.std_dev()).collect();
    let zb: Vec<f64> = b.iter().map(|v| (v - sb.mean()) / sb.std_dev()).collect();

    let max_lag = max_lag.min(n - 1) as i64;
    let mut lags = Vec::with_capacity((2 * max_lag + 1) as usize);
    let mut correlation = Vec::with_capacity(lags.capacity());

    for lag in -max_lag..=max_lag {
        let mut sum = 0.0;
        for (i, zb_i) in zb.iter().enumerate() {
            let j = i as i64 + lag;
            if j >= 0 && (j as usize) < n {
                sum += za[j as usize] * zb_i;
            }
        }
        lags.push(lag);
        correlation.push(sum / n as f64);
    }

    let mut peak = 0;
    for (i, c) in correlation.iter().enumerate() {
        if c.abs() > correlation[peak].abs() {
            peak = i;
        }
    }

    Some(CrossCorrelation {
        peak_lag: lags[peak],
        peak_correlation: correlation[peak],
        lags,
        correlation,
    })
}

/// Spine-pelvis coordination block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coordination {
    pub r_squared: Option<f64>,
    pub pearson_r: Option<f64>,
    pub slope: Option<f64>,
    pub intercept: Option<f64>,
    pub regression_line: Option<RegressionLine>,
    pub confidence_interval: Option<ConfidenceBand>,
    pub contribution_ratio: Option<ContributionRatio>,
    pub cross_correlation: Option<CrossCorrelation>,
}

/// Coordination of `spine_fe` against `pelvis_fe`.
///
/// A degenerate regression leaves the regression fields empty and is
/// reported through the returned warning list.
pub fn coordination(
    spine_fe: &[f64],
    pelvis_fe: &[f64],
    config: &StatisticsConfig,
) -> (Coordination, Vec<ComputationError>) {
    let mut issues = Vec::new();

    let contribution = match (describe(spine_fe), describe(pelvis_fe)) {
        (Some(spine), Some(pelvis)) => contribution_ratio(spine.rom, pelvis.rom),
        _ => None,
    };

    let mut block = Coordination {
        r_squared: None,
        pearson_r: None,
        slope: None,
        intercept: None,
        regression_line: None,
        confidence_interval: None,
        contribution_ratio: contribution,
        cross_correlation: cross_correlation(
            spine_fe,
            pelvis_fe,
            config.cross_correlation_max_lag,
        ),
    };

    match linear_regression(pelvis_fe, spine_fe) {
        Ok(fit) => {
            let pelvis = RunningStats::from_slice(pelvis_fe);
            let x = [
                pelvis.min().unwrap_or_default(),
                pelvis.max().unwrap_or_default(),
            ];
            let y = [fit.predict(x[0]), fit.predict(x[1])];
            let half_width = config.confidence_z * fit.residual_std;

            block.r_squared = fit.r_squared;
            block.pearson_r = fit.pearson_r;
            block.slope = Some(fit.slope);
            block.intercept = Some(fit.intercept);
            block.regression_line = Some(RegressionLine { x, y });
            block.confidence_interval = Some(ConfidenceBand {
                upper: [y[0] + half_width, y[1] + half_width],
                lower: [y[0] - half_width, y[1] - half_width],
            });
        }
        Err(err) => issues.push(err),
    }

    (block, issues)
}

// ============================================================================
// DISTRIBUTION
// ============================================================================

/// Equal-width histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `bins + 1` edges.
    pub bin_edges: Vec<f64>,
    pub counts: Vec<usize>,
}

/// Histogram with numpy semantics.
///
/// Bins are half-open except the last, which also takes the maximum. A
/// constant signal gets the range `[v - 0.5, v + 0.5]`.
pub fn histogram(values: &[f64], bins: usize) -> Histogram {
    let bins = bins.max(1);
    let stats = RunningStats::from_slice(values);
    let (mut lo, mut hi) = match (stats.min(), stats.max()) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => (0.0, 1.0),
    };
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = hi - lo;
    let bin_edges: Vec<f64> = (0..=bins)
        .map(|i| lo + width * i as f64 / bins as f64)
        .collect();

    let mut counts = vec![0usize; bins];
    for &v in values {
        let position = ((v - lo) / width * bins as f64).floor();
        let index = if position < 0.0 {
            0
        } else {
            (position as usize).min(bins - 1)
        };
        counts[index] += 1;
    }

    Histogram { bin_edges, counts }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quartiles {
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
}

/// Percentile by linear interpolation between closest ranks.
///
/// `sorted` must be ascending and non-empty; `p` is in [0, 100].
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let position = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

pub fn quartiles(values: &[f64]) -> Option<Quartiles> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(Quartiles {
        q25: percentile_sorted(&sorted, 25.0),
        q50: percentile_sorted(&sorted, 50.0),
        q75: percentile_sorted(&sorted, 75.0),
    })
}

/// Histogram, quartiles and normality test for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub histogram: Histogram,
    pub quartiles: Option<Quartiles>,
    pub normality_test: NormalityTest,
}

pub fn distribution(values: &[f64], config: &StatisticsConfig) -> Distribution {
    Distribution {
        histogram: histogram(values, config.histogram_bin_count),
        quartiles: quartiles(values),
        normality_test: NormalityTest::decide(shapiro_wilk(values), config.normality_alpha),
    }
}
