//! Repetition segmentation for cyclic exercises.
//!
//! This module splits a recording into movement cycles (one sit-to-stand
//! each) using the acceleration magnitude of the pelvis sensor, falling back
//! to the spine sensor.
//!
//! Design: explicit two-state automaton
//! - `Idle`: waiting for the signal to rise above the onset threshold
//! - `InMotion`: inside a repetition, with a debounce counter that must run
//!   for `debounce_samples` consecutive quiet samples before the repetition
//!   is closed
//!
//! The threshold adapts to each recording and is estimated from its quiet
//! part only: the samples at or below the `quiet_quantile` of the signal.
//! Baseline is the median of those samples, noise their scaled median
//! absolute deviation, and the onset is
//! `baseline + max(onset_threshold × noise, min_onset_delta)`. The floor keeps
//! perfectly still baselines (noise = 0) from triggering on rounding. Motion
//! may fill most of the recording; only the rests need to reach the quantile.
//!
//! Windows are half-open `[start, end)`: `start` is the first sample above the
//! threshold, `end` is the first sample of the quiet run that closed it.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::RepetitionWindow;

/// Scale factor that turns MAD into a standard-deviation estimate for
/// normally distributed noise.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Configuration for repetition segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Onset multiplier applied to the noise estimate.
    pub onset_threshold: f64,

    /// Smallest distance between baseline and threshold (m/s²).
    pub min_onset_delta: f64,

    /// Share of the signal, lowest values first, treated as rest when
    /// estimating the baseline and noise.
    pub quiet_quantile: f64,

    /// Consecutive quiet samples that end a repetition.
    pub debounce_samples: usize,

    /// Repetitions shorter than this are treated as noise.
    pub min_repetition_samples: usize,

    /// Repetitions past this count are reported but not aggregated.
    pub max_repetitions: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            onset_threshold: 3.0,
            min_onset_delta: 0.5,
            quiet_quantile: 0.2,
            debounce_samples: 10,
            min_repetition_samples: 20,
            max_repetitions: 20,
        }
    }
}

/// Adaptive onset threshold derived from one signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OnsetThreshold {
    /// Median of the quiet samples.
    pub baseline: f64,
    /// Scaled MAD of the quiet samples.
    pub noise: f64,
    pub threshold: f64,
}

impl OnsetThreshold {
    /// `None` for an empty signal.
    pub fn estimate(signal: &[f64], config: &SegmentationConfig) -> Option<Self> {
        let quiet = quiet_samples(signal, config.quiet_quantile);
        let baseline = median(&quiet)?;
        let deviations: Vec<f64> = quiet.iter().map(|v| (v - baseline).abs()).collect();
        let noise = MAD_TO_SIGMA * median(&deviations)?;
        let threshold =
            baseline + (config.onset_threshold * noise).max(config.min_onset_delta);

        Some(Self {
            baseline,
            noise,
            threshold,
        })
    }
}

/// Samples at or below the `quantile` of the signal (linear interpolation),
/// in ascending order.
fn quiet_samples(signal: &[f64], quantile: f64) -> Vec<f64> {
    let mut sorted = signal.to_vec();
    sorted.sort_by(f64::total_cmp);
    if sorted.is_empty() {
        return sorted;
    }

    let position = quantile.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let cutoff = sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64);

    let quiet = sorted.partition_point(|&v| v <= cutoff);
    sorted.truncate(quiet.max(1));
    sorted
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Automaton state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MotionState {
    Idle,
    InMotion {
        /// First sample above the threshold.
        start: usize,
        /// Consecutive quiet samples seen so far.
        dwell: usize,
        /// First sample of the current quiet run.
        dwell_start: usize,
    },
}

/// Streaming repetition detector.
///
/// Feed samples in order with [`process_sample`](Self::process_sample), then
/// call [`finish`](Self::finish) to close a repetition still open at the end.
pub struct RepetitionDetector {
    threshold: f64,
    debounce_samples: usize,
    state: MotionState,
    index: usize,
}

impl RepetitionDetector {
    pub fn new(threshold: f64, config: &SegmentationConfig) -> Self {
        Self {
            threshold,
            debounce_samples: config.debounce_samples.max(1),
            state: MotionState::Idle,
            index: 0,
        }
    }

    /// Advance by one sample. Returns a `(start, end)` pair when a
    /// repetition closes on this sample.
    pub fn process_sample(&mut self, value: f64) -> Option<(usize, usize)> {
        let i = self.index;
        self.index += 1;
        let above = value > self.threshold;

        match self.state {
            MotionState::Idle => {
                if above {
                    self.state = MotionState::InMotion {
                        start: i,
                        dwell: 0,
                        dwell_start: i,
                    };
                }
                None
            }
            MotionState::InMotion { start, .. } if above => {
                self.state = MotionState::InMotion {
                    start,
                    dwell: 0,
                    dwell_start: i,
                };
                None
            }
            MotionState::InMotion {
                start,
                dwell,
                dwell_start,
            } => {
                let dwell_start = if dwell == 0 { i } else { dwell_start };
                let dwell = dwell + 1;
                if dwell >= self.debounce_samples {
                    self.state = MotionState::Idle;
                    Some((start, dwell_start))
                } else {
                    self.state = MotionState::InMotion {
                        start,
                        dwell,
                        dwell_start,
                    };
                    None
                }
            }
        }
    }

    /// Close a repetition left open at end of signal: at the pending quiet
    /// run if one started, otherwise at the signal end.
    pub fn finish(&mut self) -> Option<(usize, usize)> {
        let closed = match self.state {
            MotionState::Idle => None,
            MotionState::InMotion {
                start,
                dwell,
                dwell_start,
            } => Some((start, if dwell > 0 { dwell_start } else { self.index })),
        };
        self.state = MotionState::Idle;
        closed
    }

    pub fn is_in_motion(&self) -> bool {
        matches!(self.state, MotionState::InMotion { .. })
    }
}

/// Which signal the windows came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationSource {
    PelvisAcceleration,
    SpineAcceleration,
    /// No usable segmentation; the whole recording is one window.
    WholeTrace,
}

/// Why the whole-trace fallback was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    NoAccelerationChannel,
    NoRepetitionsDetected,
}

/// Output of one segmentation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub windows: Vec<RepetitionWindow>,
    pub source: SegmentationSource,
    pub threshold: Option<OnsetThreshold>,
    /// Candidate windows dropped for being too short.
    pub rejected: usize,
    pub fallback: Option<FallbackReason>,
}

impl Segmentation {
    /// Windows that count towards the aggregate.
    pub fn counted(&self) -> impl Iterator<Item = &RepetitionWindow> {
        self.windows.iter().filter(|w| !w.beyond_cap)
    }

    pub fn capped_count(&self) -> usize {
        self.windows.iter().filter(|w| w.beyond_cap).count()
    }

    fn whole_trace(
        len: usize,
        reason: FallbackReason,
        threshold: Option<OnsetThreshold>,
        rejected: usize,
    ) -> Self {
        Self {
            windows: vec![RepetitionWindow::new(0, 0, len)],
            source: SegmentationSource::WholeTrace,
            threshold,
            rejected,
            fallback: Some(reason),
        }
    }
}

/// Detect repetition windows in an acceleration magnitude signal.
///
/// Returns the accepted windows, the threshold used and the number of
/// candidates rejected as too short.
pub fn detect_windows(
    signal: &[f64],
    config: &SegmentationConfig,
) -> (Vec<RepetitionWindow>, Option<OnsetThreshold>, usize) {
    let Some(threshold) = OnsetThreshold::estimate(signal, config) else {
        return (Vec::new(), None, 0);
    };
    debug!(
        baseline = threshold.baseline,
        noise = threshold.noise,
        threshold = threshold.threshold,
        "segmentation threshold"
    );

    let mut detector = RepetitionDetector::new(threshold.threshold, config);
    let mut spans = Vec::new();
    for &value in signal {
        if let Some(span) = detector.process_sample(value) {
            spans.push(span);
        }
    }
    spans.extend(detector.finish());

    let mut windows = Vec::new();
    let mut rejected = 0;
    for (start, end) in spans {
        if end - start < config.min_repetition_samples {
            rejected += 1;
            continue;
        }
        let mut window = RepetitionWindow::new(windows.len(), start, end);
        window.beyond_cap = windows.len() >= config.max_repetitions;
        windows.push(window);
    }

    let capped = windows.iter().filter(|w| w.beyond_cap).count();
    if capped > 0 {
        warn!(
            detected = windows.len(),
            cap = config.max_repetitions,
            "repetitions beyond cap excluded from aggregate"
        );
    }

    (windows, Some(threshold), rejected)
}

/// Segment the synchronized recording.
///
/// Prefers the pelvis magnitude; uses the spine magnitude when the pelvis has
/// no acceleration channel. Falls back to one whole-trace window when neither
/// has acceleration or nothing was detected.
pub fn segment_repetitions(
    pelvis_magnitude: Option<&[f64]>,
    spine_magnitude: Option<&[f64]>,
    len: usize,
    config: &SegmentationConfig,
) -> Segmentation {
    let (signal, source) = match (pelvis_magnitude, spine_magnitude) {
        (Some(pelvis), _) => (pelvis, SegmentationSource::PelvisAcceleration),
        (None, Some(spine)) => (spine, SegmentationSource::SpineAcceleration),
        (None, None) => {
            warn!("no acceleration channel, scoring the whole recording as one repetition");
            return Segmentation::whole_trace(
                len,
                FallbackReason::NoAccelerationChannel,
                None,
                0,
            );
        }
    };

    let signal = &signal[..signal.len().min(len)];
    let (windows, threshold, rejected) = detect_windows(signal, config);

    if windows.is_empty() {
        warn!(rejected, "no repetitions detected, scoring the whole recording");
        return Segmentation::whole_trace(
            len,
            FallbackReason::NoRepetitionsDetected,
            threshold,
            rejected,
        );
    }

    debug!(count = windows.len(), rejected, ?source, "repetitions detected");
    Segmentation {
        windows,
        source,
        threshold,
        rejected,
        fallback: None,
    }
}

/// Index of the largest |vertical acceleration| inside the window.
///
/// This is the seat-off instant of a sit-to-stand. Ties keep the earliest
/// sample. `None` if the window falls outside the signal.
pub fn seat_off_index(vertical_acceleration: &[f64], window: &RepetitionWindow) -> Option<usize> {
    let end = window.end_index.min(vertical_acceleration.len());
    if window.start_index >= end {
        return None;
    }

    let mut best = window.start_index;
    for i in window.start_index..end {
        if vertical_acceleration[i].abs() > vertical_acceleration[best].abs() {
            best = i;
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn bursts(len: usize, spans: &[(usize, usize)], level: f64) -> Vec<f64> {
        let mut signal = vec![0.0; len];
        for &(start, end) in spans {
            for v in &mut signal[start..end] {
                *v = level;
            }
        }
        signal
    }

    #[test]
    fn test_segmentation_config_default() {
        let config = SegmentationConfig::default();
        assert_eq!(config.onset_threshold, 3.0);
        assert_eq!(config.debounce_samples, 10);
        assert_eq!(config.max_repetitions, 20);
    }

    #[test]
    fn test_threshold_floor_on_flat_baseline() {
        let config = SegmentationConfig::default();
        let t = OnsetThreshold::estimate(&[1.0; 50], &config).unwrap();
        assert_eq!(t.baseline, 1.0);
        assert_eq!(t.noise, 0.0);
        assert_abs_diff_eq!(t.threshold, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_threshold_scales_with_quiet_noise() {
        let config = SegmentationConfig::default();
        // 0..=9 ten times each; the lowest 20% cuts at 1.8, leaving the 0s and 1s
        let signal: Vec<f64> = (0..100).map(|i| (i % 10) as f64).collect();
        let t = OnsetThreshold::estimate(&signal, &config).unwrap();
        assert_abs_diff_eq!(t.baseline, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(t.noise, 0.5 * 1.4826, epsilon = 1e-12);
        assert_abs_diff_eq!(t.threshold, 0.5 + 3.0 * 0.5 * 1.4826, epsilon = 1e-12);
    }

    #[test]
    fn test_threshold_ignores_motion_level() {
        // Motion fills two thirds of the recording
        let signal = bursts(300, &[(20, 120), (140, 240)], 5.0);
        let t = OnsetThreshold::estimate(&signal, &SegmentationConfig::default()).unwrap();
        assert_eq!(t.baseline, 0.0);
        assert_eq!(t.noise, 0.0);
        assert_abs_diff_eq!(t.threshold, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_two_clean_bursts() {
        let signal = bursts(300, &[(50, 100), (180, 230)], 5.0);
        let seg = segment_repetitions(Some(&signal), None, 300, &SegmentationConfig::default());

        assert_eq!(seg.source, SegmentationSource::PelvisAcceleration);
        assert_eq!(seg.windows.len(), 2);
        assert_eq!(seg.windows[0].range(), 50..100);
        assert_eq!(seg.windows[1].range(), 180..230);
        assert_eq!(seg.windows[1].index, 1);
        assert!(seg.fallback.is_none());
    }

    #[test]
    fn test_bursts_longer_than_rests() {
        let signal = bursts(300, &[(20, 120), (140, 240)], 5.0);
        let seg = segment_repetitions(Some(&signal), None, 300, &SegmentationConfig::default());

        assert!(seg.fallback.is_none());
        assert_eq!(seg.source, SegmentationSource::PelvisAcceleration);
        let ranges: Vec<_> = seg.windows.iter().map(|w| w.range()).collect();
        assert_eq!(ranges, vec![20..120, 140..240]);
    }

    #[test]
    fn test_noisy_bursts_longer_than_rests() {
        // Three 90-sample rises around 3 m/s² separated by 40-sample rests,
        // all over a jittery 0.1 m/s² floor
        let mut signal = Vec::new();
        for rep in 0..3 {
            for k in 0..40 {
                signal.push(0.1 + 0.05 * ((k + rep) % 3) as f64);
            }
            for k in 0..90 {
                let phase = std::f64::consts::PI * (k as f64 + 0.5) / 90.0;
                signal.push(1.0 + 2.5 * phase.sin() + 0.1 * (k % 2) as f64);
            }
        }
        signal.extend(std::iter::repeat(0.1).take(40));

        let seg = segment_repetitions(
            Some(&signal),
            None,
            signal.len(),
            &SegmentationConfig::default(),
        );
        assert!(seg.fallback.is_none());
        let ranges: Vec<_> = seg.windows.iter().map(|w| w.range()).collect();
        assert_eq!(ranges, vec![40..130, 170..260, 300..390]);
    }

    #[test]
    fn test_short_dip_does_not_split_repetition() {
        // 5-sample dip is shorter than the debounce
        let signal = bursts(200, &[(40, 70), (75, 110)], 5.0);
        let seg = segment_repetitions(Some(&signal), None, 200, &SegmentationConfig::default());
        assert_eq!(seg.windows.len(), 1);
        assert_eq!(seg.windows[0].range(), 40..110);
    }

    #[test]
    fn test_short_blip_rejected() {
        let signal = bursts(200, &[(20, 25), (100, 140)], 5.0);
        let seg = segment_repetitions(Some(&signal), None, 200, &SegmentationConfig::default());
        assert_eq!(seg.windows.len(), 1);
        assert_eq!(seg.windows[0].range(), 100..140);
        assert_eq!(seg.rejected, 1);
    }

    #[test]
    fn test_open_motion_closes_at_signal_end() {
        let mut detector = RepetitionDetector::new(0.5, &SegmentationConfig::default());
        for i in 0..60 {
            let value = if i >= 30 { 5.0 } else { 0.0 };
            assert!(detector.process_sample(value).is_none());
        }
        assert!(detector.is_in_motion());
        assert_eq!(detector.finish(), Some((30, 60)));
        assert!(!detector.is_in_motion());
    }

    #[test]
    fn test_open_motion_closes_at_pending_dwell() {
        let mut detector = RepetitionDetector::new(0.5, &SegmentationConfig::default());
        for i in 0..45 {
            let value = if (10..40).contains(&i) { 5.0 } else { 0.0 };
            assert!(detector.process_sample(value).is_none());
        }
        assert_eq!(detector.finish(), Some((10, 40)));
    }

    #[test]
    fn test_repetitions_beyond_cap_flagged() {
        let spans: Vec<(usize, usize)> = (0..23).map(|k| (20 + k * 60, 50 + k * 60)).collect();
        let signal = bursts(23 * 60 + 40, &spans, 5.0);
        let seg = segment_repetitions(Some(&signal), None, signal.len(), &SegmentationConfig::default());

        assert_eq!(seg.windows.len(), 23);
        assert_eq!(seg.counted().count(), 20);
        assert_eq!(seg.capped_count(), 3);
        assert!(seg.windows[20].beyond_cap);
        assert!(!seg.windows[19].beyond_cap);
    }

    #[test]
    fn test_spine_fallback_source() {
        let signal = bursts(300, &[(50, 100)], 5.0);
        let seg = segment_repetitions(None, Some(&signal), 300, &SegmentationConfig::default());
        assert_eq!(seg.source, SegmentationSource::SpineAcceleration);
        assert_eq!(seg.windows.len(), 1);
    }

    #[test]
    fn test_whole_trace_fallbacks() {
        let config = SegmentationConfig::default();

        let seg = segment_repetitions(None, None, 150, &config);
        assert_eq!(seg.source, SegmentationSource::WholeTrace);
        assert_eq!(seg.fallback, Some(FallbackReason::NoAccelerationChannel));
        assert_eq!(seg.windows[0].range(), 0..150);

        let flat = vec![9.81; 150];
        let seg = segment_repetitions(Some(&flat), None, 150, &config);
        assert_eq!(seg.fallback, Some(FallbackReason::NoRepetitionsDetected));
        assert_eq!(seg.windows.len(), 1);
        assert_eq!(seg.windows[0].range(), 0..150);
    }

    #[test]
    fn test_seat_off_is_peak_absolute_vertical() {
        let mut vertical = vec![0.0; 100];
        vertical[30] = 3.0;
        vertical[42] = -4.5;
        let window = RepetitionWindow::new(0, 20, 60);
        assert_eq!(seat_off_index(&vertical, &window), Some(42));

        let outside = RepetitionWindow::new(0, 120, 140);
        assert_eq!(seat_off_index(&vertical, &outside), None);
    }
}
