//! End-to-end analysis of one spine/pelvis recording pair.
//!
//! This module orchestrates the full data flow from two uploaded CSV files to
//! the response model:
//! 1. **Ingestion**: validate both uploads and parse them into sensor traces
//! 2. **Synchronization**: truncate to a common length, build FE angle series
//! 3. **Derived signals**: gyroscope axes, acceleration magnitude, jerk
//! 4. **Statistics**: descriptive, coordination and distribution analysis
//! 5. **Repetitions** (sit-to-stand only): segmentation and scoring
//!
//! Only input validation and a missing angle series fail the request. Any
//! other sub-result that cannot be computed is left empty and explained in
//! `data.warnings`.
//!
//! Each request is processed independently: nothing is cached between calls
//! and the same input always yields byte-identical output.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::export::{
    AccelerationSeries, AnalysisData, AnalysisResponse, ChannelStatistics, DistributionBlock,
    GyroSeries, RequestMetadata, SegmentPair, StatisticsBlock, TimeSeries,
};
use crate::ingest::{parse_upload, ParsedTrace};
use crate::scoring::analyze_sit_to_stand;
use crate::segmentation::{segment_repetitions, FallbackReason};
use crate::signal::{DerivedSignals, SegmentSignals, SynchronizedPair};
use crate::statistics::{
    acceleration_stats, coordination, describe, distribution, velocity_stats, AccelerationStats,
};
use crate::types::{ChannelSet, ExerciseType, SensorRole, TraceMetadata};

/// One uploaded file: its original name and raw content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvInput {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl CsvInput {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, keeping only its file name.
    pub fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { file_name, bytes })
    }
}

/// A complete analysis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub spine: CsvInput,
    pub pelvis: CsvInput,
    pub exercise: ExerciseType,
}

/// Stateless analysis engine bound to one configuration.
#[derive(Debug, Clone, Default)]
pub struct AnalysisPipeline {
    config: AnalysisConfig,
}

impl AnalysisPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the request and wrap the outcome in a response.
    pub fn run(&self, request: &AnalysisRequest) -> AnalysisResponse {
        match self.analyze(request) {
            Ok(data) => AnalysisResponse::success(data),
            Err(err) => {
                warn!(error = %err, "analysis failed");
                AnalysisResponse::error(err.to_string(), err.code())
            }
        }
    }

    /// Render a response with the configured precision.
    pub fn render(&self, response: &AnalysisResponse, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            response.to_json(self.config.output_decimals)
        } else {
            response.to_compact_json(self.config.output_decimals)
        }
    }

    /// Parse one upload and report its recording summary.
    pub fn inspect(&self, role: SensorRole, input: &CsvInput) -> Result<TraceMetadata> {
        let parsed = self.parse(role, input)?;
        for note in &parsed.warnings {
            warn!(role = %role, "{}", note);
        }
        Ok(parsed.trace.metadata())
    }

    fn parse(&self, role: SensorRole, input: &CsvInput) -> Result<ParsedTrace> {
        parse_upload(role, &input.file_name, &input.bytes, &self.config.ingest)
            .map_err(|source| AnalysisError::input(role, source))
    }

    /// Run every analysis stage.
    pub fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisData> {
        let spine = self.parse(SensorRole::Spine, &request.spine)?;
        let pelvis = self.parse(SensorRole::Pelvis, &request.pelvis)?;

        // Ingestion notes already carry their role prefix.
        let mut warnings: Vec<String> = spine.warnings.clone();
        warnings.extend(pelvis.warnings.iter().cloned());

        // Synchronization
        let pair = SynchronizedPair::truncate(&spine.trace, &pelvis.trace);
        if spine.trace.len() != pelvis.trace.len() {
            warnings.push(format!(
                "Recordings differ in length (spine {}, pelvis {}); both truncated to {} samples",
                spine.trace.len(),
                pelvis.trace.len(),
                pair.len()
            ));
        }
        let angles = pair.angle_series()?;
        let derived = DerivedSignals::from_pair(&pair);

        for (role, signals) in [
            (SensorRole::Spine, &derived.spine),
            (SensorRole::Pelvis, &derived.pelvis),
        ] {
            note_missing_channels(role, signals, &mut warnings);
        }

        // Statistics
        let stats_config = &self.config.statistics;
        let (coordination_block, issues) =
            coordination(&angles.spine_fe, &angles.pelvis_fe, stats_config);
        for issue in issues {
            warn!(%issue, "coordination degraded");
            warnings.push(format!("Coordination: {issue}"));
        }

        let statistics = StatisticsBlock {
            spine: channel_statistics(&angles.spine_fe, &derived.spine),
            pelvis: channel_statistics(&angles.pelvis_fe, &derived.pelvis),
            relative: ChannelStatistics {
                angles: describe(&angles.relative_fe).unwrap_or_default(),
                velocity: None,
            },
            acceleration: SegmentPair {
                spine: segment_acceleration_stats(&derived.spine),
                pelvis: segment_acceleration_stats(&derived.pelvis),
            },
            coordination: coordination_block,
            distribution: DistributionBlock {
                spine: distribution(&angles.spine_fe, stats_config),
                pelvis: distribution(&angles.pelvis_fe, stats_config),
                relative: distribution(&angles.relative_fe, stats_config),
            },
        };

        // Repetitions
        let sit_to_stand_analysis = if request.exercise.has_repetition_scoring() {
            let segmentation = segment_repetitions(
                derived.pelvis.accel_magnitude.as_deref(),
                derived.spine.accel_magnitude.as_deref(),
                angles.len(),
                &self.config.segmentation,
            );
            match segmentation.fallback {
                Some(FallbackReason::NoAccelerationChannel) => warnings.push(
                    "No acceleration channel; the whole recording was scored as one repetition"
                        .to_string(),
                ),
                Some(FallbackReason::NoRepetitionsDetected) => warnings.push(
                    "No repetitions detected; the whole recording was scored as one repetition"
                        .to_string(),
                ),
                None => {}
            }
            let capped = segmentation.capped_count();
            if capped > 0 {
                warnings.push(format!(
                    "{} repetitions detected; only the first {} are included in the aggregate scores",
                    segmentation.windows.len(),
                    self.config.segmentation.max_repetitions
                ));
            }

            let trunk_lean = pair.trunk_lean();
            let seat_off = seat_off_signal(&derived.pelvis, pair.pelvis_channels());
            Some(analyze_sit_to_stand(
                &angles,
                &trunk_lean,
                &segmentation,
                seat_off,
                &self.config.scoring,
            ))
        } else {
            debug!(exercise = ?request.exercise, "no repetition scoring for this exercise");
            None
        };

        let synced = TraceMetadata::from_timestamps(pair.spine().iter().map(|s| s.timestamp));
        let metadata = RequestMetadata {
            duration_sec: synced.duration_sec,
            total_samples: synced.total_samples,
            sample_rate: synced.sample_rate,
            spine_file: request.spine.file_name.clone(),
            pelvis_file: request.pelvis.file_name.clone(),
            spine_samples: spine.trace.len(),
            pelvis_samples: pelvis.trace.len(),
            exercise: request.exercise,
        };

        info!(
            samples = metadata.total_samples,
            duration_sec = metadata.duration_sec,
            exercise = ?request.exercise,
            warnings = warnings.len(),
            "analysis complete"
        );

        Ok(AnalysisData {
            angular_velocity: SegmentPair {
                spine: derived.spine.angular_velocity.as_ref().map(GyroSeries::from),
                pelvis: derived.pelvis.angular_velocity.as_ref().map(GyroSeries::from),
            },
            acceleration: SegmentPair {
                spine: AccelerationSeries::from_signals(&derived.spine),
                pelvis: AccelerationSeries::from_signals(&derived.pelvis),
            },
            time_series: TimeSeries::from(angles),
            statistics,
            sit_to_stand_analysis,
            metadata,
            warnings,
        })
    }
}

/// Analyze with an explicit configuration.
pub fn analyze(request: &AnalysisRequest, config: &AnalysisConfig) -> Result<AnalysisData> {
    AnalysisPipeline::new(config.clone()).analyze(request)
}

fn channel_statistics(angles: &[f64], signals: &SegmentSignals) -> ChannelStatistics {
    ChannelStatistics {
        angles: describe(angles).unwrap_or_default(),
        // Gyr_Y is the sagittal axis
        velocity: signals
            .angular_velocity
            .as_ref()
            .and_then(|gyro| velocity_stats(&gyro.y)),
    }
}

fn segment_acceleration_stats(signals: &SegmentSignals) -> Option<AccelerationStats> {
    let magnitude = signals.accel_magnitude.as_deref()?;
    let jerk = signals.jerk.as_deref().unwrap_or_default();
    acceleration_stats(magnitude, jerk)
}

/// Signal whose peak |value| marks seat-off.
///
/// Free acceleration is earth framed, so its Z axis is vertical. Raw
/// accelerometer axes follow the sensor, so the magnitude is used instead.
fn seat_off_signal(signals: &SegmentSignals, channels: ChannelSet) -> Option<&[f64]> {
    if channels.free_acceleration {
        signals.acceleration.as_ref().map(|a| a.z.as_slice())
    } else {
        signals.accel_magnitude.as_deref()
    }
}

fn note_missing_channels(role: SensorRole, signals: &SegmentSignals, warnings: &mut Vec<String>) {
    if signals.angular_velocity.is_none() {
        debug!(%role, "no gyroscope channel");
        warnings.push(format!(
            "{role}: no gyroscope channel; angular velocity statistics omitted"
        ));
    }
    if signals.acceleration.is_none() {
        debug!(%role, "no acceleration channel");
        warnings.push(format!(
            "{role}: no acceleration channel; acceleration and jerk omitted"
        ));
    }
}
