//! Lumbar Motion Analysis Library
//!
//! An analysis engine that turns two body-worn IMU recordings (lumbar spine
//! and pelvis, Movella DOT CSV exports) into clinically interpretable movement
//! metrics for lower-back-pain rehabilitation.
//!
//! # Design Philosophy
//!
//! - **Pure over its inputs**: every request is analyzed from scratch; nothing
//!   is cached, no global state, and identical input gives identical output.
//! - **Fail loud on input, degrade on computation**: invalid uploads are
//!   rejected with a precise reason; statistics that are merely undefined
//!   (constant signals, zero variance) become `null` plus a warning.
//! - **Sensor channels over derivatives**: angular velocity and acceleration
//!   come from the gyroscope and accelerometer, never from differentiating
//!   the angle.
//!
//! # Layers
//!
//! | module | role |
//! |---|---|
//! | [`ingest`] | locate the header, parse rows, enforce trace invariants |
//! | [`orientation`] | quaternion → sagittal pitch, zero-reference policies |
//! | [`signal`] | truncation sync, FE series, acceleration magnitude and jerk |
//! | [`statistics`], [`normality`] | descriptive, coordination, distribution |
//! | [`segmentation`], [`scoring`] | repetition windows and quality scores |
//! | [`pipeline`], [`export`] | orchestration and the JSON response |
//!
//! # Example
//!
//! ```no_run
//! use lumbar_motion::{AnalysisConfig, AnalysisPipeline, AnalysisRequest, CsvInput, ExerciseType};
//!
//! let request = AnalysisRequest {
//!     spine: CsvInput::from_path("spine.csv")?,
//!     pelvis: CsvInput::from_path("pelvis.csv")?,
//!     exercise: ExerciseType::SitToStand,
//! };
//!
//! let pipeline = AnalysisPipeline::new(AnalysisConfig::default());
//! let response = pipeline.run(&request);
//! println!("{}", pipeline.render(&response, true)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod normality;
pub mod orientation;
pub mod pipeline;
pub mod scoring;
pub mod segmentation;
pub mod signal;
pub mod statistics;
pub mod types;



// Re-export commonly used types
pub use config::AnalysisConfig;
pub use error::{AnalysisError, ComputationError, ConfigError, Result, ValidationError};
pub use export::{AnalysisData, AnalysisResponse, ResponseStatus};
pub use orientation::{Quaternion, ZeroReference};
pub use pipeline::{analyze, AnalysisPipeline, AnalysisRequest, CsvInput};
pub use types::{
    AggregateScores, AngleSeries, ExerciseType, RawSample, RepetitionWindow, ScoreSet,
    SensorRole, SensorTrace, TraceMetadata,
};
