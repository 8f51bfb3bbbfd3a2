//! Error taxonomy for the analysis engine.
//!
//! - [`ValidationError`]: one input file is unusable. Surfaced verbatim to the
//!   caller with a stable code, never retried.
//! - [`ComputationError`]: a sub-result could not be computed. The pipeline
//!   turns these into `null` fields plus a warning instead of failing.
//! - [`AnalysisError`]: the request as a whole failed.

use crate::types::SensorRole;

/// Common result type for engine operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Reasons a single CSV upload is rejected.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid file format for '{file_name}'. Please upload a CSV file")]
    InvalidExtension { file_name: String },

    #[error("File too large ({size} bytes). Maximum size is {limit} bytes")]
    FileTooLarge { size: usize, limit: usize },

    #[error("Missing required columns: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("Insufficient data. Minimum {required} rows required, found {found}")]
    InsufficientRows { required: usize, found: usize },

    #[error("Invalid quaternion at line {line}: |q| = {norm:.4} is outside 1 ± {tolerance}")]
    QuaternionNorm { line: usize, norm: f64, tolerance: f64 },

    #[error("Timestamps go backwards at line {line}")]
    NonMonotonicTimestamps { line: usize },

    #[error("Could not locate a header row containing SampleTimeFine and Quat_W/X/Y/Z")]
    HeaderNotFound,

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
}

impl ValidationError {
    /// Stable code shown next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidExtension { .. } => "E001",
            ValidationError::FileTooLarge { .. } => "E002",
            ValidationError::MissingColumns { .. } => "E003",
            ValidationError::InsufficientRows { .. } => "E004",
            ValidationError::QuaternionNorm { .. } => "E005",
            ValidationError::NonMonotonicTimestamps { .. } => "E006",
            ValidationError::HeaderNotFound => "E007",
            ValidationError::Csv(_) => "E008",
        }
    }
}

/// A sub-result that could not be produced. Never fatal on its own.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputationError {
    #[error("{what}: length mismatch ({left} vs {right})")]
    LengthMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },

    #[error("{what}: zero variance, regression is undefined")]
    ZeroVariance { what: &'static str },

    #[error("{what}: not enough samples (need {needed}, got {got})")]
    InsufficientSamples {
        what: &'static str,
        needed: usize,
        got: usize,
    },
}

/// Configuration values that cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for environment variable {name}: '{value}'")]
    Env { name: String, value: String },
}

/// Request-level failure.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("{role} file: {source}")]
    Input {
        role: SensorRole,
        #[source]
        source: ValidationError,
    },

    #[error("Angle series could not be produced: {0}")]
    AngleSeries(#[from] ComputationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AnalysisError {
    pub fn input(role: SensorRole, source: ValidationError) -> Self {
        AnalysisError::Input { role, source }
    }

    /// Error code for the response, when the failure is an input problem.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            AnalysisError::Input { source, .. } => Some(source.code()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message() {
        let err = ValidationError::MissingColumns {
            missing: vec!["Quat_Y".to_string(), "Quat_Z".to_string()],
        };
        assert_eq!(err.to_string(), "Missing required columns: Quat_Y, Quat_Z");
        assert_eq!(err.code(), "E003");
    }

    #[test]
    fn test_input_error_carries_role_and_code() {
        let err = AnalysisError::input(
            SensorRole::Pelvis,
            ValidationError::InsufficientRows {
                required: 100,
                found: 12,
            },
        );
        assert!(err.to_string().starts_with("pelvis file: Insufficient data"));
        assert_eq!(err.code(), Some("E004"));
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            ValidationError::InvalidExtension {
                file_name: "a.txt".into(),
            },
            ValidationError::FileTooLarge { size: 2, limit: 1 },
            ValidationError::MissingColumns { missing: vec![] },
            ValidationError::InsufficientRows {
                required: 100,
                found: 0,
            },
            ValidationError::QuaternionNorm {
                line: 1,
                norm: 1.2,
                tolerance: 0.05,
            },
            ValidationError::NonMonotonicTimestamps { line: 3 },
            ValidationError::HeaderNotFound,
        ];
        let mut codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
