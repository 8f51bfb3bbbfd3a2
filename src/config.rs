//! Analysis configuration.
//!
//! [`AnalysisConfig`] groups the per-layer settings into one record. Every
//! field has a default, so a TOML file only needs the values it changes:
//!
//! ```toml
//! output_decimals = 3
//!
//! [segmentation]
//! onset_threshold = 2.5
//! debounce_samples = 15
//!
//! [scoring]
//! hip_hinge_range = [25.0, 55.0]
//! ```
//!
//! Selected values can also be overridden through `LUMBAR_*` environment
//! variables (see [`AnalysisConfig::apply_env_overrides`]).

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::ingest::IngestConfig;
use crate::scoring::ScoringConfig;
use crate::segmentation::SegmentationConfig;
use crate::statistics::StatisticsConfig;

/// Decimals kept for p-values regardless of `output_decimals`.
pub const P_VALUE_DECIMALS: u32 = 4;

/// Complete configuration for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub ingest: IngestConfig,
    pub segmentation: SegmentationConfig,
    pub scoring: ScoringConfig,
    pub statistics: StatisticsConfig,
    /// Decimal places kept for floats in the response.
    pub output_decimals: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ingest: IngestConfig::default(),
            segmentation: SegmentationConfig::default(),
            scoring: ScoringConfig::default(),
            statistics: StatisticsConfig::default(),
            output_decimals: 2,
        }
    }
}

impl AnalysisConfig {
    /// Load and validate a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: AnalysisConfig = toml::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.as_ref().display(), "configuration loaded");
        Ok(config)
    }

    /// Defaults or the given file, then environment overrides, then
    /// validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `LUMBAR_QUATERNION_NORM_TOLERANCE` | `ingest.quaternion_norm_tolerance` |
    /// | `LUMBAR_MAX_FILE_BYTES` | `ingest.max_file_bytes` |
    /// | `LUMBAR_ONSET_THRESHOLD` | `segmentation.onset_threshold` |
    /// | `LUMBAR_DEBOUNCE_SAMPLES` | `segmentation.debounce_samples` |
    /// | `LUMBAR_HISTOGRAM_BIN_COUNT` | `statistics.histogram_bin_count` |
    /// | `LUMBAR_OUTPUT_DECIMALS` | `output_decimals` |
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with a
    /// custom variable source.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_field(
            &lookup,
            "LUMBAR_QUATERNION_NORM_TOLERANCE",
            &mut self.ingest.quaternion_norm_tolerance,
        )?;
        override_field(&lookup, "LUMBAR_MAX_FILE_BYTES", &mut self.ingest.max_file_bytes)?;
        override_field(
            &lookup,
            "LUMBAR_ONSET_THRESHOLD",
            &mut self.segmentation.onset_threshold,
        )?;
        override_field(
            &lookup,
            "LUMBAR_DEBOUNCE_SAMPLES",
            &mut self.segmentation.debounce_samples,
        )?;
        override_field(
            &lookup,
            "LUMBAR_HISTOGRAM_BIN_COUNT",
            &mut self.statistics.histogram_bin_count,
        )?;
        override_field(&lookup, "LUMBAR_OUTPUT_DECIMALS", &mut self.output_decimals)?;
        Ok(())
    }

    /// Reject values that would make the analysis meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if !(self.ingest.quaternion_norm_tolerance > 0.0
            && self.ingest.quaternion_norm_tolerance < 1.0)
        {
            return invalid("quaternion_norm_tolerance must be in (0, 1)");
        }
        if self.ingest.max_file_bytes == 0 {
            return invalid("max_file_bytes must be greater than 0");
        }
        if self.ingest.min_rows < 3 {
            return invalid("min_rows must be at least 3");
        }

        if !(self.segmentation.onset_threshold >= 0.0) {
            return invalid("onset_threshold must be non-negative");
        }
        if !(self.segmentation.min_onset_delta > 0.0) {
            return invalid("min_onset_delta must be positive");
        }
        if !(self.segmentation.quiet_quantile > 0.0 && self.segmentation.quiet_quantile < 1.0) {
            return invalid("quiet_quantile must be in (0, 1)");
        }
        if self.segmentation.debounce_samples == 0 {
            return invalid("debounce_samples must be greater than 0");
        }
        if self.segmentation.max_repetitions == 0 {
            return invalid("max_repetitions must be greater than 0");
        }

        let (hinge_low, hinge_high) = self.scoring.hip_hinge_range;
        if !(hinge_low < hinge_high) {
            return invalid("hip_hinge_range must be increasing");
        }
        let (lean_low, lean_high) = self.scoring.trunk_lean_range;
        if !(lean_low > 0.0 && lean_low < lean_high) {
            return invalid("trunk_lean_range must be positive and increasing");
        }
        let weights = self.scoring.trunk_lean_weights;
        let sum = weights.peak + weights.timing + weights.smoothness;
        if weights.peak < 0.0 || weights.timing < 0.0 || weights.smoothness < 0.0 {
            return invalid("trunk_lean_weights must be non-negative");
        }
        if (sum - 1.0).abs() > 1e-6 {
            return invalid("trunk_lean_weights must sum to 1");
        }

        if self.statistics.histogram_bin_count == 0 {
            return invalid("histogram_bin_count must be greater than 0");
        }
        if !(self.statistics.normality_alpha > 0.0 && self.statistics.normality_alpha < 1.0) {
            return invalid("normality_alpha must be in (0, 1)");
        }
        if self.output_decimals > 10 {
            return invalid("output_decimals must be at most 10");
        }

        Ok(())
    }
}

fn override_field<F, T>(lookup: &F, name: &str, field: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(name) {
        *field = value.trim().parse().map_err(|_| ConfigError::Env {
            name: name.to_string(),
            value: value.clone(),
        })?;
        debug!(name, value = %value, "configuration override");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        config.validate().unwrap();
        assert_eq!(config.output_decimals, 2);
        assert_eq!(config.scoring.hip_hinge_range, (30.0, 60.0));
        assert_eq!(config.scoring.trunk_lean_range, (20.0, 45.0));
        assert_eq!(config.statistics.histogram_bin_count, 20);
        assert_eq!(config.ingest.quaternion_norm_tolerance, 0.05);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "output_decimals = 3\n\n[segmentation]\ndebounce_samples = 15\n\n[scoring]\nhip_hinge_range = [25.0, 55.0]"
        )
        .unwrap();

        let config = AnalysisConfig::from_file(file.path()).unwrap();
        assert_eq!(config.output_decimals, 3);
        assert_eq!(config.segmentation.debounce_samples, 15);
        assert_eq!(config.segmentation.onset_threshold, 3.0);
        assert_eq!(config.scoring.hip_hinge_range, (25.0, 55.0));
        assert_eq!(config.scoring.trunk_lean_range, (20.0, 45.0));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scoring]\nhip_hinge_range = [60.0, 30.0]").unwrap();
        let err = AnalysisConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "output_decimals = \"two\"").unwrap();
        let err = AnalysisConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = AnalysisConfig::from_file("/nonexistent/lumbar.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LUMBAR_ONSET_THRESHOLD", "2.5"),
            ("LUMBAR_DEBOUNCE_SAMPLES", " 12 "),
            ("LUMBAR_OUTPUT_DECIMALS", "4"),
        ]
        .into_iter()
        .collect();

        let mut config = AnalysisConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.segmentation.onset_threshold, 2.5);
        assert_eq!(config.segmentation.debounce_samples, 12);
        assert_eq!(config.output_decimals, 4);
        assert_eq!(config.statistics.histogram_bin_count, 20);
    }

    #[test]
    fn test_bad_override_names_variable() {
        let mut config = AnalysisConfig::default();
        let err = config
            .apply_overrides(|name| (name == "LUMBAR_HISTOGRAM_BIN_COUNT").then(|| "many".to_string()))
            .unwrap_err();
        match err {
            ConfigError::Env { name, value } => {
                assert_eq!(name, "LUMBAR_HISTOGRAM_BIN_COUNT");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut config = AnalysisConfig::default();
        config.scoring.trunk_lean_weights.peak = 0.9;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.segmentation.debounce_samples = 0;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.segmentation.quiet_quantile = 1.0;
        assert!(config.validate().is_err());
    }
}
