//! CSV ingestion and validation for Movella DOT exports.
//!
//! A DOT export starts with a free-form metadata preamble of unknown length
//! (device tag, firmware version, filter profile, ...), followed by the real
//! header row and one row per sample. Rows usually end with a trailing comma,
//! which yields an empty last field.
//!
//! Ingestion locates the header, maps columns, parses every data row and
//! enforces the trace invariants. The result is either a [`SensorTrace`] or a
//! [`ValidationError`] naming exactly one failure kind.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::orientation::Quaternion;
use crate::types::{ChannelSet, RawSample, SensorRole, SensorTrace, MIN_TRACE_SAMPLES};

/// Columns every trace must provide.
pub const REQUIRED_COLUMNS: [&str; 5] = ["SampleTimeFine", "Quat_W", "Quat_X", "Quat_Y", "Quat_Z"];

const GYRO_COLUMNS: [&str; 3] = ["Gyr_X", "Gyr_Y", "Gyr_Z"];

/// Free acceleration (gravity removed, earth frame) is preferred over raw
/// accelerometer output when a file carries both.
const FREE_ACC_COLUMNS: [&str; 3] = ["FreeAcc_X", "FreeAcc_Y", "FreeAcc_Z"];
const ACC_COLUMNS: [&str; 3] = ["Acc_X", "Acc_Y", "Acc_Z"];

/// `SampleTimeFine` is an unsigned 32-bit microsecond counter.
const TIMESTAMP_WRAP: f64 = 4_294_967_296.0;

/// Upload limits and validation tolerances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Allowed deviation of |q| from 1.
    pub quaternion_norm_tolerance: f64,

    /// Largest accepted upload in bytes.
    pub max_file_bytes: usize,

    /// Minimum number of data rows after the header.
    pub min_rows: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            quaternion_norm_tolerance: 0.05,
            max_file_bytes: 50 * 1024 * 1024,
            min_rows: MIN_TRACE_SAMPLES,
        }
    }
}

/// A validated trace plus the non-fatal notes gathered while parsing it.
#[derive(Debug, Clone)]
pub struct ParsedTrace {
    pub trace: SensorTrace,
    pub warnings: Vec<String>,
}

/// Check the upload envelope (name and size) before reading any content.
pub fn validate_upload(
    file_name: &str,
    size: usize,
    config: &IngestConfig,
) -> Result<(), ValidationError> {
    let is_csv = Path::new(file_name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if !is_csv {
        return Err(ValidationError::InvalidExtension {
            file_name: file_name.to_string(),
        });
    }

    if size > config.max_file_bytes {
        return Err(ValidationError::FileTooLarge {
            size,
            limit: config.max_file_bytes,
        });
    }

    Ok(())
}

/// Validate the upload envelope, then parse its content.
pub fn parse_upload(
    role: SensorRole,
    file_name: &str,
    bytes: &[u8],
    config: &IngestConfig,
) -> Result<ParsedTrace, ValidationError> {
    validate_upload(file_name, bytes.len(), config)?;
    parse_trace(role, bytes, config)
}

/// Column positions resolved from the header row.
#[derive(Debug, Clone)]
struct ColumnMap {
    time: usize,
    quat: [usize; 4],
    gyro: Option<[usize; 3]>,
    acc: Option<[usize; 3]>,
    free_acc: bool,
}

impl ColumnMap {
    /// Resolve columns if `header` contains every required name.
    fn locate(header: &[String]) -> Option<Self> {
        let find = |name: &str| header.iter().position(|cell| cell == name);
        let find3 = |names: [&str; 3]| -> Option<[usize; 3]> {
            Some([find(names[0])?, find(names[1])?, find(names[2])?])
        };

        let free_acc = find3(FREE_ACC_COLUMNS);
        Some(Self {
            time: find(REQUIRED_COLUMNS[0])?,
            quat: [
                find(REQUIRED_COLUMNS[1])?,
                find(REQUIRED_COLUMNS[2])?,
                find(REQUIRED_COLUMNS[3])?,
                find(REQUIRED_COLUMNS[4])?,
            ],
            gyro: find3(GYRO_COLUMNS),
            acc: free_acc.or_else(|| find3(ACC_COLUMNS)),
            free_acc: free_acc.is_some(),
        })
    }
}

/// Required names absent from a candidate header row.
fn missing_required(cells: &[String]) -> Vec<String> {
    REQUIRED_COLUMNS
        .iter()
        .filter(|name| !cells.iter().any(|cell| cell == *name))
        .map(|name| name.to_string())
        .collect()
}

/// Trimmed cells of a record with trailing empty fields removed.
fn record_cells(record: &csv::ByteRecord) -> Vec<String> {
    let mut cells: Vec<String> = record
        .iter()
        .map(|field| String::from_utf8_lossy(field).trim().to_string())
        .collect();
    while cells.last().map(|c| c.is_empty()).unwrap_or(false) {
        cells.pop();
    }
    cells
}

fn parse_cell(cells: &[String], index: usize) -> Option<f64> {
    cells
        .get(index)
        .and_then(|cell| cell.parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

fn parse_triplet(cells: &[String], index: [usize; 3]) -> Option<[f64; 3]> {
    Some([
        parse_cell(cells, index[0])?,
        parse_cell(cells, index[1])?,
        parse_cell(cells, index[2])?,
    ])
}

fn parse_quaternion(cells: &[String], index: [usize; 4]) -> Option<Quaternion> {
    Some(Quaternion::new(
        parse_cell(cells, index[0])?,
        parse_cell(cells, index[1])?,
        parse_cell(cells, index[2])?,
        parse_cell(cells, index[3])?,
    ))
}

/// Parse and validate the content of one sensor export.
///
/// Checks run in this order: header location, row count, quaternion norm,
/// timestamp order. Parsing stops at the first fatal problem.
pub fn parse_trace(
    role: SensorRole,
    bytes: &[u8],
    config: &IngestConfig,
) -> Result<ParsedTrace, ValidationError> {
    let content = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    // Preamble lines are free text; quoting is disabled so a stray quote
    // cannot swallow the rows that follow it.
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(content);

    let mut columns: Option<ColumnMap> = None;
    let mut best_missing: Option<Vec<String>> = None;
    let mut samples: Vec<RawSample> = Vec::new();
    let mut gyro_broken = false;
    let mut acc_broken = false;
    let mut dropped_rows = 0usize;
    let mut norm_violation: Option<ValidationError> = None;
    let mut order_violation: Option<ValidationError> = None;

    let mut wrap_offset = 0.0;
    let mut prev_raw_time: Option<f64> = None;
    let mut prev_time: Option<f64> = None;

    let mut record = csv::ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        let cells = record_cells(&record);
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);

        if columns.is_none() {
            if let Some(map) = ColumnMap::locate(&cells) {
                debug!(%role, line, "located header row");
                columns = Some(map);
            } else {
                let missing = missing_required(&cells);
                let is_candidate = missing.len() < REQUIRED_COLUMNS.len();
                let is_better = best_missing
                    .as_ref()
                    .map(|best| missing.len() < best.len())
                    .unwrap_or(true);
                if is_candidate && is_better {
                    best_missing = Some(missing);
                }
            }
            continue;
        }
        let Some(map) = columns.as_ref() else {
            continue;
        };

        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }

        let (raw_time, quaternion) = match (
            parse_cell(&cells, map.time),
            parse_quaternion(&cells, map.quat),
        ) {
            (Some(t), Some(q)) => (t, q),
            _ => {
                dropped_rows += 1;
                continue;
            }
        };

        if norm_violation.is_none() && !quaternion.is_unit(config.quaternion_norm_tolerance) {
            norm_violation = Some(ValidationError::QuaternionNorm {
                line,
                norm: quaternion.norm(),
                tolerance: config.quaternion_norm_tolerance,
            });
        }

        // Undo counter wrap-around before checking order.
        if let Some(prev) = prev_raw_time {
            if raw_time < prev && prev - raw_time > TIMESTAMP_WRAP / 2.0 {
                wrap_offset += TIMESTAMP_WRAP;
            }
        }
        prev_raw_time = Some(raw_time);
        let timestamp = raw_time + wrap_offset;

        if let Some(prev) = prev_time {
            if timestamp < prev && order_violation.is_none() {
                order_violation = Some(ValidationError::NonMonotonicTimestamps { line });
            }
        }
        prev_time = Some(timestamp);

        let mut sample = RawSample::new(timestamp, quaternion);

        if let Some(index) = map.gyro {
            sample.angular_velocity = parse_triplet(&cells, index);
            gyro_broken |= sample.angular_velocity.is_none();
        }
        if let Some(index) = map.acc {
            sample.linear_acceleration = parse_triplet(&cells, index);
            acc_broken |= sample.linear_acceleration.is_none();
        }

        samples.push(sample);
    }

    let map = match columns {
        Some(map) => map,
        None => {
            return Err(match best_missing {
                Some(missing) => ValidationError::MissingColumns { missing },
                None => ValidationError::HeaderNotFound,
            })
        }
    };

    if samples.len() < config.min_rows {
        return Err(ValidationError::InsufficientRows {
            required: config.min_rows,
            found: samples.len(),
        });
    }
    if let Some(err) = norm_violation {
        return Err(err);
    }
    if let Some(err) = order_violation {
        return Err(err);
    }

    let mut warnings = Vec::new();
    if dropped_rows > 0 {
        warn!(%role, dropped_rows, "dropped rows with unreadable timestamp or quaternion");
        warnings.push(format!(
            "{role}: dropped {dropped_rows} rows with unreadable timestamp or quaternion"
        ));
    }

    let mut channels = ChannelSet {
        gyroscope: map.gyro.is_some(),
        acceleration: map.acc.is_some(),
        free_acceleration: map.free_acc,
    };
    if channels.gyroscope && gyro_broken {
        warn!(%role, "gyroscope channel has unreadable values, ignoring it");
        warnings.push(format!("{role}: gyroscope channel has unreadable values and was ignored"));
        channels.gyroscope = false;
        samples.iter_mut().for_each(|s| s.angular_velocity = None);
    }
    if channels.acceleration && acc_broken {
        warn!(%role, "acceleration channel has unreadable values, ignoring it");
        warnings.push(format!(
            "{role}: acceleration channel has unreadable values and was ignored"
        ));
        channels.acceleration = false;
        channels.free_acceleration = false;
        samples.iter_mut().for_each(|s| s.linear_acceleration = None);
    }

    debug!(
        %role,
        samples = samples.len(),
        gyroscope = channels.gyroscope,
        acceleration = channels.acceleration,
        "parsed sensor trace"
    );

    Ok(ParsedTrace {
        trace: SensorTrace::from_validated(role, samples, channels),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREAMBLE: &str = "DeviceTag:,spine\nFirmware Version:,2.6.0\nFilter Profile:,General\nFree text line without delimiters\n";

    /// Movella-style export with `rows` identity-quaternion samples at 60 Hz.
    fn export(header: &str, rows: usize, row: impl Fn(usize) -> String) -> String {
        let mut csv = String::from(PREAMBLE);
        csv.push_str(header);
        csv.push('\n');
        for i in 0..rows {
            csv.push_str(&row(i));
            csv.push('\n');
        }
        csv
    }

    fn basic_export(rows: usize) -> String {
        export(
            "PacketCounter,SampleTimeFine,Quat_W,Quat_X,Quat_Y,Quat_Z,",
            rows,
            |i| format!("{},{},1.0,0.0,0.0,0.0,", i, 1_000_000 + i * 16_667),
        )
    }

    fn parse(csv: &str) -> Result<ParsedTrace, ValidationError> {
        parse_trace(SensorRole::Spine, csv.as_bytes(), &IngestConfig::default())
    }

    #[test]
    fn test_parses_preamble_and_trailing_commas() {
        let parsed = parse(&basic_export(150)).unwrap();
        assert_eq!(parsed.trace.len(), 150);
        assert_eq!(parsed.trace.role(), SensorRole::Spine);
        assert_eq!(parsed.trace.channels(), ChannelSet::default());
        assert!(parsed.warnings.is_empty());

        let first = parsed.trace.samples()[0];
        assert_eq!(first.timestamp, 1_000_000.0);
        assert_eq!(first.quaternion, Quaternion::identity());
    }

    #[test]
    fn test_optional_channels_attached() {
        let csv = export(
            "PacketCounter,SampleTimeFine,Quat_W,Quat_X,Quat_Y,Quat_Z,FreeAcc_X,FreeAcc_Y,FreeAcc_Z,Gyr_X,Gyr_Y,Gyr_Z,",
            120,
            |i| format!("{i},{},1,0,0,0,0.1,0.2,0.3,1.5,2.5,3.5,", i * 10_000),
        );
        let parsed = parse(&csv).unwrap();
        let channels = parsed.trace.channels();
        assert!(channels.gyroscope);
        assert!(channels.acceleration);
        assert!(channels.free_acceleration);

        let sample = parsed.trace.samples()[5];
        assert_eq!(sample.angular_velocity, Some([1.5, 2.5, 3.5]));
        assert_eq!(sample.linear_acceleration, Some([0.1, 0.2, 0.3]));
    }

    #[test]
    fn test_raw_accelerometer_is_sensor_framed() {
        let csv = export(
            "SampleTimeFine,Quat_W,Quat_X,Quat_Y,Quat_Z,Acc_X,Acc_Y,Acc_Z,",
            120,
            |i| format!("{},1,0,0,0,0.3,-0.2,9.81,", i * 10_000),
        );
        let channels = parse(&csv).unwrap().trace.channels();
        assert!(channels.acceleration);
        assert!(!channels.free_acceleration);
    }

    #[test]
    fn test_broken_optional_channel_is_dropped_not_zeroed() {
        let csv = export(
            "SampleTimeFine,Quat_W,Quat_X,Quat_Y,Quat_Z,Gyr_X,Gyr_Y,Gyr_Z",
            120,
            |i| {
                if i == 7 {
                    format!("{},1,0,0,0,1,,3", i * 10_000)
                } else {
                    format!("{},1,0,0,0,1,2,3", i * 10_000)
                }
            },
        );
        let parsed = parse(&csv).unwrap();
        assert!(!parsed.trace.channels().gyroscope);
        assert!(parsed.trace.samples().iter().all(|s| s.angular_velocity.is_none()));
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_missing_quat_z_is_reported() {
        let csv = export(
            "PacketCounter,SampleTimeFine,Quat_W,Quat_X,Quat_Y,",
            150,
            |i| format!("{i},{},1,0,0,", i * 10_000),
        );
        let err = parse(&csv).unwrap_err();
        match &err {
            ValidationError::MissingColumns { missing } => assert_eq!(missing, &vec!["Quat_Z".to_string()]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().to_lowercase().contains("missing required columns"));
    }

    #[test]
    fn test_no_header_at_all() {
        let err = parse("hello\nworld\n1,2,3\n").unwrap_err();
        assert!(matches!(err, ValidationError::HeaderNotFound));
    }

    #[test]
    fn test_too_few_rows() {
        let err = parse(&basic_export(99)).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InsufficientRows {
                required: 100,
                found: 99
            }
        ));
    }

    #[test]
    fn test_single_bad_quaternion_fails() {
        let csv = export(
            "SampleTimeFine,Quat_W,Quat_X,Quat_Y,Quat_Z",
            150,
            |i| {
                if i == 42 {
                    format!("{},1.2,0,0,0", i * 10_000)
                } else {
                    format!("{},1,0,0,0", i * 10_000)
                }
            },
        );
        match parse(&csv).unwrap_err() {
            ValidationError::QuaternionNorm { norm, .. } => assert!((norm - 1.2).abs() < 1e-12),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unreadable_rows_are_dropped() {
        let csv = export(
            "SampleTimeFine,Quat_W,Quat_X,Quat_Y,Quat_Z",
            110,
            |i| {
                if i % 50 == 0 {
                    format!("{},n/a,0,0,0", i * 10_000)
                } else {
                    format!("{},1,0,0,0", i * 10_000)
                }
            },
        );
        let parsed = parse(&csv).unwrap();
        assert_eq!(parsed.trace.len(), 107);
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_timestamp_wraparound_is_unwrapped() {
        let start = 4_294_967_296.0 - 500_000.0;
        let csv = export(
            "SampleTimeFine,Quat_W,Quat_X,Quat_Y,Quat_Z",
            120,
            |i| {
                let t = (start + i as f64 * 10_000.0) % 4_294_967_296.0;
                format!("{t},1,0,0,0")
            },
        );
        let parsed = parse(&csv).unwrap();
        let samples = parsed.trace.samples();
        assert!(samples.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
    }

    #[test]
    fn test_backwards_timestamps_rejected() {
        let csv = export(
            "SampleTimeFine,Quat_W,Quat_X,Quat_Y,Quat_Z",
            120,
            |i| {
                let t = if i == 60 { 10 } else { i * 10_000 };
                format!("{t},1,0,0,0")
            },
        );
        assert!(matches!(
            parse(&csv).unwrap_err(),
            ValidationError::NonMonotonicTimestamps { .. }
        ));
    }

    #[test]
    fn test_upload_envelope() {
        let config = IngestConfig::default();
        assert!(validate_upload("spine_dot.csv", 1024, &config).is_ok());
        assert!(validate_upload("SPINE.CSV", 1024, &config).is_ok());
        assert!(matches!(
            validate_upload("spine.xlsx", 1024, &config),
            Err(ValidationError::InvalidExtension { .. })
        ));
        assert!(matches!(
            validate_upload("spine.csv", 50 * 1024 * 1024 + 1, &config),
            Err(ValidationError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(
            export("SampleTimeFine,Quat_W,Quat_X,Quat_Y,Quat_Z", 100, |i| format!("{i},1,0,0,0"))
                .trim_start_matches(PREAMBLE)
                .as_bytes(),
        );
        let parsed = parse_trace(SensorRole::Pelvis, &bytes, &IngestConfig::default()).unwrap();
        assert_eq!(parsed.trace.len(), 100);
    }
}
