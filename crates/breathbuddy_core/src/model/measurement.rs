//! Measurement domain model.
//!
//! # Responsibility
//! - Define the device wire shape (`RawMeasurement`) and the validated
//!   record (`MeasurementRecord`) used by the progress engine.
//! - Classify a reading and compare it with the previous one.
//!
//! # Invariants
//! - A `MeasurementRecord` always carries finite numeric fields and a parsed
//!   timestamp; it is never mutated after validation.
//! - `RawMeasurement` may be incomplete. Validation reports the first defect
//!   instead of guessing defaults.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier assigned to a measurement when it enters the event log.
pub type MeasurementId = Uuid;

/// Gas resistance (kOhm) below which a reading counts as a good result.
pub const GOOD_GAS_THRESHOLD_KOHM: f64 = 100.0;
/// Gas resistance (kOhm) below which a non-good reading is only elevated.
pub const ELEVATED_GAS_THRESHOLD_KOHM: f64 = 150.0;
/// Absolute gas delta (kOhm) under which two readings are reported as similar.
pub const SIMILAR_READING_DELTA_KOHM: f64 = 10.0;

const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Measurement as emitted by the device and persisted in history.
///
/// Every field is optional so that partially-written or legacy entries can
/// still be loaded; validation happens in [`MeasurementRecord::try_from_raw`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMeasurement {
    pub iaq: Option<f64>,
    pub co2_eq: Option<f64>,
    pub voc_eq: Option<f64>,
    pub temp: Option<f64>,
    pub hum: Option<f64>,
    pub pres: Option<f64>,
    #[serde(rename = "gas_kOhm")]
    pub gas_kohm: Option<f64>,
    pub timestamp: Option<String>,
}

/// Validated, immutable measurement record.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    /// Indoor air-quality index.
    pub iaq: f64,
    /// CO2-equivalent in ppm.
    pub co2_eq: f64,
    /// Breath-VOC equivalent in ppm.
    pub voc_eq: f64,
    /// Temperature in degrees Celsius.
    pub temp: f64,
    /// Relative humidity in percent.
    pub hum: f64,
    /// Pressure in hPa.
    pub pres: f64,
    /// Gas resistance in kOhm.
    pub gas_kohm: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Reason a raw history entry could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecord {
    MissingField(&'static str),
    NonFiniteField(&'static str),
    MissingTimestamp,
    InvalidTimestamp(String),
}

impl Display for MalformedRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "measurement field `{field}` is missing"),
            Self::NonFiniteField(field) => {
                write!(f, "measurement field `{field}` is not a finite number")
            }
            Self::MissingTimestamp => write!(f, "measurement timestamp is missing"),
            Self::InvalidTimestamp(value) => {
                write!(f, "measurement timestamp `{value}` cannot be parsed")
            }
        }
    }
}

impl Error for MalformedRecord {}

impl MeasurementRecord {
    /// Validates a raw entry.
    ///
    /// # Errors
    /// - `MissingField` / `NonFiniteField` for the first defective numeric field,
    ///   checked in wire order.
    /// - `MissingTimestamp` / `InvalidTimestamp` when the timestamp is absent or
    ///   neither RFC 3339 nor naive ISO-8601.
    ///
    /// Timestamps without an offset are read as UTC; use
    /// [`MeasurementRecord::try_from_raw_in`] when the local offset is known.
    pub fn try_from_raw(raw: &RawMeasurement) -> Result<Self, MalformedRecord> {
        Self::try_from_raw_in(raw, Utc.fix())
    }

    /// Validates a raw entry, reading offset-less timestamps as wall-clock
    /// time at `local_offset`.
    pub fn try_from_raw_in(
        raw: &RawMeasurement,
        local_offset: FixedOffset,
    ) -> Result<Self, MalformedRecord> {
        let timestamp = raw
            .timestamp
            .as_deref()
            .ok_or(MalformedRecord::MissingTimestamp)?;

        Ok(Self {
            iaq: require_finite(raw.iaq, "iaq")?,
            co2_eq: require_finite(raw.co2_eq, "co2_eq")?,
            voc_eq: require_finite(raw.voc_eq, "voc_eq")?,
            temp: require_finite(raw.temp, "temp")?,
            hum: require_finite(raw.hum, "hum")?,
            pres: require_finite(raw.pres, "pres")?,
            gas_kohm: require_finite(raw.gas_kohm, "gas_kOhm")?,
            recorded_at: parse_timestamp(timestamp, local_offset)?,
        })
    }

    /// Converts back to the wire shape, with an RFC 3339 millisecond timestamp.
    pub fn to_raw(&self) -> RawMeasurement {
        RawMeasurement {
            iaq: Some(self.iaq),
            co2_eq: Some(self.co2_eq),
            voc_eq: Some(self.voc_eq),
            temp: Some(self.temp),
            hum: Some(self.hum),
            pres: Some(self.pres),
            gas_kohm: Some(self.gas_kohm),
            timestamp: Some(format_timestamp(self.recorded_at)),
        }
    }

    /// Whether the gas reading is below the good-result threshold.
    pub fn is_good(&self) -> bool {
        self.gas_kohm < GOOD_GAS_THRESHOLD_KOHM
    }

    pub fn status(&self) -> MeasurementStatus {
        MeasurementStatus::from_gas(self.gas_kohm)
    }

    /// Compares this reading with the one taken before it.
    pub fn compare_with(&self, previous: Option<&MeasurementRecord>) -> ReadingComparison {
        let Some(previous) = previous else {
            return ReadingComparison::FirstTest;
        };

        let diff = self.gas_kohm - previous.gas_kohm;
        if diff.abs() < SIMILAR_READING_DELTA_KOHM {
            ReadingComparison::Similar
        } else if diff < 0.0 {
            ReadingComparison::Improved { delta: diff.abs() }
        } else {
            ReadingComparison::Increased { delta: diff }
        }
    }
}

/// Result classification shown after a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementStatus {
    Good,
    Elevated,
    High,
}

impl MeasurementStatus {
    pub fn from_gas(gas_kohm: f64) -> Self {
        if gas_kohm < GOOD_GAS_THRESHOLD_KOHM {
            Self::Good
        } else if gas_kohm < ELEVATED_GAS_THRESHOLD_KOHM {
            Self::Elevated
        } else {
            Self::High
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Elevated => "Elevated",
            Self::High => "High",
        }
    }
}

/// Change relative to the previous reading, in kOhm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadingComparison {
    FirstTest,
    Similar,
    Improved { delta: f64 },
    Increased { delta: f64 },
}

impl Display for ReadingComparison {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstTest => write!(f, "This is your first test!"),
            Self::Similar => write!(f, "Similar to your last test."),
            Self::Improved { delta } => {
                write!(f, "Improved by {delta:.1} kOhm from your last test!")
            }
            Self::Increased { delta } => {
                write!(f, "Increased by {delta:.1} kOhm from your last test.")
            }
        }
    }
}

/// Parses RFC 3339 timestamps, falling back to naive ISO-8601 read as local
/// wall-clock time at `local_offset`.
pub fn parse_timestamp(
    value: &str,
    local_offset: FixedOffset,
) -> Result<DateTime<Utc>, MalformedRecord> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .and_then(|naive| local_offset.from_local_datetime(&naive).single())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| MalformedRecord::InvalidTimestamp(value.to_string()))
}

/// Formats a timestamp the way history entries are written (`...T..:..:..mmmZ`).
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn require_finite(value: Option<f64>, field: &'static str) -> Result<f64, MalformedRecord> {
    match value {
        Some(number) if number.is_finite() => Ok(number),
        Some(_) => Err(MalformedRecord::NonFiniteField(field)),
        None => Err(MalformedRecord::MissingField(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        parse_timestamp, MalformedRecord, MeasurementRecord, MeasurementStatus, RawMeasurement,
        ReadingComparison,
    };
    use chrono::{FixedOffset, Offset, Utc};

    fn utc() -> FixedOffset {
        Utc.fix()
    }

    fn raw(gas: f64, timestamp: &str) -> RawMeasurement {
        RawMeasurement {
            iaq: Some(50.0),
            co2_eq: Some(600.0),
            voc_eq: Some(0.5),
            temp: Some(21.5),
            hum: Some(40.0),
            pres: Some(1013.2),
            gas_kohm: Some(gas),
            timestamp: Some(timestamp.to_string()),
        }
    }

    #[test]
    fn parses_rfc3339_and_naive_timestamps() {
        let zulu = parse_timestamp("2024-01-01T07:30:00.123Z", utc()).unwrap();
        let naive = parse_timestamp("2024-01-01T07:30:00.123", utc()).unwrap();
        assert_eq!(zulu, naive);

        let offset = parse_timestamp("2024-01-01T09:30:00+02:00", utc()).unwrap();
        assert_eq!(offset, parse_timestamp("2024-01-01T07:30:00Z", utc()).unwrap());
    }

    #[test]
    fn naive_timestamps_use_local_offset() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let naive = parse_timestamp("2024-01-01 07:30:00", plus_two).unwrap();
        assert_eq!(naive, parse_timestamp("2024-01-01T05:30:00Z", utc()).unwrap());

        // Explicit offsets win over the local one.
        let zoned = parse_timestamp("2024-01-01T07:30:00Z", plus_two).unwrap();
        assert_eq!(zoned, parse_timestamp("2024-01-01T07:30:00Z", utc()).unwrap());
    }

    #[test]
    fn rejects_garbage_timestamp() {
        let err = parse_timestamp("yesterday", utc()).unwrap_err();
        assert_eq!(err, MalformedRecord::InvalidTimestamp("yesterday".to_string()));
    }

    #[test]
    fn try_from_raw_reports_first_missing_field() {
        let mut entry = raw(80.0, "2024-01-01T07:30:00Z");
        entry.hum = None;
        entry.gas_kohm = None;
        let err = MeasurementRecord::try_from_raw(&entry).unwrap_err();
        assert_eq!(err, MalformedRecord::MissingField("hum"));
    }

    #[test]
    fn try_from_raw_rejects_nan() {
        let mut entry = raw(80.0, "2024-01-01T07:30:00Z");
        entry.gas_kohm = Some(f64::NAN);
        let err = MeasurementRecord::try_from_raw(&entry).unwrap_err();
        assert_eq!(err, MalformedRecord::NonFiniteField("gas_kOhm"));
    }

    #[test]
    fn wire_shape_uses_device_field_names() {
        let json = r#"{"iaq":25,"co2_eq":500,"voc_eq":0.4,"temp":22,"hum":45,"pres":1010,"gas_kOhm":95.5,"timestamp":"2024-03-02T10:00:00.000Z"}"#;
        let entry: RawMeasurement = serde_json::from_str(json).unwrap();
        let record = MeasurementRecord::try_from_raw(&entry).unwrap();
        assert_eq!(record.gas_kohm, 95.5);
        assert_eq!(record.to_raw().timestamp.as_deref(), Some("2024-03-02T10:00:00.000Z"));
    }

    #[test]
    fn status_follows_gas_thresholds() {
        assert_eq!(MeasurementStatus::from_gas(99.9), MeasurementStatus::Good);
        assert_eq!(MeasurementStatus::from_gas(100.0), MeasurementStatus::Elevated);
        assert_eq!(MeasurementStatus::from_gas(150.0), MeasurementStatus::High);
    }

    #[test]
    fn comparison_reports_direction_and_similarity() {
        let previous = MeasurementRecord::try_from_raw(&raw(120.0, "2024-01-01T07:30:00Z")).unwrap();
        let better = MeasurementRecord::try_from_raw(&raw(90.0, "2024-01-02T07:30:00Z")).unwrap();
        let close = MeasurementRecord::try_from_raw(&raw(125.0, "2024-01-02T07:30:00Z")).unwrap();

        assert_eq!(better.compare_with(None), ReadingComparison::FirstTest);
        assert_eq!(
            better.compare_with(Some(&previous)),
            ReadingComparison::Improved { delta: 30.0 }
        );
        assert_eq!(close.compare_with(Some(&previous)), ReadingComparison::Similar);
        assert_eq!(
            previous.compare_with(Some(&better)).to_string(),
            "Increased by 30.0 kOhm from your last test."
        );
    }
}
