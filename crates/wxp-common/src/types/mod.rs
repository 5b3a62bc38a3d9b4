//! Common types used across the weather pipeline
//!
//! The raw layer stores [`RawRecord`] envelopes exactly as captured, the
//! silver and gold layers both carry [`StructuredRecord`] rows.

use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WxpError};

/// Naive layouts accepted for event and capture times, interpreted as UTC.
const NAIVE_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

// ============================================================================
// Raw Layer
// ============================================================================

/// Run metadata attached to every raw capture
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawMetadata {
    /// Instant the payload was captured, always UTC
    #[serde(with = "utc_timestamp")]
    pub ingestion_timestamp: DateTime<Utc>,

    /// Upstream system tag (e.g., "open-meteo")
    pub source_system: String,

    /// Identifier of the run that produced this capture
    pub run_id: Uuid,
}

/// One captured payload plus its run metadata.
///
/// Raw records are written once under a key derived from `run_id` and are
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawRecord {
    pub metadata: RawMetadata,
    pub payload: serde_json::Value,
}

impl RawRecord {
    pub fn run_id(&self) -> Uuid {
        self.metadata.run_id
    }
}

// ============================================================================
// Structured Layer
// ============================================================================

/// Flat observation row shared by the silver partitions and the warehouse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredRecord {
    pub run_id: Uuid,
    pub ingestion_time: DateTime<Utc>,
    pub temperature: f64,
    pub windspeed: f64,
    pub winddirection: f64,
    pub weathercode: i32,
    /// Event time; partition and ordering key
    pub observation_time: DateTime<Utc>,
}

impl StructuredRecord {
    /// Date directory this record belongs to
    pub fn partition_date(&self) -> PartitionDate {
        PartitionDate::of(&self.observation_time)
    }
}

/// Calendar date (UTC) of an observation, used as the partition key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl PartitionDate {
    pub fn of(instant: &DateTime<Utc>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
            day: instant.day(),
        }
    }
}

impl std::fmt::Display for PartitionDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Parse an event or capture timestamp.
///
/// Accepts RFC 3339 (any offset, normalized to UTC) as well as the naive
/// `YYYY-MM-DDTHH:MM` and `YYYY-MM-DDTHH:MM:SS[.f]` forms, which are read as UTC.
pub fn parse_event_time(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NAIVE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| WxpError::InvalidTimestamp {
            value: value.to_string(),
        })
}

/// Microseconds since the Unix epoch
pub fn to_micros(instant: &DateTime<Utc>) -> i64 {
    instant.timestamp_micros()
}

/// Inverse of [`to_micros`]
pub fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or(WxpError::TimestampOutOfRange(micros))
}

/// Serde adapter writing RFC 3339 UTC and reading any form
/// [`parse_event_time`] understands.
pub mod utc_timestamp {
    use super::{format_utc, parse_event_time};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_utc(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_event_time(&raw).map_err(serde::de::Error::custom)
    }
}

/// Render a timestamp the way the raw layer stores it
pub fn format_utc(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}
