//! Projection of raw captures onto the structured schema

use serde_json::{Map, Value};
use uuid::Uuid;
use wxp_common::types::parse_event_time;
use wxp_common::{RawMetadata, RawRecord, StructuredRecord};

use crate::error::SchemaError;

const CURRENT_WEATHER: &str = "payload.current_weather";

/// Stateless projector from [`RawRecord`] to [`StructuredRecord`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredExtractor;

impl StructuredExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Decode a raw object, naming the first envelope field that is unusable
    pub fn decode_raw(&self, bytes: &[u8]) -> Result<RawRecord, SchemaError> {
        let document: Value =
            serde_json::from_slice(bytes).map_err(|e| SchemaError::invalid("$", e.to_string()))?;

        let root = as_object(&document, "$")?;
        let metadata = as_object(required(root, "metadata", "metadata")?, "metadata")?;
        let payload = required(root, "payload", "payload")?;

        let run_id = required_str(metadata, "run_id", "metadata.run_id")?;
        let run_id = Uuid::parse_str(run_id)
            .map_err(|e| SchemaError::invalid("metadata.run_id", e.to_string()))?;

        let captured_at = required_str(metadata, "ingestion_timestamp", "metadata.ingestion_timestamp")?;
        let ingestion_timestamp = parse_event_time(captured_at)
            .map_err(|e| SchemaError::invalid("metadata.ingestion_timestamp", e.to_string()))?;

        let source_system =
            required_str(metadata, "source_system", "metadata.source_system")?.to_string();

        Ok(RawRecord {
            metadata: RawMetadata {
                ingestion_timestamp,
                source_system,
                run_id,
            },
            payload: payload.clone(),
        })
    }

    /// Project the current-weather block into a flat row.
    ///
    /// No unit conversion. `run_id` and `ingestion_time` come from the
    /// envelope metadata.
    pub fn extract(&self, raw: &RawRecord) -> Result<StructuredRecord, SchemaError> {
        let current = raw
            .payload
            .get("current_weather")
            .filter(|value| !value.is_null())
            .ok_or_else(|| SchemaError::missing(CURRENT_WEATHER))?;
        let current = as_object(current, CURRENT_WEATHER)?;

        let temperature = number(current, "temperature")?;
        let windspeed = number(current, "windspeed")?;
        let winddirection = number(current, "winddirection")?;
        let weathercode = weathercode(current)?;

        let time_path = leaf_path("time");
        let observation_time = parse_event_time(required_str(current, "time", &time_path)?)
            .map_err(|e| SchemaError::invalid(time_path, e.to_string()))?;

        Ok(StructuredRecord {
            run_id: raw.metadata.run_id,
            ingestion_time: raw.metadata.ingestion_timestamp,
            temperature,
            windspeed,
            winddirection,
            weathercode,
            observation_time,
        })
    }
}

fn leaf_path(field: &str) -> String {
    format!("{}.{}", CURRENT_WEATHER, field)
}

/// Present and non-null
fn required<'a>(object: &'a Map<String, Value>, field: &str, path: &str) -> Result<&'a Value, SchemaError> {
    object
        .get(field)
        .filter(|value| !value.is_null())
        .ok_or_else(|| SchemaError::missing(path))
}

fn required_str<'a>(object: &'a Map<String, Value>, field: &str, path: &str) -> Result<&'a str, SchemaError> {
    let value = required(object, field, path)?;
    value
        .as_str()
        .ok_or_else(|| SchemaError::invalid(path, format!("expected a string, found {}", type_name(value))))
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, SchemaError> {
    value
        .as_object()
        .ok_or_else(|| SchemaError::invalid(path, format!("expected an object, found {}", type_name(value))))
}

fn number(current: &Map<String, Value>, field: &str) -> Result<f64, SchemaError> {
    let path = leaf_path(field);
    let value = required(current, field, &path)?;
    value
        .as_f64()
        .ok_or_else(|| SchemaError::invalid(path, format!("expected a number, found {}", type_name(value))))
}

/// WMO code; integral floats such as `3.0` are accepted
fn weathercode(current: &Map<String, Value>) -> Result<i32, SchemaError> {
    let path = leaf_path("weathercode");
    let value = required(current, "weathercode", &path)?;

    if let Some(code) = value.as_i64() {
        return i32::try_from(code)
            .map_err(|_| SchemaError::invalid(path, format!("{} is out of range", code)));
    }

    match value.as_f64() {
        Some(code) if code.fract() == 0.0 && code >= i32::MIN as f64 && code <= i32::MAX as f64 => {
            Ok(code as i32)
        },
        Some(code) => Err(SchemaError::invalid(path, format!("{} is not an integer code", code))),
        None => Err(SchemaError::invalid(
            path,
            format!("expected an integer, found {}", type_name(value)),
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::SchemaErrorKind;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn raw(payload: Value) -> RawRecord {
        RawRecord {
            metadata: RawMetadata {
                ingestion_timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 10, 31, 5).unwrap(),
                source_system: "open-meteo".to_string(),
                run_id: Uuid::new_v4(),
            },
            payload,
        }
    }

    fn current_weather() -> Value {
        json!({
            "latitude": 13.0,
            "longitude": 77.625,
            "current_weather": {
                "temperature": 24.3,
                "windspeed": 9.7,
                "winddirection": 254,
                "weathercode": 3,
                "is_day": 1,
                "time": "2024-06-01T10:30"
            }
        })
    }

    #[test]
    fn test_extract_projects_fields() {
        let raw = raw(current_weather());
        let record = StructuredExtractor::new().extract(&raw).unwrap();

        assert_eq!(record.run_id, raw.metadata.run_id);
        assert_eq!(record.ingestion_time, raw.metadata.ingestion_timestamp);
        assert_eq!(record.temperature, 24.3);
        assert_eq!(record.winddirection, 254.0);
        assert_eq!(record.weathercode, 3);
        assert_eq!(record.observation_time, Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_missing_temperature_names_full_path() {
        let mut payload = current_weather();
        payload["current_weather"]
            .as_object_mut()
            .unwrap()
            .remove("temperature");

        let err = StructuredExtractor::new().extract(&raw(payload)).unwrap_err();
        assert_eq!(err.path(), "payload.current_weather.temperature");
        assert!(err.is_missing());
    }

    #[test]
    fn test_null_leaf_counts_as_missing() {
        let mut payload = current_weather();
        payload["current_weather"]["time"] = Value::Null;

        let err = StructuredExtractor::new().extract(&raw(payload)).unwrap_err();
        assert_eq!(err, SchemaError::missing("payload.current_weather.time"));
    }

    #[test]
    fn test_missing_block() {
        let err = StructuredExtractor::new()
            .extract(&raw(json!({"hourly": {}})))
            .unwrap_err();
        assert_eq!(err.path(), "payload.current_weather");
    }

    #[test]
    fn test_wrong_type_is_invalid() {
        let mut payload = current_weather();
        payload["current_weather"]["windspeed"] = json!("fast");

        let err = StructuredExtractor::new().extract(&raw(payload)).unwrap_err();
        assert_eq!(err.path(), "payload.current_weather.windspeed");
        assert!(matches!(err.kind, SchemaErrorKind::Invalid(ref reason) if reason.contains("string")));
    }

    #[test]
    fn test_unparseable_time_is_invalid() {
        let mut payload = current_weather();
        payload["current_weather"]["time"] = json!("noon");

        let err = StructuredExtractor::new().extract(&raw(payload)).unwrap_err();
        assert_eq!(err.path(), "payload.current_weather.time");
        assert!(!err.is_missing());
    }

    #[test]
    fn test_weathercode_rules() {
        let extractor = StructuredExtractor::new();

        let mut payload = current_weather();
        payload["current_weather"]["weathercode"] = json!(61.0);
        assert_eq!(extractor.extract(&raw(payload.clone())).unwrap().weathercode, 61);

        payload["current_weather"]["weathercode"] = json!(2.5);
        assert!(extractor.extract(&raw(payload.clone())).is_err());

        payload["current_weather"]["weathercode"] = json!(i64::from(i32::MAX) + 1);
        assert!(extractor.extract(&raw(payload)).is_err());
    }

    #[test]
    fn test_decode_raw_round_trip() {
        let record = raw(current_weather());
        let bytes = serde_json::to_vec(&record).unwrap();
        assert_eq!(StructuredExtractor::new().decode_raw(&bytes).unwrap(), record);
    }

    #[test]
    fn test_decode_raw_accepts_naive_capture_time() {
        let bytes = json!({
            "metadata": {
                "ingestion_timestamp": "2024-06-01T10:31:05.250000",
                "source_system": "open-meteo",
                "run_id": "6f1c2f5e-8f59-4a55-9d44-2f1b8c0e4a10"
            },
            "payload": current_weather()
        })
        .to_string();

        let record = StructuredExtractor::new().decode_raw(bytes.as_bytes()).unwrap();
        assert_eq!(record.metadata.ingestion_timestamp.timestamp_subsec_micros(), 250_000);
    }

    #[test]
    fn test_decode_raw_names_bad_envelope_field() {
        let extractor = StructuredExtractor::new();

        let err = extractor.decode_raw(b"{\"payload\": {}}").unwrap_err();
        assert_eq!(err.path(), "metadata");

        let bytes = json!({
            "metadata": {"run_id": "nope", "ingestion_timestamp": "2024-06-01T10:31", "source_system": "x"},
            "payload": {}
        })
        .to_string();
        let err = extractor.decode_raw(bytes.as_bytes()).unwrap_err();
        assert_eq!(err.path(), "metadata.run_id");

        let err = extractor.decode_raw(b"not json").unwrap_err();
        assert_eq!(err.path(), "$");
    }
}
