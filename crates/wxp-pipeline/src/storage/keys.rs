//! Object key layout for the raw and silver layers

use chrono::{DateTime, Utc};
use uuid::Uuid;
use wxp_common::types::PartitionDate;

/// Dataset name used in both layers
pub const DOMAIN: &str = "weather";

pub const RAW_PREFIX: &str = "raw/weather/";
pub const SILVER_PREFIX: &str = "silver/weather/";

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

const RAW_SUFFIX: &str = ".json";
const PARTITION_SUFFIX: &str = ".parquet";

/// `raw/weather/{run_id}.json`
pub fn raw_key(run_id: Uuid) -> String {
    format!("{}{}{}", RAW_PREFIX, run_id, RAW_SUFFIX)
}

/// Recover the run id from a raw key, `None` for foreign objects
pub fn run_id_from_raw_key(key: &str) -> Option<Uuid> {
    key.strip_prefix(RAW_PREFIX)?
        .strip_suffix(RAW_SUFFIX)
        .and_then(|stem| Uuid::parse_str(stem).ok())
}

/// `silver/weather/year=YYYY/month=MM/day=DD/weather_{HHMMSS}_{digest}.parquet`
///
/// The digest suffix keeps different batches written in the same second
/// under distinct keys, so one never overwrites the other.
pub fn partition_key(date: PartitionDate, written_at: &DateTime<Utc>, digest: &str) -> String {
    format!(
        "{}year={:04}/month={:02}/day={:02}/{}_{}_{}{}",
        SILVER_PREFIX,
        date.year,
        date.month,
        date.day,
        DOMAIN,
        written_at.format("%H%M%S"),
        digest,
        PARTITION_SUFFIX
    )
}

pub fn is_partition_key(key: &str) -> bool {
    key.starts_with(SILVER_PREFIX) && key.ends_with(PARTITION_SUFFIX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_raw_key_round_trip() {
        let run_id = Uuid::new_v4();
        let key = raw_key(run_id);
        assert!(key.starts_with("raw/weather/"));
        assert_eq!(run_id_from_raw_key(&key), Some(run_id));
    }

    #[test]
    fn test_run_id_from_foreign_key() {
        assert_eq!(run_id_from_raw_key("raw/weather/notes.txt"), None);
        assert_eq!(run_id_from_raw_key("raw/weather/not-a-uuid.json"), None);
        assert_eq!(run_id_from_raw_key("silver/weather/x.json"), None);
    }

    #[test]
    fn test_partition_key_layout() {
        let date = PartitionDate {
            year: 2024,
            month: 3,
            day: 5,
        };
        let written_at = Utc.with_ymd_and_hms(2024, 3, 6, 7, 8, 9).unwrap();

        assert_eq!(
            partition_key(date, &written_at, "0123456789ab"),
            "silver/weather/year=2024/month=03/day=05/weather_070809_0123456789ab.parquet"
        );
    }

    #[test]
    fn test_same_second_batches_get_distinct_keys() {
        let date = PartitionDate {
            year: 2024,
            month: 3,
            day: 5,
        };
        let written_at = Utc.with_ymd_and_hms(2024, 3, 6, 7, 8, 9).unwrap();

        let first = partition_key(date, &written_at, "0123456789ab");
        let second = partition_key(date, &written_at, "ba9876543210");
        assert_ne!(first, second);
        assert!(is_partition_key(&first) && is_partition_key(&second));
    }

    #[test]
    fn test_is_partition_key() {
        assert!(is_partition_key(
            "silver/weather/year=2024/month=03/day=05/weather_070809_0123456789ab.parquet"
        ));
        assert!(!is_partition_key("silver/weather/_SUCCESS"));
        assert!(!is_partition_key("raw/weather/a.parquet"));
    }
}
