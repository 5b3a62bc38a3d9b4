//! Incremental selection of records newer than the watermark

use wxp_common::StructuredRecord;

use super::watermark::Watermark;

/// Records strictly newer than `watermark`, sorted by event time then run.
///
/// An absent watermark admits everything. Records exactly at the watermark
/// are considered loaded.
pub fn filter(records: Vec<StructuredRecord>, watermark: &Watermark) -> Vec<StructuredRecord> {
    let mut fresh: Vec<StructuredRecord> = records
        .into_iter()
        .filter(|record| watermark.admits(&record.observation_time))
        .collect();
    fresh.sort_by(|a, b| {
        a.observation_time
            .cmp(&b.observation_time)
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
    fresh
}

/// Keep the first record per event time of a sorted batch
pub fn dedup_by_event_time(mut records: Vec<StructuredRecord>) -> Vec<StructuredRecord> {
    records.dedup_by(|later, earlier| later.observation_time == earlier.observation_time);
    records
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    fn record(observed: DateTime<Utc>, run: u128) -> StructuredRecord {
        StructuredRecord {
            run_id: Uuid::from_u128(run),
            ingestion_time: observed,
            temperature: 20.0,
            windspeed: 1.0,
            winddirection: 0.0,
            weathercode: 0,
            observation_time: observed,
        }
    }

    #[test]
    fn test_absent_watermark_keeps_everything() {
        let records = vec![record(t0(), 1), record(t0() - Duration::days(400), 2)];
        assert_eq!(filter(records, &Watermark::Absent).len(), 2);
    }

    #[test]
    fn test_boundary_is_exclusive() {
        let records = vec![
            record(t0(), 1),
            record(t0() + Duration::seconds(1), 2),
            record(t0() - Duration::seconds(1), 3),
        ];

        let kept = filter(records, &Watermark::At(t0()));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].observation_time, t0() + Duration::seconds(1));
    }

    #[test]
    fn test_output_sorted_by_time_then_run() {
        let later = t0() + Duration::minutes(15);
        let records = vec![record(later, 1), record(t0(), 9), record(t0(), 4)];

        let runs: Vec<u128> = filter(records, &Watermark::Absent)
            .iter()
            .map(|r| r.run_id.as_u128())
            .collect();
        assert_eq!(runs, vec![4, 9, 1]);
    }

    #[test]
    fn test_empty_input() {
        assert!(filter(Vec::new(), &Watermark::At(t0())).is_empty());
    }

    #[test]
    fn test_dedup_keeps_first_per_event_time() {
        let sorted = filter(
            vec![record(t0(), 2), record(t0(), 1), record(t0() + Duration::minutes(15), 3)],
            &Watermark::Absent,
        );

        let deduped = dedup_by_event_time(sorted);
        let runs: Vec<u128> = deduped.iter().map(|r| r.run_id.as_u128()).collect();
        assert_eq!(runs, vec![1, 3]);
    }
}
