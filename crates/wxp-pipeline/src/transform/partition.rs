//! Silver partition writer and reader

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use wxp_common::checksum::short_batch_digest;
use wxp_common::types::PartitionDate;
use wxp_common::StructuredRecord;

use crate::clock::Clock;
use crate::codec::{decode_partition, encode_partition};
use crate::error::{PartitionError, PipelineResult};
use crate::storage::keys::{is_partition_key, partition_key, PARQUET_CONTENT_TYPE, SILVER_PREFIX};
use crate::storage::BlobStore;

pub struct PartitionWriter {
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
}

impl PartitionWriter {
    pub fn new(store: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Encode a single-date batch and store it; returns the partition key.
    ///
    /// Nothing is written when the batch is empty or spans several dates.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn write(&self, records: &[StructuredRecord]) -> PipelineResult<String> {
        let date = ensure_single_date(records)?;
        let digest = short_batch_digest(records)?;
        let key = partition_key(date, &self.clock.now(), &digest);

        let body = encode_partition(records)?;
        let size = body.len();
        self.store.put(&key, body, PARQUET_CONTENT_TYPE).await?;

        info!(key = %key, date = %date, rows = records.len(), size, "Wrote partition");
        Ok(key)
    }
}

/// Date shared by every record, or why there is none
pub fn ensure_single_date(records: &[StructuredRecord]) -> Result<PartitionDate, PartitionError> {
    let first = records.first().ok_or(PartitionError::Empty)?.partition_date();

    match records.iter().map(|r| r.partition_date()).find(|date| *date != first) {
        Some(other) => Err(PartitionError::MixedDates { first, other }),
        None => Ok(first),
    }
}

/// Group records by partition date, dates ascending, input order kept per group
pub fn split_by_date(records: Vec<StructuredRecord>) -> Vec<Vec<StructuredRecord>> {
    let mut groups: BTreeMap<PartitionDate, Vec<StructuredRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.partition_date()).or_default().push(record);
    }
    groups.into_values().collect()
}

/// Decode every partition under the silver prefix.
///
/// Returns the number of partitions read alongside their rows.
pub async fn read_partitions(store: &dyn BlobStore) -> PipelineResult<(usize, Vec<StructuredRecord>)> {
    let keys: Vec<String> = store
        .list(SILVER_PREFIX)
        .await?
        .into_iter()
        .filter(|key| is_partition_key(key))
        .collect();

    let mut records = Vec::new();
    for key in &keys {
        let rows = decode_partition(store.get(key).await?)?;
        debug!(key = %key, rows = rows.len(), "Read partition");
        records.extend(rows);
    }

    Ok((keys.len(), records))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::PipelineError;
    use crate::storage::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    fn record(observed: DateTime<Utc>, temperature: f64) -> StructuredRecord {
        StructuredRecord {
            run_id: Uuid::from_u128(7),
            ingestion_time: observed,
            temperature,
            windspeed: 3.0,
            winddirection: 90.0,
            weathercode: 0,
            observation_time: observed,
        }
    }

    fn writer(store: Arc<MemoryStore>) -> PartitionWriter {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 6, 3, 14, 5, 9).unwrap());
        PartitionWriter::new(store, Arc::new(clock))
    }

    #[tokio::test]
    async fn test_write_places_partition_by_observation_date() {
        let store = Arc::new(MemoryStore::new());
        let records = vec![record(at(1, 8), 20.0), record(at(1, 9), 21.0)];

        let key = writer(store.clone()).write(&records).await.unwrap();
        assert!(key.starts_with("silver/weather/year=2024/month=06/day=01/weather_140509_"));
        assert!(key.ends_with(".parquet"));

        let object = store.object(&key).await.unwrap();
        assert_eq!(object.content_type, PARQUET_CONTENT_TYPE);
        assert_eq!(decode_partition(object.data).unwrap(), records);
    }

    #[tokio::test]
    async fn test_same_batch_same_second_same_key() {
        let store = Arc::new(MemoryStore::new());
        let writer = writer(store.clone());
        let records = vec![record(at(1, 8), 20.0)];

        let first = writer.write(&records).await.unwrap();
        let second = writer.write(&records).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.keys().await.len(), 1);
    }

    #[tokio::test]
    async fn test_different_batches_same_second_do_not_collide() {
        let store = Arc::new(MemoryStore::new());
        let writer = writer(store.clone());

        let first = writer.write(&[record(at(1, 8), 20.0)]).await.unwrap();
        let second = writer.write(&[record(at(1, 8), 20.5)]).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.keys().await.len(), 2);
    }

    #[tokio::test]
    async fn test_mixed_dates_rejected_without_write() {
        let store = Arc::new(MemoryStore::new());
        let records = vec![record(at(1, 23), 20.0), record(at(2, 0), 19.0)];

        let err = writer(store.clone()).write(&records).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Partition(PartitionError::MixedDates { .. })
        ));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let store = Arc::new(MemoryStore::new());
        let err = writer(store.clone()).write(&[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Partition(PartitionError::Empty)));
        assert_eq!(store.put_count(), 0);
    }

    #[test]
    fn test_split_by_date_orders_dates_and_keeps_input_order() {
        let records = vec![
            record(at(2, 5), 1.0),
            record(at(1, 9), 2.0),
            record(at(2, 1), 3.0),
            record(at(1, 3), 4.0),
        ];

        let groups = split_by_date(records);
        let temperatures: Vec<Vec<f64>> = groups
            .iter()
            .map(|g| g.iter().map(|r| r.temperature).collect())
            .collect();
        assert_eq!(temperatures, vec![vec![2.0, 4.0], vec![1.0, 3.0]]);
        assert!(groups.iter().all(|g| ensure_single_date(g).is_ok()));
    }

    #[tokio::test]
    async fn test_read_partitions_skips_foreign_objects() {
        let store = Arc::new(MemoryStore::new());
        let writer = writer(store.clone());
        writer.write(&[record(at(1, 8), 20.0)]).await.unwrap();
        writer.write(&[record(at(2, 8), 22.0)]).await.unwrap();
        store.insert("silver/weather/_SUCCESS", Vec::new()).await;

        let (partitions, records) = read_partitions(store.as_ref()).await.unwrap();
        assert_eq!(partitions, 2);
        assert_eq!(records.len(), 2);
    }
}
