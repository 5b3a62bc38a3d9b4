//! Structuring stage: raw captures to date-partitioned Parquet
//!
//! Every raw object whose run has not yet reached the silver layer is
//! extracted. Which runs have landed is derived from the `run_id` column of
//! the existing partitions, so no separate cursor is kept.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::PipelineResult;
use crate::pipeline::StageOutcome;
use crate::storage::keys::{run_id_from_raw_key, RAW_PREFIX};
use crate::storage::BlobStore;

pub mod extractor;
pub mod partition;

pub use extractor::StructuredExtractor;
pub use partition::{ensure_single_date, read_partitions, split_by_date, PartitionWriter};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransformReport {
    pub raw_objects_seen: usize,
    pub already_landed: usize,
    pub rejected: usize,
    pub records_written: usize,
    pub partitions: Vec<String>,
}

pub struct TransformStage {
    raw_store: Arc<dyn BlobStore>,
    silver_store: Arc<dyn BlobStore>,
    extractor: StructuredExtractor,
    writer: PartitionWriter,
}

impl TransformStage {
    pub fn new(
        raw_store: Arc<dyn BlobStore>,
        silver_store: Arc<dyn BlobStore>,
        writer: PartitionWriter,
    ) -> Self {
        Self {
            raw_store,
            silver_store,
            extractor: StructuredExtractor::new(),
            writer,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> PipelineResult<StageOutcome> {
        let raw_keys = self.raw_store.list(RAW_PREFIX).await?;
        if raw_keys.is_empty() {
            info!("No raw records found; nothing to do");
            return Ok(StageOutcome::NothingToDo);
        }

        let landed = self.landed_run_ids().await?;
        let mut report = TransformReport {
            raw_objects_seen: raw_keys.len(),
            ..TransformReport::default()
        };

        let mut records = Vec::new();
        for key in &raw_keys {
            if run_id_from_raw_key(key).is_some_and(|run_id| landed.contains(&run_id)) {
                report.already_landed += 1;
                continue;
            }

            let bytes = self.raw_store.get(key).await?;
            let extracted = self
                .extractor
                .decode_raw(&bytes)
                .and_then(|raw| self.extractor.extract(&raw));

            match extracted {
                Ok(record) if landed.contains(&record.run_id) => {
                    report.already_landed += 1;
                },
                Ok(record) => {
                    debug!(key = %key, observation_time = %record.observation_time, "Extracted record");
                    records.push(record);
                },
                Err(e) => {
                    warn!(key = %key, path = %e.path(), error = %e, "Skipping raw record");
                    report.rejected += 1;
                },
            }
        }

        if records.is_empty() {
            info!(
                seen = report.raw_objects_seen,
                already_landed = report.already_landed,
                rejected = report.rejected,
                "No new raw records to structure; nothing to do"
            );
            return Ok(StageOutcome::NothingToDo);
        }

        for group in split_by_date(records) {
            let key = self.writer.write(&group).await?;
            report.records_written += group.len();
            report.partitions.push(key);
        }

        info!(
            records = report.records_written,
            partitions = report.partitions.len(),
            rejected = report.rejected,
            "Structuring complete"
        );

        Ok(StageOutcome::Transformed(report))
    }

    async fn landed_run_ids(&self) -> PipelineResult<HashSet<Uuid>> {
        let (partitions, records) = read_partitions(self.silver_store.as_ref()).await?;
        let run_ids: HashSet<Uuid> = records.into_iter().map(|r| r.run_id).collect();
        debug!(partitions, runs = run_ids.len(), "Derived landed runs from silver layer");
        Ok(run_ids)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ingest::RawRecordBuilder;
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    struct Fixture {
        raw: Arc<MemoryStore>,
        silver: Arc<MemoryStore>,
        builder: RawRecordBuilder,
        stage: TransformStage,
    }

    fn fixture() -> Fixture {
        let raw = Arc::new(MemoryStore::new());
        let silver = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 2, 0, 5, 0).unwrap()));

        let builder = RawRecordBuilder::new(raw.clone(), clock.clone(), "open-meteo");
        let writer = PartitionWriter::new(silver.clone(), clock);
        let stage = TransformStage::new(raw.clone(), silver.clone(), writer);

        Fixture {
            raw,
            silver,
            builder,
            stage,
        }
    }

    fn payload(time: &str, temperature: f64) -> serde_json::Value {
        json!({
            "current_weather": {
                "temperature": temperature,
                "windspeed": 5.4,
                "winddirection": 200,
                "weathercode": 1,
                "time": time
            }
        })
    }

    async fn capture(fixture: &Fixture, payload: serde_json::Value) {
        let record = fixture.builder.build(payload);
        fixture.builder.store(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_raw_layer_is_nothing_to_do() {
        let fixture = fixture();
        assert_eq!(fixture.stage.run().await.unwrap(), StageOutcome::NothingToDo);
        assert_eq!(fixture.silver.put_count(), 0);
    }

    #[tokio::test]
    async fn test_drains_backlog_into_one_partition_per_date() {
        let fixture = fixture();
        capture(&fixture, payload("2024-06-01T22:00", 19.0)).await;
        capture(&fixture, payload("2024-06-01T23:00", 18.5)).await;
        capture(&fixture, payload("2024-06-02T00:00", 18.0)).await;

        let StageOutcome::Transformed(report) = fixture.stage.run().await.unwrap() else {
            panic!("expected a transform report");
        };
        assert_eq!(report.raw_objects_seen, 3);
        assert_eq!(report.records_written, 3);
        assert_eq!(report.partitions.len(), 2);
        assert!(report.partitions[0].contains("day=01"));
        assert!(report.partitions[1].contains("day=02"));
    }

    #[tokio::test]
    async fn test_second_run_skips_landed_runs() {
        let fixture = fixture();
        capture(&fixture, payload("2024-06-01T22:00", 19.0)).await;
        fixture.stage.run().await.unwrap();

        assert_eq!(fixture.stage.run().await.unwrap(), StageOutcome::NothingToDo);

        capture(&fixture, payload("2024-06-01T23:00", 18.5)).await;
        let StageOutcome::Transformed(report) = fixture.stage.run().await.unwrap() else {
            panic!("expected a transform report");
        };
        assert_eq!(report.already_landed, 1);
        assert_eq!(report.records_written, 1);
    }

    #[tokio::test]
    async fn test_schema_errors_are_skipped() {
        let fixture = fixture();
        capture(&fixture, json!({"current_weather": {"windspeed": 1.0}})).await;
        capture(&fixture, payload("2024-06-01T22:00", 19.0)).await;
        fixture.raw.insert("raw/weather/garbage.json", b"{".to_vec()).await;

        let StageOutcome::Transformed(report) = fixture.stage.run().await.unwrap() else {
            panic!("expected a transform report");
        };
        assert_eq!(report.rejected, 2);
        assert_eq!(report.records_written, 1);
    }
}
