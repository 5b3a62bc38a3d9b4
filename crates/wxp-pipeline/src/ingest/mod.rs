//! Raw capture stage: fetch one payload and land it in the raw layer

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::error::PipelineResult;
use crate::pipeline::StageOutcome;

pub mod client;
pub mod raw;

pub use client::{WeatherClient, WeatherSource};
pub use raw::RawRecordBuilder;

pub struct IngestStage {
    source: Arc<dyn WeatherSource>,
    builder: RawRecordBuilder,
}

impl IngestStage {
    pub fn new(source: Arc<dyn WeatherSource>, builder: RawRecordBuilder) -> Self {
        Self { source, builder }
    }

    /// Fetch, wrap and store.
    ///
    /// A failed fetch produces no record and is reported as `Skipped`; only a
    /// storage failure is an error.
    #[instrument(skip(self))]
    pub async fn run(&self) -> PipelineResult<StageOutcome> {
        let payload = match self.source.fetch().await {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Weather fetch failed; no raw record produced");
                return Ok(StageOutcome::Skipped {
                    reason: e.to_string(),
                });
            },
        };

        let record = self.builder.build(payload);
        let key = self.builder.store(&record).await?;

        info!(run_id = %record.run_id(), key = %key, "Raw capture complete");

        Ok(StageOutcome::Ingested {
            run_id: record.run_id(),
            key,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::error::{FetchError, PipelineError};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct StaticSource(Result<Value, u16>);

    #[async_trait]
    impl WeatherSource for StaticSource {
        async fn fetch(&self) -> Result<Value, FetchError> {
            self.0.clone().map_err(FetchError::Status)
        }
    }

    fn stage(source: StaticSource, store: Arc<MemoryStore>) -> IngestStage {
        let builder = RawRecordBuilder::new(store, Arc::new(SystemClock), "open-meteo");
        IngestStage::new(Arc::new(source), builder)
    }

    #[tokio::test]
    async fn test_successful_fetch_is_stored() {
        let store = Arc::new(MemoryStore::new());
        let stage = stage(StaticSource(Ok(json!({"current_weather": {}}))), store.clone());

        let outcome = stage.run().await.unwrap();
        let StageOutcome::Ingested { run_id, key } = outcome else {
            panic!("expected Ingested, got {:?}", outcome);
        };
        assert_eq!(key, format!("raw/weather/{}.json", run_id));
        assert_eq!(store.keys().await, vec![key]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_skipped_without_write() {
        let store = Arc::new(MemoryStore::new());
        let stage = stage(StaticSource(Err(503)), store.clone());

        let outcome = stage.run().await.unwrap();
        assert!(matches!(outcome, StageOutcome::Skipped { ref reason } if reason.contains("503")));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_is_error() {
        let store = Arc::new(MemoryStore::new());
        store.fail_puts(true);
        let stage = stage(StaticSource(Ok(json!({}))), store);

        let err = stage.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
    }
}
