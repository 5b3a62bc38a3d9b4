use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;
use wxp_common::{RawMetadata, RawRecord};

use crate::clock::Clock;
use crate::error::PipelineResult;
use crate::storage::keys::{raw_key, JSON_CONTENT_TYPE};
use crate::storage::BlobStore;

/// Wraps fetched payloads in run metadata and lands them in the raw layer
pub struct RawRecordBuilder {
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    source_system: String,
}

impl RawRecordBuilder {
    pub fn new(store: Arc<dyn BlobStore>, clock: Arc<dyn Clock>, source_system: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            source_system: source_system.into(),
        }
    }

    /// Stamp `payload` with a fresh run id and the current UTC time
    pub fn build(&self, payload: Value) -> RawRecord {
        RawRecord {
            metadata: RawMetadata {
                ingestion_timestamp: self.clock.now(),
                source_system: self.source_system.clone(),
                run_id: Uuid::new_v4(),
            },
            payload,
        }
    }

    /// Write the record under its run-derived key and return the key.
    ///
    /// Storing the same record again overwrites it with identical bytes.
    #[instrument(skip(self, record), fields(run_id = %record.run_id()))]
    pub async fn store(&self, record: &RawRecord) -> PipelineResult<String> {
        let key = raw_key(record.run_id());
        let body = serde_json::to_vec_pretty(record)?;

        self.store.put(&key, body, JSON_CONTENT_TYPE).await?;

        info!(key = %key, "Stored raw record");
        Ok(key)
    }
}
