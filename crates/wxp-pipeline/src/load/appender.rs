use std::sync::Arc;

use tracing::{debug, info, instrument};
use wxp_common::StructuredRecord;

use super::warehouse::{Warehouse, MAX_CHUNK_SIZE};
use crate::config::DEFAULT_LOAD_CHUNK_SIZE;
use crate::error::PipelineResult;

/// Bulk appender for the observations table
pub struct WarehouseAppender {
    warehouse: Arc<dyn Warehouse>,
    chunk_size: usize,
}

impl WarehouseAppender {
    /// A zero `chunk_size` falls back to the default; anything above
    /// [`MAX_CHUNK_SIZE`] is clamped so one INSERT stays under the bind limit.
    pub fn new(warehouse: Arc<dyn Warehouse>, chunk_size: usize) -> Self {
        let chunk_size = match chunk_size {
            0 => DEFAULT_LOAD_CHUNK_SIZE,
            n => n.min(MAX_CHUNK_SIZE),
        };

        Self {
            warehouse,
            chunk_size,
        }
    }

    /// Append `records` as plain inserts, returning the number of rows landed.
    ///
    /// An empty batch returns 0 without touching the warehouse. A failure in
    /// any chunk rolls back the whole append.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn append(&self, records: &[StructuredRecord]) -> PipelineResult<u64> {
        if records.is_empty() {
            debug!("Nothing to append");
            return Ok(0);
        }

        let chunks: Vec<&[StructuredRecord]> = records.chunks(self.chunk_size).collect();
        info!(
            "Appending {} observations in {} chunks",
            records.len(),
            chunks.len()
        );

        self.warehouse.append_chunks(&chunks).await
    }
}
