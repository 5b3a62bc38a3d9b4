//! Warehouse stage: incremental, watermark-driven append
//!
//! Each run re-reads the whole silver layer, keeps what is strictly newer
//! than the warehouse watermark and appends it. Re-running after a
//! successful load appends nothing.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use crate::error::PipelineResult;
use crate::pipeline::StageOutcome;
use crate::storage::BlobStore;
use crate::transform::read_partitions;

pub mod appender;
pub mod filter;
pub mod memory;
pub mod warehouse;
pub mod watermark;

pub use appender::WarehouseAppender;
pub use filter::{dedup_by_event_time, filter};
pub use memory::MemoryWarehouse;
pub use warehouse::{PgWarehouse, Warehouse};
pub use watermark::{Watermark, WatermarkReader};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub partitions_read: usize,
    pub rows_read: usize,
    pub watermark: Watermark,
    pub rows_new: usize,
    pub rows_appended: u64,
}

pub struct LoadStage {
    silver_store: Arc<dyn BlobStore>,
    reader: WatermarkReader,
    appender: WarehouseAppender,
}

impl LoadStage {
    pub fn new(silver_store: Arc<dyn BlobStore>, warehouse: Arc<dyn Warehouse>, chunk_size: usize) -> Self {
        Self {
            silver_store,
            reader: WatermarkReader::new(warehouse.clone()),
            appender: WarehouseAppender::new(warehouse, chunk_size),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> PipelineResult<StageOutcome> {
        let (partitions_read, records) = read_partitions(self.silver_store.as_ref()).await?;
        if partitions_read == 0 {
            info!("No silver partitions found; nothing to do");
            return Ok(StageOutcome::NothingToDo);
        }

        let rows_read = records.len();
        let watermark = self.reader.read().await?;

        let fresh = filter(records, &watermark);
        let filtered = fresh.len();
        let fresh = dedup_by_event_time(fresh);

        info!(
            rows_read,
            watermark = %watermark,
            rows_new = filtered,
            duplicates_dropped = filtered - fresh.len(),
            "Selected observations newer than watermark"
        );

        let rows_appended = self.appender.append(&fresh).await?;

        Ok(StageOutcome::Loaded(LoadReport {
            partitions_read,
            rows_read,
            watermark,
            rows_new: fresh.len(),
            rows_appended,
        }))
    }
}
