use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use wxp_common::StructuredRecord;

use super::warehouse::Warehouse;
use crate::error::{PipelineError, PipelineResult};

/// In-process [`Warehouse`] recording every call it receives
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    rows: Mutex<Vec<StructuredRecord>>,
    chunk_sizes: Mutex<Vec<usize>>,
    append_calls: AtomicUsize,
    watermark_reads: AtomicUsize,
    fail_reads: AtomicBool,
    fail_after_chunks: Mutex<Option<usize>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rows(&self) -> Vec<StructuredRecord> {
        self.rows.lock().await.clone()
    }

    /// Row count per chunk over all appends so far
    pub async fn chunk_sizes(&self) -> Vec<usize> {
        self.chunk_sizes.lock().await.clone()
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    pub fn watermark_reads(&self) -> usize {
        self.watermark_reads.load(Ordering::SeqCst)
    }

    /// Make watermark reads fail as if the warehouse were unreachable
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail the next append once `chunks` chunks have been inserted
    pub async fn fail_after_chunks(&self, chunks: usize) {
        *self.fail_after_chunks.lock().await = Some(chunks);
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn max_observation_time(&self) -> PipelineResult<Option<DateTime<Utc>>> {
        self.watermark_reads.fetch_add(1, Ordering::SeqCst);

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PipelineError::WarehouseConnect(
                "injected connection failure".to_string(),
            ));
        }

        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .map(|r| r.observation_time)
            .max())
    }

    async fn append_chunks(&self, chunks: &[&[StructuredRecord]]) -> PipelineResult<u64> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let fail_after = self.fail_after_chunks.lock().await.take();

        let mut staged = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            if fail_after == Some(idx) {
                return Err(PipelineError::WarehouseQuery(format!(
                    "injected failure on chunk {}",
                    idx + 1
                )));
            }
            staged.extend_from_slice(chunk);
        }

        self.chunk_sizes
            .lock()
            .await
            .extend(chunks.iter().map(|chunk| chunk.len()));

        let inserted = staged.len() as u64;
        self.rows.lock().await.extend(staged);
        Ok(inserted)
    }
}
