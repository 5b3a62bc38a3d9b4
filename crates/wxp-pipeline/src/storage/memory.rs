use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::BlobStore;
use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// In-process [`BlobStore`] with call counters and failure injection
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    puts: AtomicUsize,
    fail_puts: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }

    /// Place an object directly, bypassing counters
    pub async fn insert(&self, key: impl Into<String>, data: Vec<u8>) {
        self.objects.lock().await.insert(
            key.into(),
            StoredObject {
                data,
                content_type: "application/octet-stream".to_string(),
            },
        );
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> PipelineResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(PipelineError::storage("put", key, "injected failure"));
        }

        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn list(&self, prefix: &str) -> PipelineResult<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &str) -> PipelineResult<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| PipelineError::storage("get", key, "no such key"))
    }
}
