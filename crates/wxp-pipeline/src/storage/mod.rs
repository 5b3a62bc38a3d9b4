//! Blob storage for the raw and silver layers
//!
//! Stages only see the [`BlobStore`] trait. [`S3Storage`] talks to S3 or any
//! S3-compatible endpoint (MinIO), [`MemoryStore`] backs tests.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

use crate::error::{PipelineError, PipelineResult};

pub mod config;
pub mod keys;
pub mod memory;

pub use memory::MemoryStore;

/// Minimal object store contract used by the pipeline stages.
///
/// Keys are full object paths inside one bucket. `list` returns keys in
/// lexicographic order.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> PipelineResult<()>;

    async fn list(&self, prefix: &str) -> PipelineResult<Vec<String>>;

    async fn get(&self, key: &str) -> PipelineResult<Vec<u8>>;
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Build a client from `config` bound to `bucket`.
    ///
    /// Static credentials are used when both keys are set, otherwise the
    /// default AWS provider chain.
    pub async fn connect(config: &config::StorageConfig, bucket: &str) -> PipelineResult<Self> {
        debug!(
            region = %config.region,
            endpoint = ?config.endpoint,
            path_style = config.path_style,
            "Initializing storage client"
        );

        let mut builder = if config.has_static_credentials() {
            let credentials = Credentials::new(
                &config.access_key,
                &config.secret_key,
                None,
                None,
                "wxp-storage",
            );
            aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(credentials)
                .region(Region::new(config.region.clone()))
        } else {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()))
                .load()
                .await;
            aws_sdk_s3::config::Builder::from(&shared)
        };

        builder = builder.force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(bucket = %bucket, "Storage client initialized");

        Ok(Self {
            client,
            bucket: bucket.to_string(),
        })
    }

    /// Same client, different bucket
    pub fn for_bucket(&self, bucket: &str) -> Self {
        Self {
            client: self.client.clone(),
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for S3Storage {
    #[instrument(skip(self, data), fields(bucket = %self.bucket))]
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> PipelineResult<()> {
        let size = data.len();
        debug!("Uploading {} bytes to s3://{}/{}", size, self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| PipelineError::storage("put", key, DisplayErrorContext(&e)))?;

        info!(size, "Uploaded s3://{}/{}", self.bucket, key);

        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list(&self, prefix: &str) -> PipelineResult<Vec<String>> {
        debug!("Listing objects in s3://{}/{}", self.bucket, prefix);

        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page =
                page.map_err(|e| PipelineError::storage("list", prefix, DisplayErrorContext(&e)))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
        }

        keys.sort();
        debug!(count = keys.len(), "Listed s3://{}/{}", self.bucket, prefix);

        Ok(keys)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get(&self, key: &str) -> PipelineResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| PipelineError::storage("get", key, DisplayErrorContext(&e)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| PipelineError::storage("read body of", key, e))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);

        Ok(data)
    }
}
