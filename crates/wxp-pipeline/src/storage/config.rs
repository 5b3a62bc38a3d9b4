use serde::{Deserialize, Serialize};

use crate::config::parse_var;
use crate::error::PipelineResult;

pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Connection settings shared by the raw and silver buckets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_S3_REGION.to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            path_style: false,
        }
    }
}

impl StorageConfig {
    pub fn from_lookup<F>(lookup: &F) -> PipelineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            endpoint: lookup("S3_ENDPOINT").filter(|e| !e.is_empty()),
            region: lookup("S3_REGION").unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
            access_key: lookup("S3_ACCESS_KEY")
                .or_else(|| lookup("AWS_ACCESS_KEY_ID"))
                .unwrap_or_default(),
            secret_key: lookup("S3_SECRET_KEY")
                .or_else(|| lookup("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_default(),
            path_style: parse_var(lookup, "S3_PATH_STYLE", false)?,
        })
    }

    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_S3_REGION.to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
        }
    }

    /// Whether static credentials were supplied; otherwise the AWS default
    /// provider chain (profile, instance role) is used.
    pub fn has_static_credentials(&self) -> bool {
        !self.access_key.is_empty() && !self.secret_key.is_empty()
    }
}
