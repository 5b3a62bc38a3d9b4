//! Pipeline error types
//!
//! Lower layers return these typed errors; only the run sequencer decides
//! whether a failure stops the run. Record-scoped errors ([`SchemaError`]) and
//! fetch failures ([`FetchError`]) are handled inside their stage and never
//! stop a run on their own.

use thiserror::Error;
use wxp_common::types::PartitionDate;
use wxp_common::WxpError;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Postgres SQLSTATE for a relation that does not exist
pub const PG_UNDEFINED_TABLE: &str = "42P01";

/// Failure to obtain a payload from the weather API.
///
/// Transient by nature: the next scheduled run retries, never the current one.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("weather API request timed out")]
    Timeout,

    #[error("network connection to weather API failed: {0}")]
    Connection(String),

    #[error("weather API returned HTTP {0}")]
    Status(u16),

    #[error("weather API response is not valid JSON: {0}")]
    Malformed(String),

    #[error("weather API request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Request(err.to_string())
        }
    }
}

/// Why a required field was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaErrorKind {
    #[error("required field is missing")]
    Missing,

    #[error("{0}")]
    Invalid(String),
}

/// A raw record that cannot be projected into the structured schema.
///
/// Scoped to one record: the record is dropped and the batch continues.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("schema error at '{path}': {kind}")]
pub struct SchemaError {
    pub path: String,
    pub kind: SchemaErrorKind,
}

impl SchemaError {
    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: SchemaErrorKind::Missing,
        }
    }

    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: SchemaErrorKind::Invalid(reason.into()),
        }
    }

    /// Dotted path of the offending field (e.g. `payload.current_weather.time`)
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_missing(&self) -> bool {
        self.kind == SchemaErrorKind::Missing
    }
}

/// Partition writer precondition violations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PartitionError {
    #[error("cannot write an empty partition")]
    Empty,

    #[error("partition batch mixes dates {first} and {other}; split by date before writing")]
    MixedDates {
        first: PartitionDate,
        other: PartitionDate,
    },
}

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Warehouse connection error: {0}. Check DATABASE_URL and that the warehouse is reachable.")]
    WarehouseConnect(String),

    #[error("Warehouse query error: {0}")]
    WarehouseQuery(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] WxpError),
}

impl PipelineError {
    /// Storage failure with the operation and object key for context
    pub fn storage(operation: &str, key: &str, cause: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{} '{}' failed: {}", operation, key, cause))
    }

    pub fn codec(cause: impl std::fmt::Display) -> Self {
        Self::Codec(cause.to_string())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => PipelineError::WarehouseConnect(err.to_string()),
            other => PipelineError::WarehouseQuery(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for PipelineError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        PipelineError::WarehouseQuery(format!("migration failed: {}", err))
    }
}

impl From<arrow::error::ArrowError> for PipelineError {
    fn from(err: arrow::error::ArrowError) -> Self {
        PipelineError::codec(err)
    }
}

impl From<parquet::errors::ParquetError> for PipelineError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        PipelineError::codec(err)
    }
}
