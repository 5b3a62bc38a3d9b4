//! Error types shared across the pipeline crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, WxpError>;

/// Errors raised by the shared types and helpers
#[derive(Error, Debug)]
pub enum WxpError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid timestamp '{value}': expected RFC 3339 or YYYY-MM-DDTHH:MM[:SS]")]
    InvalidTimestamp { value: String },

    #[error("Timestamp out of range: {0} microseconds")]
    TimestampOutOfRange(i64),
}
