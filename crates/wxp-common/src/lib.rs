//! WXP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the weather pipeline.
//!
//! # Overview
//!
//! This crate provides the pieces every pipeline stage agrees on:
//!
//! - **Types**: the raw capture envelope and the flat structured observation
//! - **Error Handling**: common error and result types
//! - **Checksums**: content digests used to name silver partitions
//! - **Logging**: `tracing` subscriber setup shared by all binaries
//!
//! # Example
//!
//! ```no_run
//! use wxp_common::types::{parse_event_time, PartitionDate};
//!
//! fn partition_of(raw_time: &str) -> wxp_common::Result<PartitionDate> {
//!     let observed = parse_event_time(raw_time)?;
//!     Ok(PartitionDate::of(&observed))
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, WxpError};
pub use types::{RawMetadata, RawRecord, StructuredRecord};
