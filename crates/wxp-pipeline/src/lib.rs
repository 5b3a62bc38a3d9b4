//! WXP Pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental layered weather ingestion: current-weather payloads are
//! captured into a raw layer, structured into date-partitioned Parquet files
//! (the silver layer) and appended to a warehouse table (the gold layer).
//!
//! Each stage is independently re-runnable:
//!
//! - [`ingest::IngestStage`] fetches one payload and stores it under
//!   `raw/weather/{run_id}.json`
//! - [`transform::TransformStage`] drains raw captures that have not reached
//!   the silver layer yet
//! - [`load::LoadStage`] appends silver rows strictly newer than the
//!   warehouse watermark
//!
//! [`pipeline::PipelineRunner`] runs a selection of stages in order and stops
//! at the first fatal error.

pub mod clock;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod load;
pub mod pipeline;
pub mod storage;
pub mod transform;

pub use config::Config;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{PipelineRunner, RunSummary, Stage, StageFailure, StageOutcome};
