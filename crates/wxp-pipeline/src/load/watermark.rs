use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use super::warehouse::Warehouse;
use crate::error::PipelineResult;

/// High-water mark of loaded event times.
///
/// `Absent` means nothing has been loaded; it is not the same as any
/// concrete instant, the Unix epoch included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Watermark {
    Absent,
    At(DateTime<Utc>),
}

impl Watermark {
    /// Whether an observation at `observed` is newer than this mark
    pub fn admits(&self, observed: &DateTime<Utc>) -> bool {
        match self {
            Watermark::Absent => true,
            Watermark::At(mark) => observed > mark,
        }
    }
}

impl From<Option<DateTime<Utc>>> for Watermark {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Watermark::Absent, Watermark::At)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Watermark::Absent => write!(f, "absent"),
            Watermark::At(mark) => write!(f, "{}", mark.to_rfc3339()),
        }
    }
}

pub struct WatermarkReader {
    warehouse: Arc<dyn Warehouse>,
}

impl WatermarkReader {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Recompute the watermark from the warehouse.
    ///
    /// Warehouse failures propagate; there is no fallback watermark.
    #[instrument(skip(self))]
    pub async fn read(&self) -> PipelineResult<Watermark> {
        let watermark = Watermark::from(self.warehouse.max_observation_time().await?);
        info!(watermark = %watermark, "Read warehouse watermark");
        Ok(watermark)
    }
}
