//! Run sequencing
//!
//! Stages run strictly in order. The first fatal error stops the run and is
//! returned to the caller with the stage it came from; skipped fetches and
//! empty sources are ordinary outcomes.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::ingest::IngestStage;
use crate::load::{LoadReport, LoadStage};
use crate::transform::{TransformReport, TransformStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ingest,
    Transform,
    Load,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Ingest, Stage::Transform, Stage::Load];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Transform => "transform",
            Stage::Load => "load",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage did when it did not fail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StageOutcome {
    Ingested { run_id: Uuid, key: String },
    Skipped { reason: String },
    Transformed(TransformReport),
    Loaded(LoadReport),
    NothingToDo,
}

impl StageOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Ingested { .. } => "ingested",
            StageOutcome::Skipped { .. } => "skipped",
            StageOutcome::Transformed(_) => "transformed",
            StageOutcome::Loaded(_) => "loaded",
            StageOutcome::NothingToDo => "nothing_to_do",
        }
    }
}

#[derive(Debug, Error)]
#[error("{stage} stage failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub stages: Vec<StageReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|report| report.stage == stage)
            .map(|report| &report.outcome)
    }
}

/// Holds whichever stages the binary wired up and runs a selection of them
#[derive(Default)]
pub struct PipelineRunner {
    ingest: Option<IngestStage>,
    transform: Option<TransformStage>,
    load: Option<LoadStage>,
}

impl PipelineRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ingest(mut self, stage: IngestStage) -> Self {
        self.ingest = Some(stage);
        self
    }

    pub fn with_transform(mut self, stage: TransformStage) -> Self {
        self.transform = Some(stage);
        self
    }

    pub fn with_load(mut self, stage: LoadStage) -> Self {
        self.load = Some(stage);
        self
    }

    /// Run `stages` in the given order, stopping at the first failure
    pub async fn run(&self, stages: &[Stage]) -> Result<RunSummary, StageFailure> {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        for &stage in stages {
            let stage_started = Instant::now();
            info!(stage = %stage, "Stage started");

            match self.run_stage(stage).await {
                Ok(outcome) => {
                    let elapsed = stage_started.elapsed();
                    info!(
                        stage = %stage,
                        outcome = outcome.label(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Stage finished"
                    );
                    summary.stages.push(StageReport {
                        stage,
                        outcome,
                        elapsed,
                    });
                },
                Err(e) => {
                    error!(
                        stage = %stage,
                        error = %e,
                        elapsed_ms = stage_started.elapsed().as_millis() as u64,
                        "Stage failed"
                    );
                    return Err(StageFailure { stage, error: e });
                },
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            stages = summary.stages.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Pipeline run complete"
        );

        Ok(summary)
    }

    async fn run_stage(&self, stage: Stage) -> Result<StageOutcome, PipelineError> {
        match stage {
            Stage::Ingest => match &self.ingest {
                Some(ingest) => ingest.run().await,
                None => Err(not_configured(stage)),
            },
            Stage::Transform => match &self.transform {
                Some(transform) => transform.run().await,
                None => Err(not_configured(stage)),
            },
            Stage::Load => match &self.load {
                Some(load) => load.run().await,
                None => Err(not_configured(stage)),
            },
        }
    }
}

fn not_configured(stage: Stage) -> PipelineError {
    PipelineError::config(format!("{} stage was selected but not configured", stage))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SystemClock};
    use crate::error::FetchError;
    use crate::ingest::{RawRecordBuilder, WeatherSource};
    use crate::load::MemoryWarehouse;
    use crate::storage::MemoryStore;
    use crate::transform::PartitionWriter;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct Unreachable;

    #[async_trait]
    impl WeatherSource for Unreachable {
        async fn fetch(&self) -> Result<Value, FetchError> {
            Err(FetchError::Timeout)
        }
    }

    struct Fixed;

    #[async_trait]
    impl WeatherSource for Fixed {
        async fn fetch(&self) -> Result<Value, FetchError> {
            Ok(json!({
                "current_weather": {
                    "temperature": 27.5,
                    "windspeed": 12.0,
                    "winddirection": 300,
                    "weathercode": 0,
                    "time": "2024-06-01T12:00"
                }
            }))
        }
    }

    fn runner(
        source: Arc<dyn WeatherSource>,
        store: Arc<MemoryStore>,
        warehouse: Arc<MemoryWarehouse>,
    ) -> PipelineRunner {
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 1, 0).unwrap()));
        PipelineRunner::new()
            .with_ingest(IngestStage::new(
                source,
                RawRecordBuilder::new(store.clone(), Arc::new(SystemClock), "open-meteo"),
            ))
            .with_transform(TransformStage::new(
                store.clone(),
                store.clone(),
                PartitionWriter::new(store.clone(), clock),
            ))
            .with_load(LoadStage::new(store, warehouse, 1000))
    }

    #[tokio::test]
    async fn test_full_run_lands_observation() {
        let store = Arc::new(MemoryStore::new());
        let warehouse = Arc::new(MemoryWarehouse::new());

        let summary = runner(Arc::new(Fixed), store, warehouse.clone())
            .run(&Stage::ALL)
            .await
            .unwrap();

        assert_eq!(summary.stages.len(), 3);
        assert!(matches!(summary.outcome(Stage::Ingest), Some(StageOutcome::Ingested { .. })));
        assert!(matches!(summary.outcome(Stage::Load), Some(StageOutcome::Loaded(r)) if r.rows_appended == 1));
        assert_eq!(warehouse.rows().await.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_stop_run() {
        let store = Arc::new(MemoryStore::new());
        let warehouse = Arc::new(MemoryWarehouse::new());

        let summary = runner(Arc::new(Unreachable), store, warehouse)
            .run(&Stage::ALL)
            .await
            .unwrap();

        assert!(matches!(summary.outcome(Stage::Ingest), Some(StageOutcome::Skipped { .. })));
        assert_eq!(summary.outcome(Stage::Transform), Some(&StageOutcome::NothingToDo));
        assert_eq!(summary.outcome(Stage::Load), Some(&StageOutcome::NothingToDo));
    }

    #[tokio::test]
    async fn test_failure_stops_run_with_stage() {
        let store = Arc::new(MemoryStore::new());
        let warehouse = Arc::new(MemoryWarehouse::new());
        warehouse.fail_reads(true);
        let runner = runner(Arc::new(Fixed), store, warehouse.clone());

        let failure = runner.run(&Stage::ALL).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Load);
        assert!(matches!(failure.error, PipelineError::WarehouseConnect(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_stage_is_error() {
        let failure = PipelineRunner::new().run(&[Stage::Load]).await.unwrap_err();
        assert_eq!(failure.stage, Stage::Load);
        assert!(matches!(failure.error, PipelineError::Config(_)));
    }

    #[test]
    fn test_stage_names() {
        let names: Vec<String> = Stage::ALL.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["ingest", "transform", "load"]);
    }
}
