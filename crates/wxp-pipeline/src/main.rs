//! WXP - weather pipeline runner

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use wxp_common::logging::{init_logging, LogConfig, LogLevel};
use wxp_pipeline::clock::{Clock, SystemClock};
use wxp_pipeline::ingest::{IngestStage, RawRecordBuilder, WeatherClient};
use wxp_pipeline::load::{LoadStage, PgWarehouse};
use wxp_pipeline::storage::{BlobStore, S3Storage};
use wxp_pipeline::transform::{PartitionWriter, TransformStage};
use wxp_pipeline::{Config, PipelineRunner, Stage, StageOutcome};

/// Noisy dependency targets kept at warn unless overridden via LOG_FILTER
const DEPENDENCY_DIRECTIVES: &str = "aws_config=warn,aws_smithy_runtime=warn,hyper=warn,sqlx=warn";

#[derive(Parser, Debug)]
#[command(name = "wxp")]
#[command(author, version, about = "Incremental layered weather pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Fetch current weather and store it in the raw layer
    Ingest,

    /// Structure pending raw captures into silver partitions
    Transform,

    /// Append new silver rows to the warehouse
    Load,

    /// Run ingest, transform and load in order
    Run,
}

impl Command {
    fn stages(self) -> &'static [Stage] {
        match self {
            Command::Ingest => &[Stage::Ingest],
            Command::Transform => &[Stage::Transform],
            Command::Load => &[Stage::Load],
            Command::Run => &Stage::ALL,
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("wxp")
        .filter_directives(DEPENDENCY_DIRECTIVES)
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env().unwrap_or_else(|e| {
        eprintln!("Ignoring invalid LOG_* settings: {:#}", e);
        LogConfig::builder().level(log_level).build()
    });

    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            std::process::exit(1);
        },
    };

    if let Err(e) = run(cli.command).await {
        error!(error = %format!("{:#}", e), "Pipeline run failed");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let stages = command.stages();

    info!(
        stages = ?stages.iter().map(Stage::as_str).collect::<Vec<_>>(),
        raw_bucket = %config.raw_bucket,
        silver_bucket = %config.silver_bucket,
        "Starting pipeline"
    );

    let runner = build_runner(&config, stages).await?;
    let summary = runner.run(stages).await?;

    for report in &summary.stages {
        match &report.outcome {
            StageOutcome::Skipped { reason } => {
                info!(stage = %report.stage, reason = %reason, "Stage skipped");
            },
            StageOutcome::NothingToDo => {
                info!(stage = %report.stage, "Nothing to do");
            },
            _ => {},
        }
    }

    info!(elapsed_ms = summary.elapsed.as_millis() as u64, "Done");
    Ok(())
}

/// Wire up only the collaborators the selected stages need
async fn build_runner(config: &Config, stages: &[Stage]) -> Result<PipelineRunner> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let raw = S3Storage::connect(&config.storage, &config.raw_bucket)
        .await
        .context("Failed to initialize storage")?;
    let raw_store: Arc<dyn BlobStore> = Arc::new(raw.clone());
    let silver_store: Arc<dyn BlobStore> = Arc::new(raw.for_bucket(&config.silver_bucket));

    let mut runner = PipelineRunner::new();

    if stages.contains(&Stage::Ingest) {
        let client = WeatherClient::new(&config.weather)?;
        let builder = RawRecordBuilder::new(
            raw_store.clone(),
            clock.clone(),
            config.weather.source_system.clone(),
        );
        runner = runner.with_ingest(IngestStage::new(Arc::new(client), builder));
    }

    if stages.contains(&Stage::Transform) {
        let writer = PartitionWriter::new(silver_store.clone(), clock.clone());
        runner = runner.with_transform(TransformStage::new(raw_store, silver_store.clone(), writer));
    }

    if stages.contains(&Stage::Load) {
        // Connects and migrates on first use inside the load stage
        let warehouse = Arc::new(PgWarehouse::lazy(config.database.clone()));
        runner = runner.with_load(LoadStage::new(silver_store, warehouse, config.load.chunk_size));
    }

    Ok(runner)
}
