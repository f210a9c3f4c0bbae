//! Lead Scoring Pipeline - Main Entry Point
//!
//! Loads the configured classifier once, then scores every stored customer
//! either a single time (`run`) or on a fixed interval (`schedule`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lead_scoring_pipeline::config::{AppConfig, LoggingConfig};
use lead_scoring_pipeline::metrics::RunCounters;
use lead_scoring_pipeline::orchestrator::RunFailure;
use lead_scoring_pipeline::service::ScoringService;
use lead_scoring_pipeline::types::score::RunSummary;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type RunOutcome = std::result::Result<RunSummary, RunFailure>;

/// Batch lead scoring over the customer table
#[derive(Parser, Debug)]
#[command(name = "lead-scoring")]
#[command(about = "Score every stored customer with the configured classifier")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config/config.toml", env = "LEAD_SCORING_CONFIG")]
    config: PathBuf,

    /// Model variant to use instead of `models.active`
    #[arg(short, long)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one batch and print its summary (default)
    Run,
    /// Run a batch every interval until interrupted
    Schedule {
        /// Seconds between runs (default: pipeline.schedule_interval_secs)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load_from_path(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(model) = &cli.model {
        config.select_variant(model)?;
    }

    init_logging(&config.logging)?;

    info!("Starting Lead Scoring Pipeline");
    info!(
        variant = %config.models.active,
        database = %config.database.path,
        source = %config.database.source_table,
        results = %config.database.results_table,
        "Configuration loaded"
    );

    let interval_secs = match &cli.command {
        Some(Command::Schedule { interval_secs }) => {
            Some(interval_secs.unwrap_or(config.pipeline.schedule_interval_secs))
        }
        _ => None,
    };

    let service = Arc::new(ScoringService::new(config)?);

    // Load the model before accepting any run
    let loader = service.clone();
    tokio::task::spawn_blocking(move || loader.startup())
        .await
        .context("Model loading task failed")??;

    match interval_secs {
        Some(secs) => schedule(service, secs).await,
        None => run_once(service).await,
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("lead_scoring_pipeline={}", logging.level).parse()?)
        .add_directive(format!("lead_scoring={}", logging.level).parse()?);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn run_once(service: Arc<ScoringService>) -> Result<()> {
    let outcome = tokio::task::spawn_blocking(move || service.run_batch_scoring())
        .await
        .context("Scoring task failed")?;

    match outcome {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(failure) => {
            println!("{}", serde_json::to_string_pretty(&failure.report())?);
            Err(failure.into())
        }
    }
}

async fn schedule(service: Arc<ScoringService>, interval_secs: u64) -> Result<()> {
    let counters = RunCounters::new();
    let period = Duration::from_secs(interval_secs.max(1));

    info!(interval_secs = interval_secs, "Scheduler started");

    run_scheduled(&counters, period, tokio::signal::ctrl_c(), || {
        let service = service.clone();
        tokio::task::spawn_blocking(move || service.run_batch_scoring())
    })
    .await;

    info!("Scheduler shutting down...");
    counters.print_summary();

    Ok(())
}

/// Start a run on every tick until `shutdown` resolves. A run in flight when
/// the signal arrives is awaited so its batch commits or rolls back whole.
async fn run_scheduled<S, F>(counters: &RunCounters, period: Duration, shutdown: S, mut start_run: F)
where
    S: Future,
    F: FnMut() -> JoinHandle<RunOutcome>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut run = start_run();
                let stop = tokio::select! {
                    outcome = &mut run => {
                        record_outcome(counters, outcome);
                        false
                    }
                    _ = &mut shutdown => {
                        info!("Shutdown signal received, finishing current run");
                        record_outcome(counters, run.await);
                        true
                    }
                };
                if stop {
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }
}

fn record_outcome(counters: &RunCounters, outcome: std::result::Result<RunOutcome, JoinError>) {
    match outcome {
        Ok(Ok(summary)) => {
            counters.record_success(summary.total_processed);
            info!(
                total_processed = summary.total_processed,
                model_version = %summary.model_version,
                "Scheduled run succeeded"
            );
        }
        Ok(Err(failure)) => {
            counters.record_failure();
            error!(
                run_id = %failure.run_id,
                stage = %failure.stage,
                kind = failure.error.kind(),
                error = %failure.error,
                "Scheduled run failed"
            );
        }
        Err(e) => {
            counters.record_failure();
            error!(error = %e, "Scoring task aborted");
        }
    }
}
