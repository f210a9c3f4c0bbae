//! Batch orchestrator
//!
//! One run walks `Idle → Fetching → Building → Scoring → Writing → Done`.
//! Any stage error moves the run to `Failed` and surfaces as a single
//! [`RunFailure`]; nothing is retried and nothing is resumed.

use crate::config::{AppConfig, ModelVariant};
use crate::error::{PipelineError, Result};
use crate::feature_builder::FeatureBuilder;
use crate::metrics::RunMetrics;
use crate::models::inference::Scorer;
use crate::source::RecordSource;
use crate::store::Store;
use crate::types::score::{RunStatus, RunSummary, ScoreRecord};
use crate::writer::ResultWriter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

/// Stage of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Fetching,
    Building,
    Scoring,
    Writing,
    Done,
    Failed,
}

impl RunState {
    /// The only stage that may follow this one on success.
    pub fn next(&self) -> Option<RunState> {
        match self {
            RunState::Idle => Some(RunState::Fetching),
            RunState::Fetching => Some(RunState::Building),
            RunState::Building => Some(RunState::Scoring),
            RunState::Scoring => Some(RunState::Writing),
            RunState::Writing => Some(RunState::Done),
            RunState::Done | RunState::Failed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Fetching => "fetching",
            RunState::Building => "building",
            RunState::Scoring => "scoring",
            RunState::Writing => "writing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run that stopped before `Done`.
#[derive(Debug, Error)]
#[error("Scoring run {run_id} failed during {stage}: {error}")]
pub struct RunFailure {
    pub run_id: Uuid,
    /// Stage that failed; `Idle` when the run never started
    pub stage: RunState,
    #[source]
    pub error: PipelineError,
}

impl RunFailure {
    /// Failure of a run that could not leave `Idle`.
    pub fn not_started(error: PipelineError) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stage: RunState::Idle,
            error,
        }
    }

    pub fn report(&self) -> FailureReport {
        FailureReport {
            status: RunStatus::Error,
            run_id: self.run_id,
            stage: self.stage,
            kind: self.error.kind(),
            message: self.error.to_string(),
        }
    }
}

/// What a failed run reports back to its trigger.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub status: RunStatus,
    pub run_id: Uuid,
    pub stage: RunState,
    pub kind: &'static str,
    pub message: String,
}

/// Bookkeeping for a single run.
struct BatchRun {
    run_id: Uuid,
    state: RunState,
    metrics: RunMetrics,
}

impl BatchRun {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: RunState::Idle,
            metrics: RunMetrics::new(),
        }
    }

    /// Enter `stage` and run it. Stages must be entered in order.
    fn step<T, F>(&mut self, stage: RunState, f: F) -> std::result::Result<T, RunFailure>
    where
        F: FnOnce(&RunMetrics) -> Result<T>,
    {
        debug_assert_eq!(
            self.state.next(),
            Some(stage),
            "cannot enter {} from {}",
            stage,
            self.state
        );
        self.state = stage;

        debug!(stage = %stage, "Stage started");
        let started = Instant::now();

        match f(&self.metrics) {
            Ok(value) => {
                let elapsed = started.elapsed();
                self.metrics.record_stage(stage.as_str(), elapsed);
                info!(
                    stage = %stage,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    "Stage complete"
                );
                Ok(value)
            }
            Err(error) => {
                self.state = RunState::Failed;
                error!(stage = %stage, kind = error.kind(), error = %error, "Stage failed");
                Err(RunFailure {
                    run_id: self.run_id,
                    stage,
                    error,
                })
            }
        }
    }

    fn finish(&mut self) {
        debug_assert_eq!(self.state.next(), Some(RunState::Done));
        self.state = RunState::Done;
        self.metrics.print_summary();
    }
}

/// Fetch, build, score and write one full batch.
pub struct BatchOrchestrator {
    store: Store,
    source: RecordSource,
    builder: FeatureBuilder,
    writer: ResultWriter,
    scorer: Arc<dyn Scorer>,
    model_version: String,
    ensure_results_table: bool,
    clock: fn() -> DateTime<Utc>,
}

impl BatchOrchestrator {
    pub fn new(
        store: Store,
        source: RecordSource,
        builder: FeatureBuilder,
        writer: ResultWriter,
        scorer: Arc<dyn Scorer>,
        model_version: &str,
    ) -> Self {
        Self {
            store,
            source,
            builder,
            writer,
            scorer,
            model_version: model_version.to_string(),
            ensure_results_table: true,
            clock: Utc::now,
        }
    }

    /// Wire an orchestrator for the active model variant.
    pub fn from_config(config: &AppConfig, scorer: Arc<dyn Scorer>) -> anyhow::Result<Self> {
        let variant = config.active_variant()?;
        Ok(Self::for_variant(config, variant, scorer))
    }

    /// Wire an orchestrator for `variant`, taking tables and store from `config`.
    pub fn for_variant(config: &AppConfig, variant: &ModelVariant, scorer: Arc<dyn Scorer>) -> Self {
        let builder =
            FeatureBuilder::new(variant.adapter).with_id_column(&config.pipeline.id_column);

        Self::new(
            Store::from_config(&config.database),
            RecordSource::new(&config.database.source_table),
            builder,
            ResultWriter::new(&config.database.results_table),
            scorer,
            &variant.version,
        )
        .with_ensure_results_table(config.database.create_results_table)
    }

    pub fn with_ensure_results_table(mut self, ensure: bool) -> Self {
        self.ensure_results_table = ensure;
        self
    }

    /// Source of the per-run calculation timestamp.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Execute one run to completion or first failure.
    pub fn run(&self) -> std::result::Result<RunSummary, RunFailure> {
        let mut run = BatchRun::new(Uuid::new_v4());
        let span = info_span!("batch_run", run_id = %run.run_id, model_version = %self.model_version);
        let _enter = span.enter();

        info!(scorer = %self.scorer.name(), "Batch run started");

        let (mut conn, rows) = run.step(RunState::Fetching, |metrics| {
            let conn = self.store.connect()?;
            let rows = self.source.fetch(&conn)?;
            metrics.record_fetched(rows.len());
            Ok((conn, rows))
        })?;

        let (entity_ids, features) =
            run.step(RunState::Building, |_| self.builder.build(rows))?;

        let records = run.step(RunState::Scoring, |metrics| {
            self.scorer.schema().check(&features)?;
            let scores = self.scorer.predict_proba(&features)?;
            metrics.record_scores(&scores);
            ScoreRecord::batch(entity_ids, scores, (self.clock)(), &self.model_version)
        })?;

        let written = run.step(RunState::Writing, |metrics| {
            if self.ensure_results_table {
                self.writer.ensure_table(&conn)?;
            }
            let written = self.writer.write(&mut conn, &records)?;
            metrics.record_written(written);
            Ok(written)
        })?;

        run.finish();
        info!(total_processed = written, "Batch run complete");

        Ok(RunSummary::success(written, &self.model_version))
    }
}
