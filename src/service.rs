//! Process-level entry point for triggering runs

use crate::config::{AppConfig, ModelVariant};
use crate::error::Result;
use crate::models::handle::ScorerHandle;
use crate::models::inference::Scorer;
use crate::models::loader::{check_artifact, ModelLoader};
use crate::orchestrator::{BatchOrchestrator, RunFailure};
use crate::types::score::RunSummary;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

/// Owns the configuration and the process-wide scorer.
///
/// `startup` loads the model eagerly; `run_batch_scoring` can be called any
/// number of times afterwards and fails fast while no model is loaded.
pub struct ScoringService {
    config: AppConfig,
    variant: ModelVariant,
    handle: ScorerHandle,
}

impl ScoringService {
    /// Fails when `models.active` names no known variant.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let variant = config.active_variant()?.clone();
        Ok(Self {
            config,
            variant,
            handle: ScorerHandle::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn model_version(&self) -> &str {
        &self.variant.version
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    /// Load the active variant's artifact into the scorer handle.
    pub fn startup(&self) -> anyhow::Result<()> {
        let path = self.config.artifact_path()?;
        let threads = self.config.models.onnx_threads;
        let name = &self.config.models.active;

        self.handle
            .initialize(|| {
                check_artifact(&path)?;
                let loader = ModelLoader::with_threads(threads)?;
                let scorer = loader.load(&path, name, &self.variant.schema)?;
                Ok(Arc::new(scorer) as Arc<dyn Scorer>)
            })
            .with_context(|| format!("Failed to load model variant '{}'", name))?;

        info!(variant = %name, version = %self.variant.version, "Scoring service started");
        Ok(())
    }

    /// Install an already-built scorer instead of loading one from disk.
    pub fn startup_with(&self, scorer: Arc<dyn Scorer>) -> Result<()> {
        self.handle.initialize(|| Ok(scorer))?;
        Ok(())
    }

    /// Run one full batch with the loaded scorer.
    pub fn run_batch_scoring(&self) -> std::result::Result<RunSummary, RunFailure> {
        let scorer = self.handle.get().map_err(RunFailure::not_started)?;
        BatchOrchestrator::for_variant(&self.config, &self.variant, scorer).run()
    }
}
