//! Process-wide scorer handle, initialized exactly once

use crate::error::{PipelineError, Result};
use crate::models::inference::Scorer;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::info;

/// Holds the loaded scorer for the lifetime of the process.
///
/// Concurrent `initialize` calls run the loader once; the others block until
/// it finishes and then see the same scorer. A failed load leaves the handle
/// empty so a later call can retry.
#[derive(Default)]
pub struct ScorerHandle {
    cell: OnceCell<Arc<dyn Scorer>>,
}

impl ScorerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the scorer unless it is already loaded.
    pub fn initialize<F>(&self, load: F) -> Result<Arc<dyn Scorer>>
    where
        F: FnOnce() -> Result<Arc<dyn Scorer>>,
    {
        let scorer = self.cell.get_or_try_init(|| {
            let scorer = load()?;
            info!(model = %scorer.name(), features = scorer.schema().len(), "Scorer ready");
            Ok::<_, PipelineError>(scorer)
        })?;
        Ok(Arc::clone(scorer))
    }

    /// The loaded scorer, or `UninitializedModel` before the first load.
    pub fn get(&self) -> Result<Arc<dyn Scorer>> {
        self.cell
            .get()
            .map(Arc::clone)
            .ok_or(PipelineError::UninitializedModel)
    }

    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }
}
