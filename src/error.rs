//! Error taxonomy for a scoring run.

use thiserror::Error;

/// Result alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Everything that can stop a batch run.
///
/// Every variant surfaces as a single run-level failure; there is no
/// partial success.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The store could not be opened or read.
    #[error("Store unreachable ({context}): {source}")]
    Connectivity {
        /// What was being attempted (path or query).
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Expected source columns are absent.
    #[error("Table '{table}' is missing expected columns: {}", .missing.join(", "))]
    Schema {
        table: String,
        missing: Vec<String>,
    },

    /// A raw field needed for feature derivation is missing or malformed.
    #[error("Feature derivation failed on column '{column}': {reason}")]
    Feature { column: String, reason: String },

    /// Inference was requested before the model artifact was loaded.
    #[error("Scorer is not initialized: the model artifact has not been loaded yet")]
    UninitializedModel,

    /// The model artifact could not be loaded.
    #[error("Failed to load model from {path}: {message}")]
    ModelLoad { path: String, message: String },

    /// The feature table does not fit the schema the scorer was fit on.
    #[error("Feature table does not match the scorer's input schema: {reason}")]
    InferenceShape { reason: String },

    /// The scorer ran but did not produce usable probabilities.
    #[error("Inference failed: {message}")]
    Inference { message: String },

    /// Writing or committing the score batch failed; nothing was persisted.
    #[error("Failed to persist scores to '{table}': {source}")]
    Persistence {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
}

impl PipelineError {
    /// Stable snake_case category, used in failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connectivity { .. } => "connectivity",
            Self::Schema { .. } => "schema",
            Self::Feature { .. } => "feature",
            Self::UninitializedModel => "uninitialized_model",
            Self::ModelLoad { .. } => "model_load",
            Self::InferenceShape { .. } => "inference_shape",
            Self::Inference { .. } => "inference",
            Self::Persistence { .. } => "persistence",
        }
    }

    pub(crate) fn feature(column: &str, reason: impl Into<String>) -> Self {
        Self::Feature {
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        Self::InferenceShape {
            reason: reason.into(),
        }
    }

    pub(crate) fn inference(message: impl Into<String>) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }
}
