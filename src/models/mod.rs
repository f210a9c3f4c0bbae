//! Scorer loading and batch inference

pub mod handle;
pub mod inference;
pub mod loader;
pub mod schema;

pub use handle::ScorerHandle;
pub use inference::{OnnxScorer, Scorer};
pub use loader::ModelLoader;
pub use schema::{FeatureField, FeatureKind, FeatureSchema};
