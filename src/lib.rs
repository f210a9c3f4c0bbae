//! Lead Scoring Pipeline Library
//!
//! Batch scoring of bank customers: read every stored customer, rebuild the
//! features the classifier was trained on, score them with an ONNX model and
//! upsert one probability per customer.

pub mod config;
pub mod error;
pub mod feature_builder;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod service;
pub mod source;
pub mod store;
pub mod types;
pub mod writer;

#[cfg(test)]
mod testing;

pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use feature_builder::{FeatureAdapter, FeatureBuilder};
pub use models::{ModelLoader, Scorer, ScorerHandle};
pub use orchestrator::{BatchOrchestrator, RunFailure, RunState};
pub use service::ScoringService;
pub use types::{EntityId, RunSummary, ScoreRecord};
