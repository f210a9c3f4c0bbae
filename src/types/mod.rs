//! Type definitions for the scoring pipeline

pub mod record;
pub mod score;

pub use record::{Column, EntityId, Frame, Value};
pub use score::{RunStatus, RunSummary, ScoreRecord};
