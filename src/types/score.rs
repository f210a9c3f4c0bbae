//! Score records and run summaries

use crate::error::{PipelineError, Result};
use crate::types::record::EntityId;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of the results table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    /// Scored customer
    pub entity_id: EntityId,

    /// Positive-class probability (0.0 - 1.0)
    pub predicted_score: f64,

    /// When the run computed the score
    pub calculated_at: DateTime<Utc>,

    /// Label of the artifact that produced the score
    pub model_version: String,
}

impl ScoreRecord {
    /// Pair identifiers with scores, one record per identifier.
    ///
    /// Every record of a run shares the same timestamp and model version.
    pub fn batch(
        entity_ids: Vec<EntityId>,
        scores: Vec<f64>,
        calculated_at: DateTime<Utc>,
        model_version: &str,
    ) -> Result<Vec<ScoreRecord>> {
        if entity_ids.len() != scores.len() {
            return Err(PipelineError::inference(format!(
                "scorer returned {} probabilities for {} entities",
                scores.len(),
                entity_ids.len()
            )));
        }

        Ok(entity_ids
            .into_iter()
            .zip(scores)
            .map(|(entity_id, predicted_score)| ScoreRecord {
                entity_id,
                predicted_score,
                calculated_at,
                model_version: model_version.to_string(),
            })
            .collect())
    }
}

/// Outcome label reported by the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// What a successful run reports back to its trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub total_processed: usize,
    pub model_version: String,
}

impl RunSummary {
    pub fn success(total_processed: usize, model_version: &str) -> Self {
        Self {
            status: RunStatus::Success,
            total_processed,
            model_version: model_version.to_string(),
        }
    }
}
