//! Feature reconstruction for lead scoring inference.
//!
//! This module turns raw `nasabah` rows into the feature table the
//! classifier was fit on, repeating the preprocessing applied at training
//! time. No scaling or imputation happens here; the exported model graph
//! carries its own preprocessing.

use crate::error::{PipelineError, Result};
use crate::types::record::{Column, EntityId, Frame, Value};
use serde::Deserialize;
use tracing::debug;

/// Default identifier column of the source table.
pub const ID_COLUMN: &str = "nasabah_id";

/// Bookkeeping columns that never reach the model.
pub const BOOKKEEPING_COLUMNS: [&str; 8] = [
    "user_id",
    "name",
    "phone",
    "email",
    "status",
    "notes",
    "contacted_at",
    "duration",
];

/// `pdays` sentinel for a customer that was never contacted.
pub const NEVER_CONTACTED: f64 = 999.0;

/// Right-closed age bucket edges used at training time.
pub const AGE_BIN_EDGES: [f64; 7] = [17.0, 25.0, 35.0, 45.0, 55.0, 65.0, 100.0];

pub const PDAYS_COLUMN: &str = "pdays";
pub const AGE_COLUMN: &str = "age";
pub const WAS_PREV_CONTACTED: &str = "was_prev_contacted";
pub const AGE_BIN: &str = "age_bin";

/// How raw rows were prepared when the model was trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeatureAdapter {
    /// Drop bookkeeping columns and derive `was_prev_contacted` and `age_bin`
    #[default]
    Engineered,
    /// Drop only the identifier and forward every other column
    Passthrough,
}

/// Builds model input from raw rows.
pub struct FeatureBuilder {
    adapter: FeatureAdapter,
    id_column: String,
}

impl FeatureBuilder {
    /// Create a feature builder keyed on `nasabah_id`.
    pub fn new(adapter: FeatureAdapter) -> Self {
        Self {
            adapter,
            id_column: ID_COLUMN.to_string(),
        }
    }

    /// Use a different identifier column.
    pub fn with_id_column(mut self, id_column: &str) -> Self {
        self.id_column = id_column.to_string();
        self
    }

    pub fn adapter(&self) -> FeatureAdapter {
        self.adapter
    }

    /// Split raw rows into the ordered identifiers and the feature table.
    ///
    /// Column order of the result: surviving raw columns in source order,
    /// then the derived columns. A raw column already carrying a derived
    /// name is recomputed in place. Other raw columns outside the exclusion
    /// set pass through untouched.
    pub fn build(&self, mut rows: Frame) -> Result<(Vec<EntityId>, Frame)> {
        let id_column = rows
            .take_column(&self.id_column)
            .ok_or_else(|| PipelineError::feature(&self.id_column, "identifier column is missing"))?;

        let entity_ids = id_column
            .values
            .iter()
            .enumerate()
            .map(|(row, value)| {
                EntityId::from_value(value).ok_or_else(|| {
                    PipelineError::feature(
                        &self.id_column,
                        format!("row {} has a {} identifier", row, value.type_name()),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if self.adapter == FeatureAdapter::Engineered {
            rows.drop_columns(&BOOKKEEPING_COLUMNS);

            let pdays = rows
                .column(PDAYS_COLUMN)
                .ok_or_else(|| PipelineError::feature(PDAYS_COLUMN, "required column is missing"))?;
            let was_prev_contacted = derive(pdays, was_prev_contacted)?;

            let age = rows
                .column(AGE_COLUMN)
                .ok_or_else(|| PipelineError::feature(AGE_COLUMN, "required column is missing"))?;
            let age_bin = derive(age, age_bin)?;

            rows.set_column(Column::new(WAS_PREV_CONTACTED, was_prev_contacted));
            rows.set_column(Column::new(AGE_BIN, age_bin));
        }

        debug!(
            adapter = ?self.adapter,
            rows = rows.len(),
            features = rows.width(),
            "Feature table built"
        );

        Ok((entity_ids, rows))
    }

    /// Columns removed before scoring, identifier first.
    pub fn excluded_columns(&self) -> Vec<&str> {
        let mut excluded = vec![self.id_column.as_str()];
        if self.adapter == FeatureAdapter::Engineered {
            excluded.extend(BOOKKEEPING_COLUMNS);
        }
        excluded
    }

    /// Names of the columns this builder appends.
    pub fn derived_columns(&self) -> &'static [&'static str] {
        match self.adapter {
            FeatureAdapter::Engineered => &[WAS_PREV_CONTACTED, AGE_BIN],
            FeatureAdapter::Passthrough => &[],
        }
    }
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new(FeatureAdapter::default())
    }
}

fn derive(source: &Column, f: fn(&Value) -> std::result::Result<Value, String>) -> Result<Vec<Value>> {
    source
        .values
        .iter()
        .enumerate()
        .map(|(row, value)| {
            f(value).map_err(|reason| PipelineError::feature(&source.name, format!("row {}: {}", row, reason)))
        })
        .collect()
}

/// `0` when `pdays` holds the never-contacted sentinel, `1` otherwise.
///
/// A missing `pdays` is not the sentinel and yields `1`.
pub fn was_prev_contacted(pdays: &Value) -> std::result::Result<Value, String> {
    match pdays {
        Value::Null => Ok(Value::Int(1)),
        Value::Int(_) | Value::Float(_) => {
            let contacted = pdays.as_f64() != Some(NEVER_CONTACTED);
            Ok(Value::Int(i64::from(contacted)))
        }
        Value::Text(s) => Err(format!("expected a number of days, found text '{}'", s)),
    }
}

/// Index of the age bucket, or null outside `(17, 100]`.
pub fn age_bin(age: &Value) -> std::result::Result<Value, String> {
    match age {
        Value::Null => Ok(Value::Null),
        Value::Int(_) | Value::Float(_) => Ok(age
            .as_f64()
            .and_then(bucket_index)
            .map(|idx| Value::Int(idx as i64))
            .unwrap_or(Value::Null)),
        Value::Text(s) => Err(format!("expected a numeric age, found text '{}'", s)),
    }
}

fn bucket_index(age: f64) -> Option<usize> {
    AGE_BIN_EDGES
        .windows(2)
        .position(|edge| age > edge[0] && age <= edge[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SOURCE_COLUMNS;

    fn raw_row(id: i64, age: Value, pdays: Value) -> Vec<Value> {
        SOURCE_COLUMNS
            .iter()
            .map(|&name| match name {
                "nasabah_id" => Value::Int(id),
                "age" => age.clone(),
                "pdays" => pdays.clone(),
                "job" => Value::from("admin."),
                "notes" => Value::from("follow up"),
                "emp.var.rate" => Value::Float(1.1),
                _ => Value::Null,
            })
            .collect()
    }

    fn raw_frame(rows: Vec<(i64, Value, Value)>) -> Frame {
        let mut frame = Frame::with_columns(&SOURCE_COLUMNS);
        for (id, age, pdays) in rows {
            frame.push_row(raw_row(id, age, pdays));
        }
        frame
    }

    fn ints(column: &Column) -> Vec<Option<i64>> {
        column
            .values
            .iter()
            .map(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_three_row_scenario() {
        let rows = raw_frame(vec![
            (1, Value::Int(30), Value::Int(999)),
            (2, Value::Int(70), Value::Int(5)),
            (3, Value::Int(16), Value::Int(999)),
        ]);

        let (ids, features) = FeatureBuilder::default().build(rows).unwrap();

        assert_eq!(ids, vec![EntityId::Int(1), EntityId::Int(2), EntityId::Int(3)]);
        assert_eq!(
            ints(features.column(WAS_PREV_CONTACTED).unwrap()),
            vec![Some(0), Some(1), Some(0)]
        );
        assert_eq!(
            ints(features.column(AGE_BIN).unwrap()),
            vec![Some(1), Some(5), None]
        );
        assert!(features.column(AGE_BIN).unwrap().values[2].is_null());
    }

    #[test]
    fn test_output_columns_are_raw_minus_exclusions_plus_derived() {
        let builder = FeatureBuilder::default();
        let rows = raw_frame(vec![(1, Value::Int(40), Value::Int(3))]);
        let (_, features) = builder.build(rows).unwrap();

        let excluded = builder.excluded_columns();
        let mut expected: Vec<&str> = SOURCE_COLUMNS
            .iter()
            .copied()
            .filter(|c| !excluded.contains(c))
            .collect();
        expected.extend([WAS_PREV_CONTACTED, AGE_BIN]);

        assert_eq!(features.column_names(), expected);
        assert_eq!(features.width(), SOURCE_COLUMNS.len() - 9 + 2);
    }

    #[test]
    fn test_passthrough_columns_are_unchanged() {
        let rows = raw_frame(vec![(1, Value::Int(40), Value::Int(3))]);
        let (_, features) = FeatureBuilder::default().build(rows).unwrap();

        assert_eq!(features.column("job").unwrap().values, vec![Value::from("admin.")]);
        assert_eq!(features.column("emp.var.rate").unwrap().values, vec![Value::Float(1.1)]);
        assert_eq!(features.column("age").unwrap().values, vec![Value::Int(40)]);
    }

    #[test]
    fn test_was_prev_contacted() {
        assert_eq!(was_prev_contacted(&Value::Int(999)), Ok(Value::Int(0)));
        assert_eq!(was_prev_contacted(&Value::Float(999.0)), Ok(Value::Int(0)));
        assert_eq!(was_prev_contacted(&Value::Int(0)), Ok(Value::Int(1)));
        assert_eq!(was_prev_contacted(&Value::Int(998)), Ok(Value::Int(1)));
        assert_eq!(was_prev_contacted(&Value::Null), Ok(Value::Int(1)));
        assert!(was_prev_contacted(&Value::from("999")).is_err());
    }

    #[test]
    fn test_age_bin_boundaries() {
        let cases = [
            (Value::Int(16), None),
            (Value::Int(17), None),
            (Value::Int(18), Some(0)),
            (Value::Int(25), Some(0)),
            (Value::Float(25.5), Some(1)),
            (Value::Int(26), Some(1)),
            (Value::Int(30), Some(1)),
            (Value::Int(45), Some(2)),
            (Value::Int(46), Some(3)),
            (Value::Int(65), Some(4)),
            (Value::Int(66), Some(5)),
            (Value::Int(67), Some(5)),
            (Value::Int(100), Some(5)),
            (Value::Int(101), None),
            (Value::Null, None),
        ];

        for (age, expected) in cases {
            let expected = expected.map(Value::Int).unwrap_or(Value::Null);
            assert_eq!(age_bin(&age), Ok(expected), "age {:?}", age);
        }
    }

    #[test]
    fn test_missing_required_column() {
        let mut rows = raw_frame(vec![(1, Value::Int(40), Value::Int(3))]);
        rows.drop_columns(&["pdays"]);

        let err = FeatureBuilder::default().build(rows).unwrap_err();
        match err {
            PipelineError::Feature { column, .. } => assert_eq!(column, "pdays"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_age_is_a_feature_error() {
        let rows = raw_frame(vec![(1, Value::from("forty"), Value::Int(3))]);
        let err = FeatureBuilder::default().build(rows).unwrap_err();

        assert_eq!(err.kind(), "feature");
        assert!(err.to_string().contains("row 0"));
    }

    #[test]
    fn test_null_identifier_is_rejected() {
        let mut rows = Frame::with_columns(&["nasabah_id", "age", "pdays"]);
        rows.push_row(vec![Value::Null, Value::Int(30), Value::Int(999)]);

        let err = FeatureBuilder::default().build(rows).unwrap_err();
        assert!(err.to_string().contains("nasabah_id"));
    }

    #[test]
    fn test_passthrough_adapter_drops_only_identifier() {
        let builder = FeatureBuilder::new(FeatureAdapter::Passthrough);
        let rows = raw_frame(vec![(1, Value::Int(40), Value::Int(3))]);
        let (ids, features) = builder.build(rows).unwrap();

        assert_eq!(ids, vec![EntityId::Int(1)]);
        assert_eq!(features.width(), SOURCE_COLUMNS.len() - 1);
        assert!(features.column("notes").is_some());
        assert!(features.column(AGE_BIN).is_none());
        assert!(builder.derived_columns().is_empty());
    }

    #[test]
    fn test_custom_id_column() {
        let mut rows = Frame::with_columns(&["lead_id", "age", "pdays"]);
        rows.push_row(vec![Value::from("L-1"), Value::Int(30), Value::Int(999)]);

        let (ids, features) = FeatureBuilder::default()
            .with_id_column("lead_id")
            .build(rows)
            .unwrap();

        assert_eq!(ids, vec![EntityId::Text("L-1".to_string())]);
        assert_eq!(features.column_names(), vec!["age", "pdays", WAS_PREV_CONTACTED, AGE_BIN]);
    }

    #[test]
    fn test_stale_derived_column_is_recomputed_in_place() {
        let mut rows = Frame::with_columns(&["nasabah_id", "age_bin", "age", "pdays"]);
        rows.push_row(vec![Value::Int(1), Value::Int(9), Value::Int(30), Value::Int(999)]);

        let (_, features) = FeatureBuilder::default().build(rows).unwrap();

        assert_eq!(
            features.column_names(),
            vec![AGE_BIN, "age", "pdays", WAS_PREV_CONTACTED]
        );
        assert_eq!(ints(features.column(AGE_BIN).unwrap()), vec![Some(1)]);
    }
}
