//! Expected input schema of a scorer and the pre-inference compatibility check

use crate::error::{PipelineError, Result};
use crate::types::record::{Frame, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Value kind a model input accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// Integers, floats or null
    Numeric,
    /// Text or null
    Categorical,
}

impl FeatureKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (FeatureKind::Numeric, Value::Int(_) | Value::Float(_)) => true,
            (FeatureKind::Categorical, Value::Text(_)) => true,
            _ => false,
        }
    }
}

/// One expected input column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureField {
    pub name: String,
    pub kind: FeatureKind,
}

impl FeatureField {
    pub fn new(name: impl Into<String>, kind: FeatureKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered column set a scorer was fit on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSchema {
    fields: Vec<FeatureField>,
}

impl FeatureSchema {
    pub fn new(fields: Vec<FeatureField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FeatureField] {
        &self.fields
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Verify column set, order and value kinds before inference.
    pub fn check(&self, table: &Frame) -> Result<()> {
        let expected: HashSet<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        let actual: HashSet<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();

        let missing: Vec<&str> = self
            .names()
            .into_iter()
            .filter(|name| !actual.contains(name))
            .collect();
        let unexpected: Vec<&str> = table
            .column_names()
            .into_iter()
            .filter(|name| !expected.contains(name))
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            let mut problems = Vec::new();
            if !missing.is_empty() {
                problems.push(format!("missing columns [{}]", missing.join(", ")));
            }
            if !unexpected.is_empty() {
                problems.push(format!("unexpected columns [{}]", unexpected.join(", ")));
            }
            return Err(PipelineError::shape(problems.join("; ")));
        }

        for (position, (field, column)) in self.fields.iter().zip(table.columns()).enumerate() {
            if field.name != column.name {
                return Err(PipelineError::shape(format!(
                    "column order differs at position {}: expected '{}', found '{}'",
                    position, field.name, column.name
                )));
            }

            if let Some((row, value)) = column
                .values
                .iter()
                .enumerate()
                .find(|(_, value)| !field.kind.accepts(value))
            {
                return Err(PipelineError::shape(format!(
                    "column '{}' expects {:?} values, row {} holds {}",
                    field.name,
                    field.kind,
                    row,
                    value.type_name()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::Column;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            FeatureField::new("age", FeatureKind::Numeric),
            FeatureField::new("job", FeatureKind::Categorical),
            FeatureField::new("age_bin", FeatureKind::Numeric),
        ])
    }

    fn table(columns: Vec<(&str, Vec<Value>)>) -> Frame {
        Frame::from_columns(
            columns
                .into_iter()
                .map(|(name, values)| Column::new(name, values))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_matching_table_passes() {
        let features = table(vec![
            ("age", vec![Value::Int(30), Value::Float(41.0)]),
            ("job", vec![Value::from("admin."), Value::Null]),
            ("age_bin", vec![Value::Int(1), Value::Null]),
        ]);
        assert!(schema().check(&features).is_ok());
    }

    #[test]
    fn test_unexpected_passthrough_column_is_rejected() {
        let features = table(vec![
            ("age", vec![Value::Int(30)]),
            ("job", vec![Value::from("admin.")]),
            ("age_bin", vec![Value::Int(1)]),
            ("balance", vec![Value::Int(1200)]),
        ]);

        let err = schema().check(&features).unwrap_err();
        assert_eq!(err.kind(), "inference_shape");
        assert!(err.to_string().contains("unexpected columns [balance]"));
    }

    #[test]
    fn test_missing_column_is_rejected() {
        let features = table(vec![
            ("age", vec![Value::Int(30)]),
            ("job", vec![Value::from("admin.")]),
        ]);

        let err = schema().check(&features).unwrap_err();
        assert!(err.to_string().contains("missing columns [age_bin]"));
    }

    #[test]
    fn test_column_order_is_enforced() {
        let features = table(vec![
            ("job", vec![Value::from("admin.")]),
            ("age", vec![Value::Int(30)]),
            ("age_bin", vec![Value::Int(1)]),
        ]);

        let err = schema().check(&features).unwrap_err();
        assert!(err.to_string().contains("position 0"));
    }

    #[test]
    fn test_value_kind_is_enforced() {
        let features = table(vec![
            ("age", vec![Value::Int(30), Value::from("thirty")]),
            ("job", vec![Value::from("admin."), Value::from("services")]),
            ("age_bin", vec![Value::Int(1), Value::Int(1)]),
        ]);

        let err = schema().check(&features).unwrap_err();
        assert!(err.to_string().contains("row 1 holds text"));
    }

    #[test]
    fn test_field_deserializes_from_config() {
        let field: FeatureField =
            serde_json::from_str(r#"{"name": "pdays", "kind": "numeric"}"#).unwrap();
        assert_eq!(field, FeatureField::new("pdays", FeatureKind::Numeric));
    }
}
