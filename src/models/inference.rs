//! Batch probability inference over a feature table

use crate::error::{PipelineError, Result};
use crate::models::schema::FeatureSchema;
use crate::types::record::{Column, Frame, Value};
use ort::memory::Allocator;
use ort::session::{Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Opaque pre-trained binary classifier.
pub trait Scorer: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Columns the scorer was fit on, in order.
    fn schema(&self) -> &FeatureSchema;

    /// Positive-class probability per row, row order preserved.
    fn predict_proba(&self, features: &Frame) -> Result<Vec<f64>>;
}

/// Element type of a per-column graph input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputType {
    Float32,
    Float64,
    Int64,
    String,
}

/// How feature columns are fed to the graph.
#[derive(Debug, Clone)]
pub(crate) enum InputLayout {
    /// One `[rows, width]` f32 tensor
    Dense { input_name: String },
    /// One `[rows, 1]` tensor per feature column, matched by name
    PerColumn { inputs: Vec<(String, InputType)> },
}

/// Scorer backed by an ONNX Runtime session.
pub struct OnnxScorer {
    pub(crate) name: String,
    pub(crate) session: Mutex<Session>,
    pub(crate) layout: InputLayout,
    pub(crate) output_name: String,
    pub(crate) schema: FeatureSchema,
}

impl Scorer for OnnxScorer {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn predict_proba(&self, features: &Frame) -> Result<Vec<f64>> {
        let rows = features.len();
        if rows == 0 {
            return Ok(Vec::new());
        }

        let inputs = self.prepare_inputs(features)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| PipelineError::inference(format!("Lock error: {}", e)))?;

        let outputs = session
            .run(inputs)
            .map_err(|e| PipelineError::inference(format!("{} failed to run: {}", self.name, e)))?;

        let probabilities = extract_probabilities(&outputs, &self.output_name, rows, &self.name)?;
        validate_probabilities(&probabilities)?;

        debug!(model = %self.name, rows = rows, "Batch inference complete");
        Ok(probabilities)
    }
}

impl OnnxScorer {
    fn prepare_inputs(&self, features: &Frame) -> Result<Vec<(String, DynValue)>> {
        let rows = features.len() as i64;

        match &self.layout {
            InputLayout::Dense { input_name } => {
                let shape = vec![rows, features.width() as i64];
                let tensor = Tensor::from_array((shape, dense_matrix(features)?))
                    .map_err(|e| PipelineError::inference(format!("Failed to create input tensor: {}", e)))?;
                Ok(vec![(input_name.clone(), tensor.into_dyn())])
            }
            InputLayout::PerColumn { inputs } => inputs
                .iter()
                .map(|(name, ty)| {
                    let column = features
                        .column(name)
                        .ok_or_else(|| PipelineError::shape(format!("missing columns [{}]", name)))?;
                    Ok((name.clone(), column_tensor(column, *ty, rows)?))
                })
                .collect(),
        }
    }
}

/// Row-major f32 matrix of an all-numeric table. Nulls become NaN.
pub(crate) fn dense_matrix(features: &Frame) -> Result<Vec<f32>> {
    let mut data = Vec::with_capacity(features.len() * features.width());
    for row in 0..features.len() {
        for column in features.columns() {
            data.push(numeric_cell(column, row)? as f32);
        }
    }
    Ok(data)
}

fn numeric_cell(column: &Column, row: usize) -> Result<f64> {
    match &column.values[row] {
        Value::Null => Ok(f64::NAN),
        Value::Text(_) => Err(PipelineError::shape(format!(
            "column '{}' row {} holds text but the model expects a number",
            column.name, row
        ))),
        value => Ok(value.as_f64().unwrap_or(f64::NAN)),
    }
}

fn column_tensor(column: &Column, ty: InputType, rows: i64) -> Result<DynValue> {
    let shape = vec![rows, 1_i64];
    let tensor_error = |e: ort::Error| {
        PipelineError::inference(format!("Failed to create tensor for '{}': {}", column.name, e))
    };

    let value = match ty {
        InputType::Float32 => {
            let data = (0..column.values.len())
                .map(|row| numeric_cell(column, row).map(|v| v as f32))
                .collect::<Result<Vec<f32>>>()?;
            Tensor::from_array((shape, data)).map_err(tensor_error)?.into_dyn()
        }
        InputType::Float64 => {
            let data = (0..column.values.len())
                .map(|row| numeric_cell(column, row))
                .collect::<Result<Vec<f64>>>()?;
            Tensor::from_array((shape, data)).map_err(tensor_error)?.into_dyn()
        }
        InputType::Int64 => {
            let data = integer_cells(column)?;
            Tensor::from_array((shape, data)).map_err(tensor_error)?.into_dyn()
        }
        InputType::String => {
            let data = text_cells(column);
            Tensor::from_string_array((shape, data.as_slice()))
                .map_err(tensor_error)?
                .into_dyn()
        }
    };

    Ok(value)
}

/// Integer input cells. Integral floats are accepted, nulls are not.
pub(crate) fn integer_cells(column: &Column) -> Result<Vec<i64>> {
    column
        .values
        .iter()
        .enumerate()
        .map(|(row, value)| match value {
            Value::Int(i) => Ok(*i),
            Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            other => Err(PipelineError::shape(format!(
                "column '{}' row {} holds {} but the model expects an integer",
                column.name,
                row,
                other.type_name()
            ))),
        })
        .collect()
}

/// String input cells. Nulls are sent as empty strings.
pub(crate) fn text_cells(column: &Column) -> Vec<String> {
    column
        .values
        .iter()
        .map(|value| match value {
            Value::Text(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Null => String::new(),
        })
        .collect()
}

/// Extract positive-class probabilities from the session outputs.
/// Handles tensor outputs (`[rows, classes]`, `[rows, 1]`, `[rows]`) and
/// seq(map) outputs (LightGBM and CatBoost exports).
fn extract_probabilities(
    outputs: &SessionOutputs,
    output_name: &str,
    rows: usize,
    model_name: &str,
) -> Result<Vec<f64>> {
    // First, try the probability output by name
    if let Some(output) = outputs.get(output_name) {
        if let Some(result) = extract_from_value(output, rows) {
            return result;
        }
    }

    // Fallback: try every non-label output
    for (name, output) in outputs.iter() {
        if name.contains("label") || name == output_name {
            continue;
        }
        if let Some(result) = extract_from_value(&output, rows) {
            debug!(model = %model_name, output = %name, "Extracted probabilities (fallback)");
            return result;
        }
    }

    warn!(model = %model_name, "Could not find a probability output");
    Err(PipelineError::inference(format!(
        "{} produced no probability output",
        model_name
    )))
}

fn extract_from_value(output: &DynValue, rows: usize) -> Option<Result<Vec<f64>>> {
    let dtype = output.dtype();

    if let Ok(tensor) = output.try_extract_tensor::<f32>() {
        let (shape, data) = tensor;
        let dims: Vec<i64> = shape.iter().copied().collect();
        return Some(positive_class_from_tensor(&dims, data, rows));
    }

    if DynSequenceValueType::can_downcast(&dtype) {
        return Some(positive_class_from_sequence(output, rows));
    }

    None
}

/// Positive-class column of a probability tensor.
pub(crate) fn positive_class_from_tensor(dims: &[i64], data: &[f32], rows: usize) -> Result<Vec<f64>> {
    let mismatch = || {
        PipelineError::inference(format!(
            "probability tensor of shape {:?} does not cover {} rows",
            dims, rows
        ))
    };

    let (batch, classes) = match dims {
        [batch, classes] => (*batch as usize, (*classes).max(1) as usize),
        [batch] => (*batch as usize, 1),
        _ => return Err(mismatch()),
    };

    if batch != rows || data.len() < rows * classes {
        return Err(mismatch());
    }

    // [rows, classes]: class 1 is the positive class; [rows, 1] / [rows]: already positive
    let column = if classes >= 2 { 1 } else { 0 };
    Ok((0..rows)
        .map(|row| data[row * classes + column] as f64)
        .collect())
}

/// Probability of class 1 from one `map(int64, float)` element.
pub(crate) fn positive_class_from_pairs(pairs: &[(i64, f32)]) -> Option<f64> {
    if let Some((_, prob)) = pairs.iter().find(|(class_id, _)| *class_id == 1) {
        return Some(*prob as f64);
    }
    // Only class 0 reported
    pairs
        .iter()
        .find(|(class_id, _)| *class_id == 0)
        .map(|(_, prob)| 1.0 - *prob as f64)
}

fn positive_class_from_sequence(output: &DynValue, rows: usize) -> Result<Vec<f64>> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| PipelineError::inference(format!("Failed to downcast to sequence: {}", e)))?;

    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(|e| PipelineError::inference(format!("Failed to read sequence: {}", e)))?;

    if maps.len() != rows {
        return Err(PipelineError::inference(format!(
            "probability sequence has {} entries for {} rows",
            maps.len(),
            rows
        )));
    }

    maps.iter()
        .enumerate()
        .map(|(row, map_value)| {
            let kv_pairs = map_value
                .try_extract_key_values::<i64, f32>()
                .map_err(|e| PipelineError::inference(format!("Failed to read map: {}", e)))?;
            positive_class_from_pairs(&kv_pairs).ok_or_else(|| {
                PipelineError::inference(format!("row {} has no class probabilities", row))
            })
        })
        .collect()
}

/// Every probability must be finite and inside `[0, 1]`.
pub(crate) fn validate_probabilities(probabilities: &[f64]) -> Result<()> {
    match probabilities
        .iter()
        .enumerate()
        .find(|(_, p)| !p.is_finite() || !(0.0..=1.0).contains(*p))
    {
        Some((row, p)) => Err(PipelineError::inference(format!(
            "row {} scored {} which is not a probability",
            row, p
        ))),
        None => Ok(()),
    }
}
