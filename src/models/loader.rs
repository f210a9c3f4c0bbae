//! ONNX model loader

use crate::error::{PipelineError, Result};
use crate::models::inference::{InputLayout, InputType, OnnxScorer};
use crate::models::schema::{FeatureField, FeatureKind, FeatureSchema};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::tensor::TensorElementType;
use ort::value::ValueType;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Loader for ONNX scorers
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Result<Self> {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        // Initialize ONNX Runtime
        ort::init().commit().map_err(|e| PipelineError::ModelLoad {
            path: "<runtime>".to_string(),
            message: e.to_string(),
        })?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a scorer from an ONNX file.
    ///
    /// `configured` is the expected schema from configuration. It is required
    /// for single-input graphs and, when given for per-column graphs, must
    /// name exactly the graph inputs.
    pub fn load<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        configured: &[FeatureField],
    ) -> Result<OnnxScorer> {
        let path = path.as_ref();
        check_artifact(path)?;

        let load_error = |message: String| PipelineError::ModelLoad {
            path: path.display().to_string(),
            message,
        };

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(self.onnx_threads))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| load_error(e.to_string()))?;

        let inputs = session
            .inputs
            .iter()
            .map(|input| input_type(&input.input_type).map(|ty| (input.name.clone(), ty)))
            .collect::<std::result::Result<Vec<_>, String>>()
            .map_err(load_error)?;

        let (layout, schema) = resolve_layout(inputs, configured).map_err(load_error)?;

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                session
                    .outputs
                    .last()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "probabilities".to_string())
            });

        info!(
            model = %name,
            features = schema.len(),
            output = %output_name,
            dense = matches!(layout, InputLayout::Dense { .. }),
            "Model loaded successfully"
        );

        Ok(OnnxScorer {
            name: name.to_string(),
            session: Mutex::new(session),
            layout,
            output_name,
            schema,
        })
    }
}

/// Fail early when the artifact file is absent.
pub fn check_artifact(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PipelineError::ModelLoad {
            path: path.display().to_string(),
            message: "artifact not found".to_string(),
        })
    }
}

fn input_type(value_type: &ValueType) -> std::result::Result<InputType, String> {
    match value_type {
        ValueType::Tensor { ty, .. } => match ty {
            TensorElementType::Float32 => Ok(InputType::Float32),
            TensorElementType::Float64 => Ok(InputType::Float64),
            TensorElementType::Int64 => Ok(InputType::Int64),
            TensorElementType::String => Ok(InputType::String),
            other => Err(format!("unsupported input element type {:?}", other)),
        },
        other => Err(format!("unsupported input type {:?}", other)),
    }
}

/// Decide how features are fed and what schema the graph expects.
pub(crate) fn resolve_layout(
    inputs: Vec<(String, InputType)>,
    configured: &[FeatureField],
) -> std::result::Result<(InputLayout, FeatureSchema), String> {
    if inputs.is_empty() {
        return Err("graph declares no inputs".to_string());
    }

    if inputs.len() == 1 {
        let (input_name, ty) = &inputs[0];
        if configured.is_empty() {
            return Err(format!(
                "graph takes a single input '{}'; configure the variant's feature schema",
                input_name
            ));
        }
        if *ty != InputType::Float32 {
            return Err(format!("single input '{}' must be a float tensor", input_name));
        }
        if let Some(field) = configured.iter().find(|f| f.kind != FeatureKind::Numeric) {
            return Err(format!(
                "single-input graphs take numeric features only, '{}' is categorical",
                field.name
            ));
        }
        let layout = InputLayout::Dense {
            input_name: input_name.clone(),
        };
        return Ok((layout, FeatureSchema::new(configured.to_vec())));
    }

    let fields: Vec<FeatureField> = inputs
        .iter()
        .map(|(name, ty)| {
            let kind = match ty {
                InputType::String => FeatureKind::Categorical,
                _ => FeatureKind::Numeric,
            };
            FeatureField::new(name.clone(), kind)
        })
        .collect();

    if !configured.is_empty() {
        let declared: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        let expected: Vec<&str> = configured.iter().map(|f| f.name.as_str()).collect();
        if declared != expected {
            return Err(format!(
                "graph inputs [{}] differ from configured schema [{}]",
                declared.join(", "),
                expected.join(", ")
            ));
        }
    }

    Ok((InputLayout::PerColumn { inputs }, FeatureSchema::new(fields)))
}
