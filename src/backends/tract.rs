//! Tract backend for ONNX classification models
//!
//! Tract is a pure Rust inference engine, so ONNX models run without native
//! libraries. The model is parsed, pinned to the manifest input shape,
//! optimized and turned into a runnable plan once at construction; `run`
//! takes `&self`, which lets every request share the same plan.

use crate::error::{PredictionError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelManifest, TensorLayout};
use instant::Instant;
use ndarray::{Array2, Array4};
use std::path::Path;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend running an ONNX classifier
#[derive(Debug)]
pub struct TractBackend {
    model: TractModel,
    input_shape: (usize, usize, usize, usize),
    layout: TensorLayout,
}

impl TractBackend {
    /// Load an ONNX file for the given manifest
    ///
    /// # Errors
    /// - File cannot be read
    /// - ONNX parsing, optimization or planning failures
    pub fn from_file(path: &Path, manifest: &ModelManifest) -> Result<Self> {
        let model_data = std::fs::read(path).map_err(|e| {
            PredictionError::model_error_with_context(
                "read",
                path,
                &e.to_string(),
                &["check file permissions"],
            )
        })?;

        #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for logging display
        let size_mb = model_data.len() as f64 / (1024.0 * 1024.0);
        log::info!("Initializing Tract backend");
        log::info!("  - Model: {}", manifest.name);
        log::info!("  - Model size: {size_mb:.2} MB");

        Self::from_bytes(&model_data, manifest)
    }

    /// Build the runnable plan from in-memory ONNX bytes
    ///
    /// # Errors
    /// - ONNX parsing, optimization or planning failures
    pub fn from_bytes(model_data: &[u8], manifest: &ModelManifest) -> Result<Self> {
        let load_start = Instant::now();
        let input_shape = manifest.input_shape();
        let (n, c, h, w) = input_shape;
        let layout = manifest.preprocessing.layout;

        let fact_shape = match layout {
            TensorLayout::Nchw => [n, c, h, w],
            TensorLayout::Nhwc => [n, h, w, c],
        };

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| PredictionError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact(fact_shape).into())
            .map_err(|e| PredictionError::model(format!("Failed to pin input shape: {e}")))?
            .into_optimized()
            .map_err(|e| PredictionError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                PredictionError::model(format!("Failed to create runnable model: {e}"))
            })?;

        log::info!(
            "Tract backend ready in {}ms (input {fact_shape:?}, {layout:?})",
            load_start.elapsed().as_millis()
        );

        Ok(Self {
            model,
            input_shape,
            layout,
        })
    }
}

impl InferenceBackend for TractBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array2<f32>> {
        let (n, c, h, w) = input.dim();
        if (n, c, h, w) != self.input_shape {
            return Err(PredictionError::inference(format!(
                "Tract input {:?} does not match model input {:?}",
                input.shape(),
                self.input_shape
            )));
        }

        let inference_start = Instant::now();

        // Logical iteration order gives a contiguous buffer in the target layout
        let (shape, data): ([usize; 4], Vec<f32>) = match self.layout {
            TensorLayout::Nchw => ([n, c, h, w], input.iter().copied().collect()),
            TensorLayout::Nhwc => (
                [n, h, w, c],
                input
                    .view()
                    .permuted_axes([0, 2, 3, 1])
                    .iter()
                    .copied()
                    .collect(),
            ),
        };

        let input_tensor = Tensor::from_shape(&shape, &data).map_err(|e| {
            PredictionError::inference(format!("Failed to build input tensor: {e}"))
        })?;

        let outputs = self
            .model
            .run(tvec![input_tensor.into()])
            .map_err(|e| PredictionError::inference(format!("Tract inference failed: {e}")))?;

        let output = outputs
            .first()
            .ok_or_else(|| PredictionError::inference("No output tensor found"))?;

        let values = output.as_slice::<f32>().map_err(|e| {
            PredictionError::inference(format!("Failed to read output tensor: {e}"))
        })?;

        // Classifier heads come out as [N, K], [N, K, 1, 1] or [K]; all flatten per sample
        let per_sample = values.len() / n.max(1);
        if per_sample == 0 || per_sample * n != values.len() {
            return Err(PredictionError::inference(format!(
                "Unexpected output tensor shape {:?}",
                output.shape()
            )));
        }

        let logits = Array2::from_shape_vec((n, per_sample), values.to_vec()).map_err(|e| {
            PredictionError::inference(format!("Failed to reshape output tensor: {e}"))
        })?;

        log::trace!(
            "Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output.shape()
        );

        Ok(logits)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.input_shape
    }

    fn name(&self) -> &'static str {
        "tract"
    }
}

#[cfg(all(test, feature = "tract"))]
mod tests {
    use super::*;
    use crate::models::{ModelKind, OutputConfig, PreprocessingConfig};

    fn manifest() -> ModelManifest {
        ModelManifest {
            name: "broken".to_string(),
            kind: ModelKind::Onnx,
            file: "model.onnx".into(),
            labels: vec!["benign".to_string(), "malignant".to_string()],
            preprocessing: PreprocessingConfig::default(),
            output: OutputConfig::default(),
        }
    }

    #[test]
    fn test_invalid_onnx_bytes_fail_gracefully() {
        let err = TractBackend::from_bytes(b"definitely not protobuf", &manifest()).unwrap_err();
        assert!(matches!(err, PredictionError::Model(_)));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = TractBackend::from_file(Path::new("/nonexistent/model.onnx"), &manifest())
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/model.onnx"));
    }
}
