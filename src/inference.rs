//! Inference backend abstraction and the shared classifier handle

use crate::{
    error::{PredictionError, Result},
    models::{ModelInfo, ModelManifest, OutputActivation},
    types::{InputTensor, PredictionResult},
    utils::TensorValidator,
};
use ndarray::{Array2, Array4};
use std::path::Path;

/// Trait for inference backends
///
/// Backends are fully loaded when constructed and run forward passes through
/// `&self`, so one instance can be shared by every request thread.
pub trait InferenceBackend: Send + Sync + std::fmt::Debug {
    /// Run a forward pass over an NCHW batch
    ///
    /// Returns raw outputs shaped `[batch, outputs]`.
    ///
    /// # Errors
    /// - Input tensor does not match the model input shape
    /// - Backend execution failures
    /// - Output tensor cannot be interpreted
    fn infer(&self, input: &Array4<f32>) -> Result<Array2<f32>>;

    /// Get the expected NCHW input shape for this backend
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Short backend identifier for logs and `GET /model`
    fn name(&self) -> &'static str;
}

/// Immutable classification model shared across requests
///
/// Constructed once at startup, then wrapped in an `Arc` and handed to the
/// request pipeline. Nothing here is mutated after construction.
#[derive(Debug)]
pub struct ClassifierModel {
    manifest: ModelManifest,
    backend: Box<dyn InferenceBackend>,
}

impl ClassifierModel {
    /// Load `model.json` from a directory and construct its backend
    ///
    /// # Errors
    /// - Manifest missing or invalid
    /// - Weights file missing or unreadable
    /// - Backend for the model kind not compiled in
    pub fn load<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let manifest = ModelManifest::from_dir(model_dir)?;
        let backend = crate::backends::create_backend(&manifest, model_dir)?;
        Self::new(manifest, backend)
    }

    /// Wrap an already constructed backend
    ///
    /// # Errors
    /// - Manifest fails validation
    /// - Backend input shape disagrees with the manifest
    pub fn new(manifest: ModelManifest, backend: Box<dyn InferenceBackend>) -> Result<Self> {
        manifest.validate()?;

        let expected = manifest.input_shape();
        let actual = backend.input_shape();
        if expected != actual {
            return Err(PredictionError::model(format!(
                "Backend input shape {actual:?} does not match manifest shape {expected:?}"
            )));
        }

        log::info!(
            "Loaded model '{}' ({} backend, {} labels, input {}x{})",
            manifest.name,
            backend.name(),
            manifest.labels.len(),
            expected.3,
            expected.2
        );

        Ok(Self { manifest, backend })
    }

    #[must_use]
    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.manifest.labels
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Public description of the loaded model
    #[must_use]
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            name: self.manifest.name.clone(),
            kind: self.manifest.kind,
            backend: self.backend.name().to_string(),
            labels: self.manifest.labels.clone(),
            input_size: self.manifest.preprocessing.target_size,
            resize: self.manifest.preprocessing.resize,
            activation: self.manifest.output.activation,
            explanation_method: crate::explanation::METHOD_NAME.to_string(),
        }
    }

    /// Class probabilities for a single normalized NCHW input
    ///
    /// # Errors
    /// - Input shape differs from the model input shape
    /// - Backend failure
    /// - Output count differs from the label set
    /// - Non-finite outputs
    pub fn probabilities(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        TensorValidator::validate_tensor_shape(input, self.manifest.input_shape())?;

        let raw = self.backend.infer(input)?;
        let expected = self.manifest.expected_outputs();
        if raw.nrows() != 1 || raw.ncols() != expected {
            return Err(PredictionError::inference(format!(
                "Model produced output shape {:?}, expected [1, {expected}]",
                raw.shape()
            )));
        }

        let logits: Vec<f32> = raw.iter().copied().collect();
        if !TensorValidator::all_finite(&logits) {
            return Err(PredictionError::inference(
                "Model output contains NaN or infinite values",
            ));
        }

        apply_activation(&logits, self.manifest.output.activation)
    }

    /// Classify a preprocessed input
    ///
    /// # Errors
    /// Same conditions as [`ClassifierModel::probabilities`].
    pub fn predict(&self, input: &InputTensor) -> Result<PredictionResult> {
        let probabilities = self.probabilities(&input.data)?;
        let (class_index, confidence) = argmax(&probabilities).ok_or_else(|| {
            PredictionError::inference("Model produced no class probabilities")
        })?;

        let label = self
            .manifest
            .labels
            .get(class_index)
            .cloned()
            .ok_or_else(|| {
                PredictionError::inference(format!("Class index {class_index} has no label"))
            })?;

        Ok(PredictionResult {
            label,
            class_index,
            confidence,
            probabilities,
        })
    }
}

/// Index and value of the largest element; the first index wins ties
#[must_use]
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, bv)) if v <= bv => best,
            _ => Some((i, v)),
        })
}

/// Turn raw model outputs into class probabilities
///
/// # Errors
/// Returns `PredictionError::Inference` when the result is not a valid
/// probability vector.
pub fn apply_activation(logits: &[f32], activation: OutputActivation) -> Result<Vec<f32>> {
    let probabilities = match activation {
        OutputActivation::Softmax => {
            let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
            let sum: f32 = exps.iter().sum();
            exps.into_iter().map(|e| e / sum).collect()
        },
        OutputActivation::Sigmoid => {
            let [logit] = logits else {
                return Err(PredictionError::inference(format!(
                    "Sigmoid output expects a single logit, got {}",
                    logits.len()
                )));
            };
            let p = 1.0 / (1.0 + (-logit).exp());
            vec![1.0 - p, p]
        },
        OutputActivation::None => {
            if logits.iter().any(|p| !(-1e-4..=1.0 + 1e-4).contains(p)) {
                return Err(PredictionError::inference(
                    "Model outputs are not probabilities in [0, 1]",
                ));
            }
            logits.iter().map(|p| p.clamp(0.0, 1.0)).collect()
        },
    };

    if !TensorValidator::all_finite(&probabilities) {
        return Err(PredictionError::inference(
            "Class probabilities contain NaN or infinite values",
        ));
    }

    Ok(probabilities)
}
