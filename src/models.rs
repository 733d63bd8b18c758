//! Model manifest loading and metadata
//!
//! A model directory holds a `model.json` manifest next to the weights file it
//! names. The manifest fixes the label set, the preprocessing the model was
//! trained with and how raw outputs become probabilities.

use crate::error::{PredictionError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest file name expected inside a model directory
pub const MANIFEST_FILE: &str = "model.json";

/// Which backend executes the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// ONNX graph executed with Tract
    Onnx,
    /// Pure-Rust pooled features + dense layer, weights in JSON
    PooledLinear,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::PooledLinear => write!(f, "pooled-linear"),
        }
    }
}

/// How an arbitrary image is fitted to the model input size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResizePolicy {
    /// Resize to the exact target size, ignoring aspect ratio
    #[default]
    Stretch,
    /// Aspect-preserving resize, centered on a padded canvas
    Letterbox,
}

/// Channel order the model expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Memory layout of the model input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    #[default]
    Nchw,
    Nhwc,
}

/// Mapping from raw model outputs to class probabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// Softmax over one logit per label
    #[default]
    Softmax,
    /// Single logit for the positive class, two labels `[negative, positive]`
    Sigmoid,
    /// Outputs are already probabilities
    None,
}

/// Preprocessing the model was trained with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Model input size as `[height, width]`
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
    #[serde(default)]
    pub resize: ResizePolicy,
    /// Canvas color for letterbox padding
    #[serde(default)]
    pub padding_color: [u8; 3],
    #[serde(default)]
    pub channel_order: ChannelOrder,
    #[serde(default)]
    pub layout: TensorLayout,
}

impl PreprocessingConfig {
    #[must_use]
    pub fn height(&self) -> u32 {
        self.target_size[0]
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.target_size[1]
    }

    /// Check sizes and normalization constants
    ///
    /// # Errors
    /// - Zero target size
    /// - Non-finite mean, non-finite or non-positive std
    pub fn validate(&self) -> Result<()> {
        if self.target_size.contains(&0) {
            return Err(PredictionError::preprocess(format!(
                "Target size must be non-zero, got {}x{}",
                self.width(),
                self.height()
            )));
        }

        if self.normalization_mean.iter().any(|m| !m.is_finite()) {
            return Err(PredictionError::preprocess(
                "Normalization mean must be finite",
            ));
        }

        if self
            .normalization_std
            .iter()
            .any(|s| !s.is_finite() || *s <= 0.0)
        {
            return Err(PredictionError::preprocess(format!(
                "Normalization std must be positive, got {:?}",
                self.normalization_std
            )));
        }

        Ok(())
    }
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            target_size: [224, 224],
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
            resize: ResizePolicy::Stretch,
            padding_color: [0, 0, 0],
            channel_order: ChannelOrder::Rgb,
            layout: TensorLayout::Nchw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub activation: OutputActivation,
}

/// Parsed `model.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub name: String,
    pub kind: ModelKind,
    /// Weights file, relative to the model directory
    pub file: PathBuf,
    pub labels: Vec<String>,
    pub preprocessing: PreprocessingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ModelManifest {
    /// Read and validate `model.json` from a model directory
    ///
    /// # Errors
    /// - Directory missing or not a directory
    /// - Manifest missing, unreadable or malformed
    /// - Manifest fails validation
    pub fn from_dir<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let model_dir = model_dir.as_ref();

        if !model_dir.is_dir() {
            return Err(PredictionError::model_error_with_context(
                "open",
                model_dir,
                "path is not a directory",
                &["pass the directory that contains model.json"],
            ));
        }

        let manifest_path = model_dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&manifest_path).map_err(|e| {
            PredictionError::model_error_with_context(
                "read manifest of",
                model_dir,
                &e.to_string(),
                &["check that model.json exists and is readable"],
            )
        })?;

        let manifest: Self = serde_json::from_str(&content).map_err(|e| {
            PredictionError::model(format!(
                "Failed to parse {}: {e}",
                manifest_path.display()
            ))
        })?;

        manifest.validate()?;
        Ok(manifest)
    }

    /// Check internal consistency of the manifest
    ///
    /// # Errors
    /// Returns `PredictionError::Model` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PredictionError::model("Model name must not be empty"));
        }

        if self.labels.is_empty() {
            return Err(PredictionError::model("Model must declare at least one label"));
        }

        if self.labels.iter().any(|l| l.trim().is_empty()) {
            return Err(PredictionError::model("Labels must not be empty strings"));
        }

        if self.output.activation == OutputActivation::Sigmoid && self.labels.len() != 2 {
            return Err(PredictionError::model(format!(
                "Sigmoid output requires exactly 2 labels, got {}",
                self.labels.len()
            )));
        }

        self.preprocessing
            .validate()
            .map_err(|e| PredictionError::model(format!("Invalid preprocessing: {e}")))?;

        Ok(())
    }

    /// Number of raw values the backend must produce per sample
    #[must_use]
    pub fn expected_outputs(&self) -> usize {
        match self.output.activation {
            OutputActivation::Sigmoid => 1,
            OutputActivation::Softmax | OutputActivation::None => self.labels.len(),
        }
    }

    /// Expected NCHW input shape
    #[must_use]
    pub fn input_shape(&self) -> (usize, usize, usize, usize) {
        (
            1,
            3,
            self.preprocessing.height() as usize,
            self.preprocessing.width() as usize,
        )
    }
}

/// Public model description served on `GET /model`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub kind: ModelKind,
    pub backend: String,
    pub labels: Vec<String>,
    /// `[height, width]`
    pub input_size: [u32; 2],
    pub resize: ResizePolicy,
    pub activation: OutputActivation,
    pub explanation_method: String,
}
