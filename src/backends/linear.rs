//! Pooled-linear reference classifier
//!
//! Each input channel is average-pooled over a `grid × grid` lattice of cells
//! and the resulting `3 * grid * grid` features go through one dense layer.
//! It has no native dependencies, which makes it useful for smoke deployments,
//! benches and tests whose expected output can be worked out by hand.

use crate::error::{PredictionError, Result};
use crate::inference::InferenceBackend;
use crate::models::ModelManifest;
use ndarray::{Array2, Array4};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Weights file contents
///
/// Feature index for channel `c`, cell row `gy`, cell column `gx` is
/// `c * grid * grid + gy * grid + gx`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledLinearWeights {
    pub grid: usize,
    /// One row of `3 * grid * grid` weights per output
    pub weights: Vec<Vec<f32>>,
    /// One bias per output
    pub bias: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct PooledLinearBackend {
    weights: PooledLinearWeights,
    input_shape: (usize, usize, usize, usize),
}

impl PooledLinearBackend {
    /// Read weights JSON for the given manifest
    ///
    /// # Errors
    /// - File unreadable or malformed
    /// - Weights inconsistent with the manifest
    pub fn from_file(path: &Path, manifest: &ModelManifest) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PredictionError::model_error_with_context(
                "read",
                path,
                &e.to_string(),
                &["check file permissions"],
            )
        })?;
        let weights: PooledLinearWeights = serde_json::from_str(&content).map_err(|e| {
            PredictionError::model(format!(
                "Failed to parse weights '{}': {e}",
                path.display()
            ))
        })?;

        let backend = Self::new(weights, manifest.input_shape())?;
        if backend.outputs() != manifest.expected_outputs() {
            return Err(PredictionError::model(format!(
                "Weights define {} outputs but the manifest expects {}",
                backend.outputs(),
                manifest.expected_outputs()
            )));
        }

        log::info!(
            "Loaded pooled-linear weights: grid {}, {} outputs",
            backend.weights.grid,
            backend.outputs()
        );
        Ok(backend)
    }

    /// Build from in-memory weights
    ///
    /// # Errors
    /// - Zero grid, or a grid finer than the input
    /// - Weight rows of the wrong length, or bias count mismatch
    /// - Non-finite weights
    pub fn new(
        weights: PooledLinearWeights,
        input_shape: (usize, usize, usize, usize),
    ) -> Result<Self> {
        let (_, channels, height, width) = input_shape;
        let grid = weights.grid;

        if grid == 0 || grid > height || grid > width {
            return Err(PredictionError::model(format!(
                "Grid {grid} must be between 1 and the input size {width}x{height}"
            )));
        }

        if weights.weights.is_empty() {
            return Err(PredictionError::model("Weights must define at least one output"));
        }

        let features = channels * grid * grid;
        if let Some(row) = weights.weights.iter().position(|r| r.len() != features) {
            return Err(PredictionError::model(format!(
                "Weight row {row} has the wrong length, expected {features}"
            )));
        }

        if weights.bias.len() != weights.weights.len() {
            return Err(PredictionError::model(format!(
                "Expected {} bias values, got {}",
                weights.weights.len(),
                weights.bias.len()
            )));
        }

        let all_finite = weights
            .weights
            .iter()
            .flatten()
            .chain(weights.bias.iter())
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(PredictionError::model("Weights contain NaN or infinite values"));
        }

        Ok(Self {
            weights,
            input_shape,
        })
    }

    #[must_use]
    pub fn outputs(&self) -> usize {
        self.weights.weights.len()
    }

    /// Average of each channel over each grid cell
    fn pooled_features(&self, input: &Array4<f32>, batch: usize) -> Vec<f32> {
        let (_, channels, height, width) = self.input_shape;
        let grid = self.weights.grid;
        let mut features = Vec::with_capacity(channels * grid * grid);

        for c in 0..channels {
            for gy in 0..grid {
                let (y0, y1) = (gy * height / grid, (gy + 1) * height / grid);
                for gx in 0..grid {
                    let (x0, x1) = (gx * width / grid, (gx + 1) * width / grid);
                    let mut sum = 0.0f32;
                    for y in y0..y1 {
                        for x in x0..x1 {
                            sum += input.get((batch, c, y, x)).copied().unwrap_or(0.0);
                        }
                    }
                    let count = ((y1 - y0) * (x1 - x0)).max(1);
                    features.push(sum / count as f32);
                }
            }
        }

        features
    }
}

impl InferenceBackend for PooledLinearBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array2<f32>> {
        let (batch, channels, height, width) = input.dim();
        let (_, c, h, w) = self.input_shape;
        if (channels, height, width) != (c, h, w) {
            return Err(PredictionError::inference(format!(
                "Input {:?} does not match model input {:?}",
                input.shape(),
                self.input_shape
            )));
        }

        let mut output = Array2::<f32>::zeros((batch, self.outputs()));
        for b in 0..batch {
            let features = self.pooled_features(input, b);
            for (k, (row, bias)) in self
                .weights
                .weights
                .iter()
                .zip(&self.weights.bias)
                .enumerate()
            {
                let dot: f32 = row.iter().zip(&features).map(|(w, f)| w * f).sum();
                if let Some(slot) = output.get_mut((b, k)) {
                    *slot = dot + bias;
                }
            }
        }

        Ok(output)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.input_shape
    }

    fn name(&self) -> &'static str {
        "pooled-linear"
    }
}
