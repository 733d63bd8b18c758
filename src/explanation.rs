//! Occlusion sensitivity explanations
//!
//! A square window slides over the model input. Each placement is filled with
//! the normalized channel mean (zero) and the model re-run; the drop in the
//! predicted class probability is the window's score. Every pixel gets the mean
//! score of the windows covering it, the map is max-normalized to `[0, 1]` and
//! then projected back onto the original image.
//!
//! Only forward passes are needed, so this works for every backend.

use crate::{
    config::ExplanationConfig,
    error::{PredictionError, Result},
    inference::ClassifierModel,
    types::{InputTensor, InputTransform, PredictionResult, RelevanceMap},
    utils::TensorValidator,
};
use image::{imageops::FilterType, ImageBuffer, Luma};
use ndarray::s;

/// Name reported for maps produced here
pub const METHOD_NAME: &str = "occlusion";

/// Peak score at or below which the map carries no usable signal
const DEGENERATE_SCORE: f32 = 1e-6;

/// Occlusion sensitivity generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcclusionExplainer {
    window: usize,
    stride: usize,
}

impl OcclusionExplainer {
    /// # Errors
    /// Returns `PredictionError::Explanation` for a zero window or stride.
    pub fn new(config: &ExplanationConfig) -> Result<Self> {
        if config.window == 0 || config.stride == 0 {
            return Err(PredictionError::explanation(format!(
                "Occlusion window and stride must be positive, got window {} stride {}",
                config.window, config.stride
            )));
        }

        Ok(Self {
            window: config.window as usize,
            stride: config.stride as usize,
        })
    }

    /// Relevance map for `prediction` at the original image resolution
    ///
    /// # Errors
    /// - An occluded forward pass fails or yields non-finite probabilities
    /// - The map contains non-finite values
    /// - The predicted class index is outside the model outputs
    pub fn explain(
        &self,
        model: &ClassifierModel,
        input: &InputTensor,
        prediction: &PredictionResult,
    ) -> Result<RelevanceMap> {
        let (model_width, model_height) = input.model_size();
        let (scores, degraded) = self.model_resolution_map(model, input, prediction)?;

        if degraded {
            tracing::warn!(
                window = self.window,
                stride = self.stride,
                label = %prediction.label,
                "Occlusion did not change the prediction; returning degraded all-zero map"
            );
        }

        let (orig_width, orig_height) = input.transform.original;
        let values = if degraded {
            vec![0.0; orig_width as usize * orig_height as usize]
        } else {
            project_to_original(&scores, model_width, model_height, &input.transform)?
        };

        Ok(RelevanceMap {
            width: orig_width,
            height: orig_height,
            values,
            degraded,
            method: METHOD_NAME,
        })
    }

    /// Normalized map at model resolution plus the degraded flag
    fn model_resolution_map(
        &self,
        model: &ClassifierModel,
        input: &InputTensor,
        prediction: &PredictionResult,
    ) -> Result<(Vec<f32>, bool)> {
        let (width, height) = input.model_size();
        let class = prediction.class_index;
        let baseline = prediction
            .probabilities
            .get(class)
            .copied()
            .ok_or_else(|| {
                PredictionError::explanation(format!("Class index {class} has no probability"))
            })?;

        let xs = window_positions(width, self.window, self.stride);
        let ys = window_positions(height, self.window, self.stride);
        let win_w = self.window.min(width);
        let win_h = self.window.min(height);

        let mut sums = vec![0.0f32; width * height];
        let mut counts = vec![0u32; width * height];
        let mut occluded = input.data.clone();

        for &y0 in &ys {
            for &x0 in &xs {
                let (y1, x1) = (y0 + win_h, x0 + win_w);
                occluded.slice_mut(s![.., .., y0..y1, x0..x1]).fill(0.0);

                let probabilities = model.probabilities(&occluded).map_err(|e| {
                    PredictionError::explanation(format!(
                        "Occluded forward pass at ({x0}, {y0}) failed: {e}"
                    ))
                })?;

                occluded
                    .slice_mut(s![.., .., y0..y1, x0..x1])
                    .assign(&input.data.slice(s![.., .., y0..y1, x0..x1]));

                let occluded_p = probabilities.get(class).copied().unwrap_or(baseline);
                let score = (baseline - occluded_p).max(0.0);

                for y in y0..y1 {
                    let row = y * width;
                    for x in x0..x1 {
                        if let (Some(sum), Some(count)) =
                            (sums.get_mut(row + x), counts.get_mut(row + x))
                        {
                            *sum += score;
                            *count += 1;
                        }
                    }
                }
            }
        }

        tracing::debug!(
            windows = xs.len() * ys.len(),
            window = self.window,
            stride = self.stride,
            "Occlusion passes completed"
        );

        let mut map: Vec<f32> = sums
            .iter()
            .zip(&counts)
            .map(|(&sum, &count)| if count == 0 { 0.0 } else { sum / count as f32 })
            .collect();

        if !TensorValidator::all_finite(&map) {
            return Err(PredictionError::explanation(
                "Relevance map contains NaN or infinite values",
            ));
        }

        let peak = map.iter().copied().fold(0.0f32, f32::max);
        if peak <= DEGENERATE_SCORE {
            return Ok((vec![0.0; width * height], true));
        }

        for value in &mut map {
            *value = (*value / peak).clamp(0.0, 1.0);
        }

        Ok((map, false))
    }
}

/// Start offsets of windows along one axis
///
/// Windows advance by `stride`; the last one is pulled back to end exactly at
/// the edge so every pixel is covered.
#[must_use]
pub fn window_positions(length: usize, window: usize, stride: usize) -> Vec<usize> {
    if length == 0 {
        return Vec::new();
    }

    let window = window.clamp(1, length);
    let stride = stride.max(1);
    let last = length - window;

    let mut positions = Vec::new();
    let mut position = 0;
    loop {
        positions.push(position);
        if position >= last {
            break;
        }
        position = (position + stride).min(last);
    }
    positions
}

/// Crop the content region and resize the map to the original image size
fn project_to_original(
    map: &[f32],
    model_width: usize,
    model_height: usize,
    transform: &InputTransform,
) -> Result<Vec<f32>> {
    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(model_width as u32, model_height as u32, map.to_vec()).ok_or_else(
            || PredictionError::explanation("Relevance map does not match model input size"),
        )?;

    let content = transform.content;
    let cropped = image::imageops::crop_imm(
        &buffer,
        content.x,
        content.y,
        content.width.max(1),
        content.height.max(1),
    )
    .to_image();

    let (orig_width, orig_height) = transform.original;
    let projected = if cropped.dimensions() == (orig_width, orig_height) {
        cropped
    } else {
        image::imageops::resize(&cropped, orig_width, orig_height, FilterType::Triangle)
    };

    let values: Vec<f32> = projected
        .into_raw()
        .into_iter()
        .map(|v| v.clamp(0.0, 1.0))
        .collect();

    if !TensorValidator::all_finite(&values) {
        return Err(PredictionError::explanation(
            "Projected relevance map contains NaN or infinite values",
        ));
    }

    Ok(values)
}
