//! Tensor and image shape validation

use crate::error::{PredictionError, Result};
use ndarray::Array4;

/// Largest accepted image side, in pixels
pub const MAX_IMAGE_DIMENSION: u32 = 16384;

/// Validator for tensor shapes and image dimensions
pub struct TensorValidator;

impl TensorValidator {
    /// Validate tensor shape matches expected NCHW dimensions
    ///
    /// # Errors
    /// Returns `PredictionError::Inference` on mismatch.
    pub fn validate_tensor_shape(
        tensor: &Array4<f32>,
        expected_shape: (usize, usize, usize, usize),
    ) -> Result<()> {
        let actual = tensor.dim();
        if actual != expected_shape {
            let (batch, channels, height, width) = expected_shape;
            return Err(PredictionError::inference(format!(
                "Tensor shape mismatch. Expected [{}, {}, {}, {}], got [{}, {}, {}, {}]",
                batch, channels, height, width, actual.0, actual.1, actual.2, actual.3
            )));
        }

        Ok(())
    }

    /// Validate decoded image dimensions are within bounds
    ///
    /// # Errors
    /// Returns `PredictionError::Decode` for zero or oversized dimensions.
    pub fn validate_image_dimensions(width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(PredictionError::decode(format!(
                "Image dimensions must be non-zero, got {width}x{height}"
            )));
        }

        if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
            return Err(PredictionError::decode(format!(
                "Image dimensions too large: {width}x{height}. Maximum: {MAX_IMAGE_DIMENSION}x{MAX_IMAGE_DIMENSION}"
            )));
        }

        Ok(())
    }

    /// Whether every value is neither NaN nor infinite
    #[must_use]
    pub fn all_finite<'a, I>(values: I) -> bool
    where
        I: IntoIterator<Item = &'a f32>,
    {
        values.into_iter().all(|v| v.is_finite())
    }
}
