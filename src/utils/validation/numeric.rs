//! Numeric conversion helpers
//!
//! Safe float-to-integer conversions for resize geometry and pixel math.

use crate::error::{PredictionError, Result};

/// Validator for numeric operations and conversions
pub struct NumericValidator;

impl NumericValidator {
    /// Safely convert f32 to u32 with bounds checking
    ///
    /// # Errors
    /// Returns `PredictionError::Preprocess` for non-finite, negative or
    /// out-of-range values.
    pub fn validate_f32_to_u32(value: f32) -> Result<u32> {
        if !value.is_finite() {
            return Err(PredictionError::preprocess(format!(
                "Cannot convert non-finite value {value} to u32"
            )));
        }

        if value < 0.0 {
            return Err(PredictionError::preprocess(format!(
                "Cannot convert negative value {value} to u32"
            )));
        }

        if value > u32::MAX as f32 {
            return Err(PredictionError::preprocess(format!(
                "Value {value} exceeds u32::MAX ({})",
                u32::MAX
            )));
        }

        Ok(value as u32)
    }

    /// Round a float pixel value into the `u8` range
    #[must_use]
    pub fn to_pixel(value: f32) -> u8 {
        if value.is_nan() {
            return 0;
        }
        value.round().clamp(0.0, 255.0) as u8
    }
}
