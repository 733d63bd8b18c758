//! Shared helpers for the prediction pipeline

pub mod preprocessing;
pub mod validation;

pub use preprocessing::ImagePreprocessor;
pub use validation::{NumericValidator, TensorValidator};
