//! Backend implementations for different inference engines
//!
//! - Tract backend (ONNX graphs, pure Rust, no external dependencies)
//! - Pooled-linear backend (small reference classifier with JSON weights)

pub mod linear;

#[cfg(feature = "tract")]
pub mod tract;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

pub use self::linear::PooledLinearBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

use crate::{
    error::{PredictionError, Result},
    inference::InferenceBackend,
    models::{ModelKind, ModelManifest},
};
use std::path::Path;

/// Construct the backend a manifest asks for
///
/// # Errors
/// - Weights file missing or invalid
/// - Backend for the model kind not compiled in
pub fn create_backend(
    manifest: &ModelManifest,
    model_dir: &Path,
) -> Result<Box<dyn InferenceBackend>> {
    let weights_path = model_dir.join(&manifest.file);
    if !weights_path.is_file() {
        return Err(PredictionError::model_error_with_context(
            "load weights of",
            model_dir,
            &format!("'{}' not found", manifest.file.display()),
            &["check the \"file\" entry in model.json"],
        ));
    }

    match manifest.kind {
        ModelKind::PooledLinear => {
            let backend = PooledLinearBackend::from_file(&weights_path, manifest)?;
            Ok(Box::new(backend))
        },
        #[cfg(feature = "tract")]
        ModelKind::Onnx => {
            let backend = TractBackend::from_file(&weights_path, manifest)?;
            Ok(Box::new(backend))
        },
        #[cfg(not(feature = "tract"))]
        ModelKind::Onnx => Err(PredictionError::model(
            "ONNX models require the 'tract' feature",
        )),
    }
}
