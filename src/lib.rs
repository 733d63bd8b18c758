#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Lesionscope
//!
//! Skin lesion classification with visual explanations. An uploaded photo is
//! decoded, preprocessed to the model's input tensor and classified. An
//! occlusion-sensitivity map shows which regions drove the decision, and that
//! map is blended onto the original photo as a heatmap.
//!
//! The same pipeline backs the HTTP service (`POST /predict`) and the
//! `lesionscope predict` command.
//!
//! ## Features
//!
//! - **Model directories**: `model.json` manifest plus ONNX graph or pooled-linear weights
//! - **Backends**: Tract (pure Rust ONNX) and a dependency-free pooled-linear classifier
//! - **Explanations**: occlusion sensitivity, model-agnostic and forward-pass only
//! - **Overlays**: jet, hot or grayscale heatmaps encoded as JPEG or PNG
//! - **HTTP service**: axum router with upload limits, concurrency cap and deadlines
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lesionscope::{load_pipeline, predict_from_reader, ServiceConfig};
//! use tokio::fs::File;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServiceConfig::builder()
//!     .model_dir("models/melanoma-mobilenet")
//!     .build()?;
//! let pipeline = load_pipeline(&config)?;
//!
//! let file = File::open("lesion.jpg").await?;
//! let outcome = predict_from_reader(file, &pipeline).await?;
//! println!(
//!     "{} ({})",
//!     outcome.response.prediction.result, outcome.response.prediction.confidence
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): ONNX models through the Tract runtime
//! - `cli` (default): command-line interface and subscriber setup
//! - `webp-support` (default): WebP uploads
//! - `tracing-json`: JSON log output

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod decoder;
pub mod error;
pub mod explanation;
pub mod inference;
pub mod models;
pub mod processor;
pub mod server;
pub mod tracing_config;
pub mod types;
pub mod utils;

use std::sync::Arc;
use tokio::io::AsyncRead;

// Public API exports
pub use backends::{create_backend, PooledLinearBackend};
#[cfg(feature = "tract")]
pub use backends::TractBackend;
pub use compositor::{colormap_rgb, Compositor};
pub use config::{
    Colormap, ExplanationConfig, OverlayConfig, OverlayFormat, ServerConfig, ServiceConfig,
    ServiceConfigBuilder,
};
pub use decoder::ImageDecoder;
pub use error::{ErrorStage, PredictionError, Result};
pub use explanation::OcclusionExplainer;
pub use inference::{ClassifierModel, InferenceBackend};
pub use models::{ModelInfo, ModelKind, ModelManifest, PreprocessingConfig, ResizePolicy};
pub use processor::{PredictionOutcome, PredictionPipeline, RequestContext, RequestStage};
pub use server::{router, serve, ApiError, AppState};
pub use tracing_config::{spans, TracingConfig, TracingFormat};
pub use types::{
    CompositeImage, DecodedImage, PredictionResponse, PredictionResult, ProcessingTimings,
    RelevanceMap,
};
pub use utils::{ImagePreprocessor, NumericValidator, TensorValidator};

/// Load the model named by `config.model_dir` and build a pipeline around it
///
/// # Errors
/// - `config.model_dir` is unset
/// - Manifest or weights cannot be loaded
/// - Configuration fails validation
pub fn load_pipeline(config: &ServiceConfig) -> Result<PredictionPipeline> {
    let model_dir = config
        .model_dir
        .as_deref()
        .ok_or_else(|| PredictionError::invalid_config("No model directory configured"))?;

    let model = ClassifierModel::load(model_dir)?;
    PredictionPipeline::new(Arc::new(model), config)
}

/// Run the pipeline on everything `reader` yields
///
/// The CPU-bound work runs on Tokio's blocking pool.
///
/// # Examples
///
/// ```rust,no_run
/// use lesionscope::{load_pipeline, predict_from_reader, ServiceConfig};
/// use std::io::Cursor;
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let config = ServiceConfig::builder().model_dir("models/reference").build()?;
/// let pipeline = load_pipeline(&config)?;
/// let outcome = predict_from_reader(Cursor::new(upload), &pipeline).await?;
/// std::fs::write("overlay.jpg", &outcome.composite.bytes)?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// - Reading from `reader` fails
/// - Any pipeline stage fails
/// - The blocking task panics
pub async fn predict_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    pipeline: &PredictionPipeline,
) -> Result<PredictionOutcome> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer).await?;

    let pipeline = pipeline.clone();
    tokio::task::spawn_blocking(move || pipeline.predict_bytes(&buffer, None))
        .await
        .map_err(|e| PredictionError::internal(format!("Prediction task failed: {e}")))?
}
