//! Data types flowing through the prediction pipeline

use crate::config::OverlayFormat;
use base64::Engine as _;
use image::{ColorType, ImageFormat, RgbImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Decoded upload as RGB8 pixels
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: RgbImage,
    /// Container format detected while decoding
    pub source_format: Option<ImageFormat>,
    /// Color type before conversion to RGB8
    pub source_color: ColorType,
}

impl DecodedImage {
    /// Wrap an RGB buffer that did not come from an upload
    #[must_use]
    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self {
            pixels,
            source_format: None,
            source_color: ColorType::Rgb8,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// `(width, height)`
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// Rectangle in model-input pixels that holds image content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Geometry linking the original image to the model input
///
/// Used to project model-resolution maps back onto the original image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputTransform {
    /// Original `(width, height)`
    pub original: (u32, u32),
    /// Model input `(width, height)`
    pub model: (u32, u32),
    /// Where the resized image sits inside the model input
    pub content: ContentRegion,
}

impl InputTransform {
    /// Transform for an image that exactly fills the model input
    #[must_use]
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            original: (width, height),
            model: (width, height),
            content: ContentRegion {
                x: 0,
                y: 0,
                width,
                height,
            },
        }
    }
}

/// Normalized model input plus the geometry needed to map results back
#[derive(Debug, Clone)]
pub struct InputTensor {
    /// NCHW, `(1, 3, H, W)`
    pub data: Array4<f32>,
    pub transform: InputTransform,
}

impl InputTensor {
    /// Wrap a tensor that is already at model resolution
    #[must_use]
    pub fn for_model_input(data: Array4<f32>) -> Self {
        let (_, _, h, w) = data.dim();
        let transform = InputTransform::identity(w as u32, h as u32);
        Self { data, transform }
    }

    /// Model input `(width, height)`
    #[must_use]
    pub fn model_size(&self) -> (usize, usize) {
        let (_, _, h, w) = self.data.dim();
        (w, h)
    }
}

/// Classification outcome for one image
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub label: String,
    pub class_index: usize,
    /// Probability of `label`, in `[0, 1]`
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

impl PredictionResult {
    /// Confidence formatted the way clients receive it
    #[must_use]
    pub fn confidence_string(&self, decimals: u8) -> String {
        format!(
            "{:.*}",
            usize::from(decimals),
            self.confidence.clamp(0.0, 1.0)
        )
    }
}

/// Per-pixel relevance at original image resolution
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceMap {
    pub width: u32,
    pub height: u32,
    /// Row-major values in `[0, 1]`
    pub values: Vec<f32>,
    /// Set when no region influenced the prediction and the map is all zero
    pub degraded: bool,
    pub method: &'static str,
}

impl RelevanceMap {
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

/// Encoded overlay image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: OverlayFormat,
}

impl CompositeImage {
    /// Standard, padded base64 of the encoded bytes
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// `prediction` object of the response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionBody {
    pub result: String,
    pub confidence: String,
}

/// Successful `/predict` response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: PredictionBody,
    pub superimposed_image: String,
}

/// Per-stage wall clock timings of one request, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingTimings {
    pub decode_ms: u64,
    pub preprocessing_ms: u64,
    pub inference_ms: u64,
    pub explanation_ms: u64,
    pub compositing_ms: u64,
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
