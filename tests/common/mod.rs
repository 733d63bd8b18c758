//! Shared fixtures for integration tests
//!
//! The reference model is a 4x4 pooled-linear classifier over a 32x32 input
//! normalized with mean/std 0.5. Only the malignant row has weights: 1/16 on
//! every red-channel cell. A uniform red image therefore scores logits
//! `[0, 1]`, i.e. malignant with probability `sigmoid(1) = 0.7311`.

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lesionscope::{
    models::MANIFEST_FILE, ClassifierModel, OverlayFormat, PredictionPipeline, ServiceConfig,
};
use serde_json::json;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const GRID: usize = 4;
pub const TARGET: u32 = 32;
pub const GOLDEN_LABEL: &str = "malignant";
pub const GOLDEN_CONFIDENCE: &str = "0.7311";
/// `0.5 * 255 + 0.5 * jet(1).r * 255` for a red pixel at full relevance
pub const GOLDEN_OVERLAY: [u8; 3] = [191, 0, 0];

pub const BOUNDARY: &str = "lesionscope-boundary";

/// Write the reference model into a fresh temporary directory
pub fn reference_model_dir() -> TempDir {
    reference_model_dir_with(json!({}))
}

/// Reference model with extra `preprocessing` keys merged in
pub fn reference_model_dir_with(preprocessing_overrides: serde_json::Value) -> TempDir {
    let dir = tempfile::tempdir().expect("temp dir");

    let mut preprocessing = json!({
        "target_size": [TARGET, TARGET],
        "normalization_mean": [0.5, 0.5, 0.5],
        "normalization_std": [0.5, 0.5, 0.5],
        "resize": "stretch"
    });
    if let (Some(base), Some(extra)) = (
        preprocessing.as_object_mut(),
        preprocessing_overrides.as_object(),
    ) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }

    let manifest = json!({
        "name": "reference-pooled-linear",
        "kind": "pooled-linear",
        "file": "weights.json",
        "labels": ["benign", "malignant"],
        "preprocessing": preprocessing,
        "output": { "activation": "softmax" }
    });

    let features = 3 * GRID * GRID;
    let benign = vec![0.0f32; features];
    let mut malignant = vec![0.0f32; features];
    for weight in malignant.iter_mut().take(GRID * GRID) {
        *weight = 1.0 / (GRID * GRID) as f32;
    }
    let weights = json!({
        "grid": GRID,
        "weights": [benign, malignant],
        "bias": [0.0, 0.0]
    });

    write_json(&dir.path().join(MANIFEST_FILE), &manifest);
    write_json(&dir.path().join("weights.json"), &weights);
    dir
}

fn write_json(path: &Path, value: &serde_json::Value) {
    std::fs::write(path, serde_json::to_vec_pretty(value).expect("json")).expect("write");
}

/// Occlusion windows aligned with the 4x4 grid cells, PNG overlay
pub fn golden_config(model_dir: &Path) -> ServiceConfig {
    ServiceConfig::builder()
        .model_dir(model_dir)
        .occlusion_window(8)
        .occlusion_stride(8)
        .overlay_format(OverlayFormat::Png)
        .build()
        .expect("valid config")
}

pub fn load_model(model_dir: &Path) -> Arc<ClassifierModel> {
    Arc::new(ClassifierModel::load(model_dir).expect("reference model loads"))
}

pub fn golden_pipeline(model_dir: &Path) -> PredictionPipeline {
    PredictionPipeline::new(load_model(model_dir), &golden_config(model_dir))
        .expect("pipeline")
}

pub fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

/// Red on the left half, a darker tone on the right, so resizes have structure
pub fn two_tone(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([220, 40, 40])
        } else {
            Rgb([90, 60, 50])
        }
    })
}

pub fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("encode fixture");
    bytes
}

pub fn png(image: &RgbImage) -> Vec<u8> {
    encode(image, ImageFormat::Png)
}

pub fn jpeg(image: &RgbImage) -> Vec<u8> {
    encode(image, ImageFormat::Jpeg)
}

/// Largest per-channel difference between a pixel and an expected color
pub fn channel_distance(actual: [u8; 3], expected: [u8; 3]) -> u8 {
    actual
        .iter()
        .zip(expected)
        .map(|(a, e)| a.abs_diff(e))
        .max()
        .unwrap_or(0)
}

/// Multipart body with a single part
pub fn multipart_body(field: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
