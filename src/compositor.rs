//! Heatmap compositing and encoding
//!
//! Renders a relevance map through a colormap and alpha-blends it onto the
//! original image: `out = (1 - α·r)·orig + α·r·colormap(r)` per channel.

use crate::{
    config::{Colormap, OverlayConfig, OverlayFormat},
    error::{PredictionError, Result},
    types::{CompositeImage, DecodedImage, RelevanceMap},
    utils::NumericValidator,
};
use image::{ImageEncoder, RgbImage};
use std::io::Cursor;

/// Map a relevance value in `[0, 1]` to RGB in `[0, 1]`
#[must_use]
pub fn colormap_rgb(colormap: Colormap, t: f32) -> [f32; 3] {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    match colormap {
        // Piecewise-linear jet: dark blue, cyan, yellow, dark red
        Colormap::Jet => [
            (1.5 - (4.0 * t - 3.0).abs()).clamp(0.0, 1.0),
            (1.5 - (4.0 * t - 2.0).abs()).clamp(0.0, 1.0),
            (1.5 - (4.0 * t - 1.0).abs()).clamp(0.0, 1.0),
        ],
        Colormap::Hot => [
            (3.0 * t).clamp(0.0, 1.0),
            (3.0 * t - 1.0).clamp(0.0, 1.0),
            (3.0 * t - 2.0).clamp(0.0, 1.0),
        ],
        Colormap::Grayscale => [t, t, t],
    }
}

/// Stateless overlay renderer
pub struct Compositor;

impl Compositor {
    /// Blend the relevance map onto the original pixels
    ///
    /// # Errors
    /// Returns `PredictionError::Composite` when the map and image shapes differ.
    pub fn blend(
        image: &DecodedImage,
        relevance: &RelevanceMap,
        config: &OverlayConfig,
    ) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        let expected = width as usize * height as usize;
        if (relevance.width, relevance.height) != (width, height)
            || relevance.values.len() != expected
        {
            return Err(PredictionError::composite(format!(
                "Relevance map {}x{} ({} values) does not match image {width}x{height}",
                relevance.width,
                relevance.height,
                relevance.values.len()
            )));
        }

        let alpha = config.alpha.clamp(0.0, 1.0);
        let mut output = RgbImage::new(width, height);

        for ((x, y, original), &r) in image.pixels.enumerate_pixels().zip(&relevance.values) {
            let r = if r.is_finite() { r.clamp(0.0, 1.0) } else { 0.0 };
            let weight = alpha * r;
            let color = colormap_rgb(config.colormap, r);

            let blended = std::array::from_fn(|c| {
                let orig = f32::from(original.0[c]);
                NumericValidator::to_pixel((1.0 - weight) * orig + weight * color[c] * 255.0)
            });
            output.put_pixel(x, y, image::Rgb(blended));
        }

        Ok(output)
    }

    /// Encode a rendered overlay
    ///
    /// # Errors
    /// Returns `PredictionError::Composite` on encoder failure.
    pub fn encode(image: &RgbImage, config: &OverlayConfig) -> Result<CompositeImage> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);

        match config.format {
            OverlayFormat::Jpeg => {
                let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut cursor,
                    config.jpeg_quality.clamp(1, 100),
                );
                encoder.encode_image(image).map_err(|e| {
                    PredictionError::composite(format!("JPEG encoding failed: {e}"))
                })?;
            },
            OverlayFormat::Png => {
                let encoder = image::codecs::png::PngEncoder::new(&mut cursor);
                encoder
                    .write_image(
                        image.as_raw(),
                        image.width(),
                        image.height(),
                        image::ExtendedColorType::Rgb8,
                    )
                    .map_err(|e| {
                        PredictionError::composite(format!("PNG encoding failed: {e}"))
                    })?;
            },
        }

        Ok(CompositeImage {
            bytes: buffer,
            width: image.width(),
            height: image.height(),
            format: config.format,
        })
    }

    /// Blend and encode in one step
    ///
    /// # Errors
    /// Same conditions as [`Compositor::blend`] and [`Compositor::encode`].
    pub fn composite(
        image: &DecodedImage,
        relevance: &RelevanceMap,
        config: &OverlayConfig,
    ) -> Result<CompositeImage> {
        let blended = Self::blend(image, relevance, config)?;
        Self::encode(&blended, config)
    }
}
