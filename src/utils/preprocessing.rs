//! Image preprocessing into model input tensors

use crate::{
    error::{PredictionError, Result},
    models::{ChannelOrder, PreprocessingConfig, ResizePolicy},
    types::{ContentRegion, DecodedImage, InputTensor, InputTransform},
    utils::validation::NumericValidator,
};
use image::{imageops::FilterType, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess a decoded image for model inference
    ///
    /// This function handles:
    /// - Resize to the model input size (stretch or letterbox)
    /// - Channel reordering
    /// - Normalization to tensor format (NCHW)
    ///
    /// # Arguments
    /// * `image` - Decoded upload
    /// * `config` - Model preprocessing configuration
    ///
    /// # Returns
    /// * `Ok(InputTensor)` - Normalized tensor plus the resize geometry
    /// * `Err(PredictionError)` - Degenerate image or invalid configuration
    pub fn preprocess(image: &DecodedImage, config: &PreprocessingConfig) -> Result<InputTensor> {
        config.validate()?;

        let (orig_width, orig_height) = image.dimensions();
        if orig_width == 0 || orig_height == 0 {
            return Err(PredictionError::preprocess(format!(
                "Cannot preprocess a zero-area image ({orig_width}x{orig_height})"
            )));
        }

        let (canvas, content) = match config.resize {
            ResizePolicy::Stretch => Self::stretch(&image.pixels, config),
            ResizePolicy::Letterbox => Self::letterbox(&image.pixels, config)?,
        };

        let tensor = Self::canvas_to_tensor(&canvas, config);

        Ok(InputTensor {
            data: tensor,
            transform: InputTransform {
                original: (orig_width, orig_height),
                model: (config.width(), config.height()),
                content,
            },
        })
    }

    /// Resize to the exact target size, ignoring aspect ratio
    fn stretch(pixels: &RgbImage, config: &PreprocessingConfig) -> (RgbImage, ContentRegion) {
        let (width, height) = (config.width(), config.height());
        let canvas = if pixels.dimensions() == (width, height) {
            pixels.clone()
        } else {
            image::imageops::resize(pixels, width, height, FilterType::Triangle)
        };

        let content = ContentRegion {
            x: 0,
            y: 0,
            width,
            height,
        };
        (canvas, content)
    }

    /// Aspect ratio preserving resize centered on a padded canvas
    fn letterbox(
        pixels: &RgbImage,
        config: &PreprocessingConfig,
    ) -> Result<(RgbImage, ContentRegion)> {
        let (target_width, target_height) = (config.width(), config.height());
        let (orig_width, orig_height) = pixels.dimensions();

        let scale = (target_width as f32 / orig_width as f32)
            .min(target_height as f32 / orig_height as f32);

        // Never collapse a side to zero, never overflow the canvas
        let new_width = NumericValidator::validate_f32_to_u32((orig_width as f32 * scale).round())?
            .clamp(1, target_width);
        let new_height =
            NumericValidator::validate_f32_to_u32((orig_height as f32 * scale).round())?
                .clamp(1, target_height);

        let resized =
            image::imageops::resize(pixels, new_width, new_height, FilterType::Triangle);

        let padding = config.padding_color;
        let mut canvas = ImageBuffer::from_pixel(
            target_width,
            target_height,
            image::Rgb([padding[0], padding[1], padding[2]]),
        );

        let offset_x = (target_width - new_width) / 2;
        let offset_y = (target_height - new_height) / 2;
        image::imageops::replace(&mut canvas, &resized, offset_x.into(), offset_y.into());

        let content = ContentRegion {
            x: offset_x,
            y: offset_y,
            width: new_width,
            height: new_height,
        };
        Ok((canvas, content))
    }

    /// Convert canvas to a normalized NCHW tensor
    #[allow(clippy::indexing_slicing)]
    // Safe: channel indices come from fixed 3-element tables
    fn canvas_to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        let source_channel = match config.channel_order {
            ChannelOrder::Rgb => [0, 1, 2],
            ChannelOrder::Bgr => [2, 1, 0],
        };

        for (x, y, pixel) in canvas.enumerate_pixels() {
            for (c, &src) in source_channel.iter().enumerate() {
                let value = f32::from(pixel.0[src]) / 255.0;
                let normalized =
                    (value - config.normalization_mean[c]) / config.normalization_std[c];
                if let Some(slot) = tensor.get_mut((0, c, y as usize, x as usize)) {
                    *slot = normalized;
                }
            }
        }

        tensor
    }
}
