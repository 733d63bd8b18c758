//! Upload decoding
//!
//! Turns raw upload bytes into an RGB8 [`DecodedImage`]. The declared content
//! type is only a hint: a wrong `image/*` type falls back to sniffing the
//! bytes, and uploads without a useful type are always sniffed.

use crate::{
    error::{PredictionError, Result},
    types::DecodedImage,
    utils::validation::{TensorValidator, MAX_IMAGE_DIMENSION},
};
use image::{ColorType, DynamicImage, ImageFormat, ImageReader, Limits};
use std::io::Cursor;

/// Stateless decoder for uploaded image bytes
pub struct ImageDecoder;

/// How a declared content type should steer decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatHint {
    Sniff,
    Known(ImageFormat),
}

impl ImageDecoder {
    /// Decode uploaded bytes
    ///
    /// # Arguments
    /// * `bytes` - Raw upload body
    /// * `content_type` - Declared MIME type of the upload, if any
    ///
    /// # Errors
    /// Returns `PredictionError::Decode` when the bytes are empty, not an
    /// image, truncated, of an unsupported color type, outside the accepted
    /// dimensions, or declared as a non-image type.
    ///
    /// # Examples
    /// ```rust
    /// use lesionscope::ImageDecoder;
    ///
    /// let mut png = Vec::new();
    /// image::DynamicImage::new_rgb8(4, 3)
    ///     .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
    ///     .unwrap();
    ///
    /// let decoded = ImageDecoder::decode(&png, Some("image/png")).unwrap();
    /// assert_eq!(decoded.dimensions(), (4, 3));
    /// ```
    pub fn decode(bytes: &[u8], content_type: Option<&str>) -> Result<DecodedImage> {
        if bytes.is_empty() {
            return Err(PredictionError::decode("Upload is empty"));
        }

        let image = match Self::format_hint(content_type)? {
            FormatHint::Known(format) => match Self::decode_as(bytes, Some(format)) {
                Ok(image) => image,
                Err(hint_err) => {
                    log::debug!(
                        "Decoding as declared {format:?} failed ({hint_err}), sniffing content"
                    );
                    Self::decode_as(bytes, None)?
                },
            },
            FormatHint::Sniff => Self::decode_as(bytes, None)?,
        };

        let source_format = image::guess_format(bytes).ok();
        let source_color = image.color();
        Self::check_color_type(source_color)?;
        TensorValidator::validate_image_dimensions(image.width(), image.height())?;

        log::debug!(
            "Decoded {}x{} {:?} image ({:?})",
            image.width(),
            image.height(),
            source_format,
            source_color
        );

        Ok(DecodedImage {
            pixels: image.to_rgb8(),
            source_format,
            source_color,
        })
    }

    /// Interpret a declared content type
    fn format_hint(content_type: Option<&str>) -> Result<FormatHint> {
        let Some(raw) = content_type else {
            return Ok(FormatHint::Sniff);
        };

        let mime = raw
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if mime.is_empty() || mime == "application/octet-stream" {
            return Ok(FormatHint::Sniff);
        }

        if mime.starts_with("image/") {
            return Ok(ImageFormat::from_mime_type(&mime)
                .map_or(FormatHint::Sniff, FormatHint::Known));
        }

        Err(PredictionError::decode(format!(
            "Unsupported content type '{mime}', expected an image"
        )))
    }

    /// Decode with an explicit format, or by sniffing when `format` is `None`
    fn decode_as(bytes: &[u8], format: Option<ImageFormat>) -> Result<DynamicImage> {
        let mut reader = match format {
            Some(format) => ImageReader::with_format(Cursor::new(bytes), format),
            None => ImageReader::new(Cursor::new(bytes))
                .with_guessed_format()
                .map_err(|e| PredictionError::decode(format!("Failed to read upload: {e}")))?,
        };

        if reader.format().is_none() {
            return Err(PredictionError::decode(
                "Unrecognized image format (supported: JPEG, PNG, BMP, TIFF, WebP)",
            ));
        }

        let mut limits = Limits::default();
        limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
        limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
        reader.limits(limits);

        reader
            .decode()
            .map_err(|e| PredictionError::decode(format!("Failed to decode image: {e}")))
    }

    fn check_color_type(color: ColorType) -> Result<()> {
        match color {
            ColorType::L8
            | ColorType::La8
            | ColorType::Rgb8
            | ColorType::Rgba8
            | ColorType::L16
            | ColorType::La16
            | ColorType::Rgb16
            | ColorType::Rgba16
            | ColorType::Rgb32F
            | ColorType::Rgba32F => Ok(()),
            // `ColorType` is non-exhaustive; variants added by future `image` releases land here
            other => Err(PredictionError::decode(format!(
                "Unsupported color type {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayAlphaImage, LumaA, Rgba, RgbaImage};

    fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decode_png_and_jpeg() {
        let image = DynamicImage::new_rgb8(10, 7);
        for format in [ImageFormat::Png, ImageFormat::Jpeg] {
            let bytes = encode(&image, format);
            let decoded = ImageDecoder::decode(&bytes, None).unwrap();
            assert_eq!(decoded.dimensions(), (10, 7));
            assert_eq!(decoded.source_format, Some(format));
        }
    }

    #[test]
    fn test_alpha_is_discarded() {
        let rgba = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 0]));
        let bytes = encode(&DynamicImage::ImageRgba8(rgba), ImageFormat::Png);
        let decoded = ImageDecoder::decode(&bytes, Some("image/png")).unwrap();
        assert_eq!(decoded.pixels.get_pixel(0, 0).0, [10, 20, 30]);
        assert_eq!(decoded.source_color, ColorType::Rgba8);
    }

    #[test]
    fn test_every_known_color_type_is_accepted() {
        for color in [
            ColorType::L8,
            ColorType::La8,
            ColorType::Rgb8,
            ColorType::Rgba8,
            ColorType::L16,
            ColorType::La16,
            ColorType::Rgb16,
            ColorType::Rgba16,
            ColorType::Rgb32F,
            ColorType::Rgba32F,
        ] {
            assert!(ImageDecoder::check_color_type(color).is_ok(), "{color:?}");
        }
    }

    #[test]
    fn test_grayscale_alpha_expands_to_rgb() {
        let gray = GrayAlphaImage::from_pixel(3, 3, LumaA([200, 255]));
        let bytes = encode(&DynamicImage::ImageLumaA8(gray), ImageFormat::Png);
        let decoded = ImageDecoder::decode(&bytes, None).unwrap();
        assert_eq!(decoded.pixels.get_pixel(1, 1).0, [200, 200, 200]);
    }

    #[test]
    fn test_wrong_hint_falls_back_to_sniffing() {
        let bytes = encode(&DynamicImage::new_rgb8(5, 5), ImageFormat::Png);
        let decoded = ImageDecoder::decode(&bytes, Some("image/jpeg")).unwrap();
        assert_eq!(decoded.dimensions(), (5, 5));
        assert_eq!(decoded.source_format, Some(ImageFormat::Png));
    }

    #[test]
    fn test_octet_stream_and_parameters_are_sniffed() {
        let bytes = encode(&DynamicImage::new_rgb8(5, 5), ImageFormat::Png);
        assert!(ImageDecoder::decode(&bytes, Some("application/octet-stream")).is_ok());
        assert!(ImageDecoder::decode(&bytes, Some("IMAGE/PNG; q=1")).is_ok());
        assert!(ImageDecoder::decode(&bytes, Some("image/x-unknown")).is_ok());
    }

    #[test]
    fn test_non_image_content_type_rejected() {
        let bytes = encode(&DynamicImage::new_rgb8(5, 5), ImageFormat::Png);
        let err = ImageDecoder::decode(&bytes, Some("text/plain")).unwrap_err();
        assert!(matches!(err, PredictionError::Decode(_)));
        assert!(err.to_string().contains("text/plain"));
    }

    #[test]
    fn test_empty_and_garbage_rejected() {
        let err = ImageDecoder::decode(&[], None).unwrap_err();
        assert!(matches!(err, PredictionError::Decode(_)));

        let err = ImageDecoder::decode(b"This is not an image", None).unwrap_err();
        assert!(matches!(err, PredictionError::Decode(_)));
    }

    #[test]
    fn test_truncated_png_rejected() {
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_fn(64, 64, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 4) as u8, 128])
        }));
        let bytes = encode(&image, ImageFormat::Png);
        let truncated = &bytes[..bytes.len() / 2];
        let err = ImageDecoder::decode(truncated, Some("image/png")).unwrap_err();
        assert!(matches!(err, PredictionError::Decode(_)));
    }

    #[test]
    fn test_single_pixel_image() {
        let bytes = encode(&DynamicImage::new_rgb8(1, 1), ImageFormat::Png);
        let decoded = ImageDecoder::decode(&bytes, None).unwrap();
        assert_eq!(decoded.dimensions(), (1, 1));
    }
}
