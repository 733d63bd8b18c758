//! Configuration types for the prediction service

use crate::error::{PredictionError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default port the mobile client posts to
pub const DEFAULT_PORT: u16 = 5000;

/// Encoded format of the superimposed image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlayFormat {
    /// Lossy, small, what the client expects by default
    #[default]
    Jpeg,
    /// Lossless, used when exact pixels matter
    Png,
}

impl OverlayFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

impl std::fmt::Display for OverlayFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jpeg => write!(f, "jpeg"),
            Self::Png => write!(f, "png"),
        }
    }
}

/// Colormap used to render relevance values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    /// Blue → cyan → yellow → red
    #[default]
    Jet,
    /// Black → red → yellow → white
    Hot,
    /// Black → white
    Grayscale,
}

impl std::fmt::Display for Colormap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jet => write!(f, "jet"),
            Self::Hot => write!(f, "hot"),
            Self::Grayscale => write!(f, "grayscale"),
        }
    }
}

/// How the heatmap is blended onto the original image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Blend strength α in `[0, 1]`
    pub alpha: f32,
    pub colormap: Colormap,
    pub format: OverlayFormat,
    /// JPEG quality (1-100, only used for JPEG output)
    pub jpeg_quality: u8,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            colormap: Colormap::Jet,
            format: OverlayFormat::Jpeg,
            jpeg_quality: 90,
        }
    }
}

/// Occlusion sensitivity parameters, in model-input pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplanationConfig {
    /// Side length of the square occluding window
    pub window: u32,
    /// Step between window positions
    pub stride: u32,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            window: 56,
            stride: 28,
        }
    }
}

/// HTTP listener and admission settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
    /// Requests allowed to run the pipeline at once (0 = unlimited)
    pub max_concurrent_requests: usize,
    /// Transport-level deadline for a single request
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: 20 * 1024 * 1024,
            max_concurrent_requests: 0,
            request_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Complete service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory containing `model.json`
    pub model_dir: Option<PathBuf>,
    /// Decimal places of the confidence string
    pub confidence_decimals: u8,
    pub server: ServerConfig,
    pub explanation: ExplanationConfig,
    pub overlay: OverlayConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            confidence_decimals: 4,
            server: ServerConfig::default(),
            explanation: ExplanationConfig::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use lesionscope::{Colormap, ServiceConfig};
    ///
    /// let config = ServiceConfig::builder()
    ///     .port(8080)
    ///     .colormap(Colormap::Hot)
    ///     .overlay_alpha(0.4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.server.port, 8080);
    /// ```
    #[must_use]
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Load a configuration file (JSON); missing keys take their defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - JSON is malformed or has wrong types
    /// - Resulting configuration fails validation
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PredictionError::invalid_config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            PredictionError::invalid_config(format!(
                "Failed to parse config file '{}': {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - Overlay alpha: 0.0-1.0, finite
    /// - JPEG quality: 1-100
    /// - Confidence decimals: 0-8
    /// - Occlusion window and stride: > 0
    /// - Upload limit and request timeout: > 0
    ///
    /// # Errors
    /// Returns `PredictionError::InvalidConfig` naming the first bad value.
    pub fn validate(&self) -> Result<()> {
        let alpha = self.overlay.alpha;
        if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
            return Err(PredictionError::config_value_error(
                "overlay alpha",
                alpha,
                "0.0-1.0",
            ));
        }

        if !(1..=100).contains(&self.overlay.jpeg_quality) {
            return Err(PredictionError::config_value_error(
                "JPEG quality",
                self.overlay.jpeg_quality,
                "1-100",
            ));
        }

        if self.confidence_decimals > 8 {
            return Err(PredictionError::config_value_error(
                "confidence decimals",
                self.confidence_decimals,
                "0-8",
            ));
        }

        if self.explanation.window == 0 {
            return Err(PredictionError::config_value_error(
                "occlusion window",
                self.explanation.window,
                "1 or more model pixels",
            ));
        }

        if self.explanation.stride == 0 {
            return Err(PredictionError::config_value_error(
                "occlusion stride",
                self.explanation.stride,
                "1 or more model pixels",
            ));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(PredictionError::config_value_error(
                "max upload bytes",
                self.server.max_upload_bytes,
                "1 or more",
            ));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(PredictionError::config_value_error(
                "request timeout",
                self.server.request_timeout_secs,
                "1 or more seconds",
            ));
        }

        Ok(())
    }
}

/// Builder for `ServiceConfig`
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    /// Start from an existing configuration (e.g. loaded from file)
    #[must_use]
    pub fn from_config(config: ServiceConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.server.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.server.max_upload_bytes = bytes;
        self
    }

    #[must_use]
    pub fn max_concurrent_requests(mut self, limit: usize) -> Self {
        self.config.server.max_concurrent_requests = limit;
        self
    }

    #[must_use]
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.server.request_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn confidence_decimals(mut self, decimals: u8) -> Self {
        self.config.confidence_decimals = decimals.min(8);
        self
    }

    #[must_use]
    pub fn occlusion_window(mut self, window: u32) -> Self {
        self.config.explanation.window = window;
        self
    }

    #[must_use]
    pub fn occlusion_stride(mut self, stride: u32) -> Self {
        self.config.explanation.stride = stride;
        self
    }

    /// Set blend strength, clamped to `[0, 1]`
    #[must_use]
    pub fn overlay_alpha(mut self, alpha: f32) -> Self {
        self.config.overlay.alpha = alpha.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn colormap(mut self, colormap: Colormap) -> Self {
        self.config.overlay.colormap = colormap;
        self
    }

    #[must_use]
    pub fn overlay_format(mut self, format: OverlayFormat) -> Self {
        self.config.overlay.format = format;
        self
    }

    /// Set JPEG quality, clamped to 1-100
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.overlay.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns `PredictionError::InvalidConfig` when validation fails.
    pub fn build(self) -> Result<ServiceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.confidence_decimals, 4);
        assert_eq!(config.overlay.format, OverlayFormat::Jpeg);
        assert_eq!(config.overlay.colormap, Colormap::Jet);
    }

    #[test]
    fn test_builder_clamps_values() {
        let config = ServiceConfig::builder()
            .overlay_alpha(3.0)
            .jpeg_quality(0)
            .confidence_decimals(42)
            .build()
            .unwrap();
        assert!((config.overlay.alpha - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.overlay.jpeg_quality, 1);
        assert_eq!(config.confidence_decimals, 8);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ServiceConfig::default();
        config.overlay.alpha = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.explanation.stride = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("occlusion stride"));

        let mut config = ServiceConfig::default();
        config.overlay.jpeg_quality = 101;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.server.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"overlay": {"colormap": "hot", "format": "png"}, "server": {"port": 8081}}"#;
        let config: ServiceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.overlay.colormap, Colormap::Hot);
        assert_eq!(config.overlay.format, OverlayFormat::Png);
        assert!((config.overlay.alpha - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.explanation, ExplanationConfig::default());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.json");
        std::fs::write(&path, r#"{"confidence_decimals": 2}"#).unwrap();
        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.confidence_decimals, 2);

        std::fs::write(&path, r#"{"confidence_decimals": "two"}"#).unwrap();
        assert!(ServiceConfig::from_file(&path).is_err());
        assert!(ServiceConfig::from_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_overlay_format_metadata() {
        assert_eq!(OverlayFormat::Jpeg.extension(), "jpg");
        assert_eq!(OverlayFormat::Png.extension(), "png");
        assert_eq!(Colormap::Grayscale.to_string(), "grayscale");
    }
}
