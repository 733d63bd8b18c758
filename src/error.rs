//! Error types for the prediction pipeline
//!
//! Every request-level failure names the pipeline stage that produced it so the
//! HTTP layer can pick a status code and the client can tell a bad upload from
//! a server fault.

use thiserror::Error;

/// Result type alias for prediction operations
pub type Result<T> = std::result::Result<T, PredictionError>;

/// Errors produced while loading the model or serving a prediction
#[derive(Error, Debug)]
pub enum PredictionError {
    /// Upload bytes are not a decodable, supported image
    #[error("Decode error: {0}")]
    Decode(String),

    /// Decoded image cannot be turned into a model input
    #[error("Preprocessing error: {0}")]
    Preprocess(String),

    /// Forward pass failed or produced unusable output
    #[error("Inference error: {0}")]
    Inference(String),

    /// Relevance map could not be computed
    #[error("Explanation error: {0}")]
    Explanation(String),

    /// Overlay could not be rendered or encoded
    #[error("Composite error: {0}")]
    Composite(String),

    /// Model loading or manifest errors (startup only)
    #[error("Model error: {0}")]
    Model(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (model files, config files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bugs and crashes inside request handling
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Pipeline stage an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    Decode,
    Preprocess,
    Inference,
    Explanation,
    Composite,
    Startup,
    Internal,
}

impl ErrorStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Preprocess => "preprocess",
            Self::Inference => "inference",
            Self::Explanation => "explanation",
            Self::Composite => "composite",
            Self::Startup => "startup",
            Self::Internal => "internal",
        }
    }
}

impl PredictionError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new preprocessing error
    pub fn preprocess<S: Into<String>>(msg: S) -> Self {
        Self::Preprocess(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new explanation error
    pub fn explanation<S: Into<String>>(msg: S) -> Self {
        Self::Explanation(msg.into())
    }

    /// Create a new composite error
    pub fn composite<S: Into<String>>(msg: S) -> Self {
        Self::Composite(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {} model '{}': {}.{}",
            operation, path_display, error, suggestion_text
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Stable machine-readable kind used in JSON error bodies
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::Preprocess(_) => "preprocess_error",
            Self::Inference(_) => "inference_error",
            Self::Explanation(_) => "explanation_error",
            Self::Composite(_) => "composite_error",
            Self::Model(_) | Self::InvalidConfig(_) | Self::Io(_) | Self::Internal(_) => {
                "internal_error"
            },
        }
    }

    #[must_use]
    pub fn stage(&self) -> ErrorStage {
        match self {
            Self::Decode(_) => ErrorStage::Decode,
            Self::Preprocess(_) => ErrorStage::Preprocess,
            Self::Inference(_) => ErrorStage::Inference,
            Self::Explanation(_) => ErrorStage::Explanation,
            Self::Composite(_) => ErrorStage::Composite,
            Self::Model(_) | Self::InvalidConfig(_) | Self::Io(_) => ErrorStage::Startup,
            Self::Internal(_) => ErrorStage::Internal,
        }
    }

    /// Whether the caller sent something we cannot process
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Preprocess(_))
    }

    /// HTTP status code this error maps to
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Decode(_) => 400,
            Self::Preprocess(_) => 422,
            _ => 500,
        }
    }

    /// Message that is safe to hand to a client
    ///
    /// Server-side faults that are not tied to a request stage collapse to a
    /// generic message so file paths and config details stay in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Model(_) | Self::InvalidConfig(_) | Self::Io(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            },
            other => other.to_string(),
        }
    }
}
