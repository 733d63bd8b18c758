//! Per-request prediction pipeline
//!
//! Each request walks a fixed sequence of stages:
//! `Received → Decoded → Preprocessed → Inferred → Explained → Composited →
//! Responded`, with `Errored` reachable from any non-terminal stage. The
//! pipeline itself holds only immutable state, so one instance serves every
//! request concurrently.

use crate::{
    compositor::Compositor,
    config::{OverlayConfig, ServiceConfig},
    decoder::ImageDecoder,
    error::{PredictionError, Result},
    explanation::OcclusionExplainer,
    inference::ClassifierModel,
    types::{
        CompositeImage, PredictionBody, PredictionResponse, PredictionResult, ProcessingTimings,
    },
    utils::ImagePreprocessor,
};
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, info, span, warn, Level};
use uuid::Uuid;

/// Lifecycle stage of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    Decoded,
    Preprocessed,
    Inferred,
    Explained,
    Composited,
    Responded,
    Errored,
}

impl RequestStage {
    /// The only stage a successful step may move to
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Received => Some(Self::Decoded),
            Self::Decoded => Some(Self::Preprocessed),
            Self::Preprocessed => Some(Self::Inferred),
            Self::Inferred => Some(Self::Explained),
            Self::Explained => Some(Self::Composited),
            Self::Composited => Some(Self::Responded),
            Self::Responded | Self::Errored => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Responded | Self::Errored)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Decoded => "decoded",
            Self::Preprocessed => "preprocessed",
            Self::Inferred => "inferred",
            Self::Explained => "explained",
            Self::Composited => "composited",
            Self::Responded => "responded",
            Self::Errored => "errored",
        }
    }
}

impl std::fmt::Display for RequestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short-lived state of one request
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: Uuid,
    stage: RequestStage,
    timings: ProcessingTimings,
    started: Instant,
    stage_started: Instant,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    #[must_use]
    pub fn with_id(request_id: Uuid) -> Self {
        let now = Instant::now();
        Self {
            request_id,
            stage: RequestStage::Received,
            timings: ProcessingTimings::new(),
            started: now,
            stage_started: now,
        }
    }

    #[must_use]
    pub fn stage(&self) -> RequestStage {
        self.stage
    }

    #[must_use]
    pub fn timings(&self) -> &ProcessingTimings {
        &self.timings
    }

    /// Milliseconds since the request was received
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Move one stage forward, recording how long the finished stage took
    ///
    /// # Errors
    /// Returns `PredictionError::Internal` when `to` is not the single next
    /// stage of the current one.
    pub fn advance(&mut self, to: RequestStage) -> Result<()> {
        if self.stage.next() != Some(to) {
            return Err(PredictionError::internal(format!(
                "Invalid request stage transition {} -> {to}",
                self.stage
            )));
        }

        let stage_ms = self.stage_started.elapsed().as_millis() as u64;
        match to {
            RequestStage::Decoded => self.timings.decode_ms = stage_ms,
            RequestStage::Preprocessed => self.timings.preprocessing_ms = stage_ms,
            RequestStage::Inferred => self.timings.inference_ms = stage_ms,
            RequestStage::Explained => self.timings.explanation_ms = stage_ms,
            RequestStage::Composited => self.timings.compositing_ms = stage_ms,
            RequestStage::Responded => self.timings.total_ms = self.elapsed_ms(),
            RequestStage::Received | RequestStage::Errored => {},
        }

        debug!(
            request_id = %self.request_id,
            from = %self.stage,
            to = %to,
            stage_ms,
            "Request stage transition"
        );

        self.stage = to;
        self.stage_started = Instant::now();
        Ok(())
    }

    /// Enter the terminal error stage
    ///
    /// A request that already finished keeps its terminal stage.
    pub fn fail(&mut self, error: &PredictionError) {
        if self.stage.is_terminal() {
            return;
        }

        warn!(
            request_id = %self.request_id,
            from = %self.stage,
            kind = error.kind(),
            stage = error.stage().as_str(),
            "Request failed: {error}"
        );

        self.timings.total_ms = self.elapsed_ms();
        self.stage = RequestStage::Errored;
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a successful request produces
#[derive(Debug, Clone)]
pub struct PredictionOutcome {
    pub request_id: Uuid,
    pub prediction: PredictionResult,
    pub composite: CompositeImage,
    /// Relevance map carried no signal and the overlay shows none
    pub explanation_degraded: bool,
    pub response: PredictionResponse,
    pub timings: ProcessingTimings,
}

/// Decode → preprocess → infer → explain → composite over a shared model
#[derive(Debug, Clone)]
pub struct PredictionPipeline {
    model: Arc<ClassifierModel>,
    explainer: OcclusionExplainer,
    overlay: OverlayConfig,
    confidence_decimals: u8,
}

impl PredictionPipeline {
    /// # Errors
    /// Returns `PredictionError::InvalidConfig` when the configuration fails
    /// validation.
    pub fn new(model: Arc<ClassifierModel>, config: &ServiceConfig) -> Result<Self> {
        config.validate()?;
        let explainer = OcclusionExplainer::new(&config.explanation)
            .map_err(|e| PredictionError::invalid_config(e.to_string()))?;

        Ok(Self {
            model,
            explainer,
            overlay: config.overlay.clone(),
            confidence_decimals: config.confidence_decimals,
        })
    }

    #[must_use]
    pub fn model(&self) -> &Arc<ClassifierModel> {
        &self.model
    }

    /// Run the whole pipeline with a fresh request context
    ///
    /// # Errors
    /// The error of the first stage that failed.
    pub fn predict_bytes(
        &self,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<PredictionOutcome> {
        let mut context = RequestContext::new();
        self.run(bytes, content_type, &mut context)
    }

    /// Run the whole pipeline, advancing `context` through every stage
    ///
    /// On failure the context ends in `Errored` and no partial output exists.
    ///
    /// # Errors
    /// The error of the first stage that failed.
    pub fn run(
        &self,
        bytes: &[u8],
        content_type: Option<&str>,
        context: &mut RequestContext,
    ) -> Result<PredictionOutcome> {
        let _span = span!(
            Level::INFO,
            "request",
            request_id = %context.request_id,
            upload_bytes = bytes.len()
        )
        .entered();

        match self.run_stages(bytes, content_type, context) {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                context.fail(&error);
                Err(error)
            },
        }
    }

    fn run_stages(
        &self,
        bytes: &[u8],
        content_type: Option<&str>,
        context: &mut RequestContext,
    ) -> Result<PredictionOutcome> {
        let image = ImageDecoder::decode(bytes, content_type)?;
        context.advance(RequestStage::Decoded)?;

        let input = {
            let _span = span!(
                Level::DEBUG,
                "preprocessing",
                original_width = image.width(),
                original_height = image.height()
            )
            .entered();
            ImagePreprocessor::preprocess(&image, &self.model.manifest().preprocessing)?
        };
        context.advance(RequestStage::Preprocessed)?;

        let prediction = {
            let _span = span!(
                Level::DEBUG,
                "inference",
                backend = self.model.backend_name()
            )
            .entered();
            self.model.predict(&input)?
        };
        context.advance(RequestStage::Inferred)?;

        let relevance = {
            let _span = span!(Level::DEBUG, "explanation", class = %prediction.label).entered();
            self.explainer.explain(&self.model, &input, &prediction)?
        };
        context.advance(RequestStage::Explained)?;

        let composite = {
            let _span = span!(
                Level::DEBUG,
                "compositing",
                format = %self.overlay.format,
                colormap = %self.overlay.colormap
            )
            .entered();
            Compositor::composite(&image, &relevance, &self.overlay)?
        };
        context.advance(RequestStage::Composited)?;

        let response = PredictionResponse {
            prediction: PredictionBody {
                result: prediction.label.clone(),
                confidence: prediction.confidence_string(self.confidence_decimals),
            },
            superimposed_image: composite.to_base64(),
        };
        context.advance(RequestStage::Responded)?;

        info!(
            request_id = %context.request_id,
            label = %prediction.label,
            confidence = %response.prediction.confidence,
            degraded = relevance.degraded,
            total_ms = context.timings().total_ms,
            "Prediction completed"
        );

        Ok(PredictionOutcome {
            request_id: context.request_id,
            prediction,
            composite,
            explanation_degraded: relevance.degraded,
            response,
            timings: context.timings().clone(),
        })
    }
}
