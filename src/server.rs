//! HTTP front end
//!
//! - `POST /predict`: multipart upload in field `file`, returns label, confidence
//!   and the base64 overlay
//! - `GET /health`: liveness
//! - `GET /model`: description of the loaded model
//!
//! The CPU-bound pipeline runs on Tokio's blocking pool. A concurrency cap and
//! a per-request deadline bound how much work the service accepts.

use crate::{
    config::ServiceConfig,
    error::{ErrorStage, PredictionError, Result},
    inference::ClassifierModel,
    models::ModelInfo,
    processor::{PredictionPipeline, RequestContext},
};
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Multipart field carrying the image
pub const UPLOAD_FIELD: &str = "file";

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const PROCESSING_TIME_HEADER: &str = "x-processing-time-ms";
pub const EXPLANATION_DEGRADED_HEADER: &str = "x-explanation-degraded";

/// Shared, immutable server state
#[derive(Debug)]
pub struct AppState {
    pipeline: PredictionPipeline,
    limiter: Option<Arc<Semaphore>>,
    request_timeout: Duration,
}

impl AppState {
    /// # Errors
    /// Returns `PredictionError::InvalidConfig` when the configuration fails
    /// validation.
    pub fn new(model: Arc<ClassifierModel>, config: &ServiceConfig) -> Result<Self> {
        let pipeline = PredictionPipeline::new(model, config)?;
        let limiter = match config.server.max_concurrent_requests {
            0 => None,
            permits => Some(Arc::new(Semaphore::new(permits))),
        };

        Ok(Self {
            pipeline,
            limiter,
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
        })
    }
}

/// `{"error": {...}}`
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    kind: &'static str,
    stage: &'static str,
    message: String,
}

/// Error response with a JSON body naming kind and stage
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    stage: &'static str,
    message: String,
    request_id: Option<Uuid>,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, stage: &'static str, message: String) -> Self {
        Self {
            status,
            kind,
            stage,
            message,
            request_id: None,
        }
    }

    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", "upload", message.into())
    }

    pub fn payload_too_large<S: Into<String>>(message: S) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            "upload",
            message.into(),
        )
    }

    #[must_use]
    pub fn overloaded() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "overloaded",
            "admission",
            "Server is at capacity, retry later".to_string(),
        )
    }

    #[must_use]
    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            "timeout",
            "transport",
            format!("Request exceeded the {}s time limit", limit.as_secs()),
        )
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "internal",
            message.into(),
        )
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        // Startup-only failures reaching a request are reported as internal
        let stage = match err.stage() {
            ErrorStage::Startup => ErrorStage::Internal.as_str(),
            stage => stage.as_str(),
        };
        Self::new(status, err.kind(), stage, err.public_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(kind = self.kind, stage = self.stage, "{}", self.message);
        }

        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind,
                stage: self.stage,
                message: self.message,
            },
        };

        let mut response = (self.status, Json(body)).into_response();
        if let Some(request_id) = self.request_id {
            insert_header(response.headers_mut(), REQUEST_ID_HEADER, &request_id.to_string());
        }
        response
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// Build the service router
pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .route("/model", get(model_info))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
///
/// # Errors
/// - Invalid configuration
/// - Listener cannot bind
/// - Server I/O failure
pub async fn serve(config: &ServiceConfig, model: Arc<ClassifierModel>) -> Result<()> {
    let state = Arc::new(AppState::new(model, config)?);
    let app = router(state, config.server.max_upload_bytes);

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        address = %address,
        max_upload_bytes = config.server.max_upload_bytes,
        max_concurrent_requests = config.server.max_concurrent_requests,
        request_timeout_secs = config.server.request_timeout_secs,
        "Listening on http://{address}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn model_info(State(state): State<Arc<AppState>>) -> Json<ModelInfo> {
    Json(state.pipeline.model().info())
}

async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Response, ApiError> {
    let request_id = Uuid::new_v4();
    handle_predict(state, multipart, request_id)
        .await
        .map_err(|e| e.with_request_id(request_id))
}

async fn handle_predict(
    state: Arc<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
    request_id: Uuid,
) -> std::result::Result<Response, ApiError> {
    let limit = state.request_timeout;
    // One deadline covers admission and processing
    let deadline = tokio::time::Instant::now() + limit;

    let permit = match &state.limiter {
        Some(limiter) => {
            match tokio::time::timeout_at(deadline, Arc::clone(limiter).acquire_owned()).await {
                Ok(Ok(permit)) => Some(permit),
                Ok(Err(_)) | Err(_) => {
                    warn!(request_id = %request_id, "Rejecting request: concurrency limit reached");
                    return Err(ApiError::overloaded());
                },
            }
        },
        None => None,
    };

    let work = async move {
        let (bytes, content_type) = read_upload(multipart?).await?;

        let pipeline_state = Arc::clone(&state);
        let outcome = tokio::task::spawn_blocking(move || {
            // Held until the pipeline finishes, even if the client is gone
            let _permit = permit;
            let mut context = RequestContext::with_id(request_id);
            pipeline_state
                .pipeline
                .run(&bytes, content_type.as_deref(), &mut context)
        })
        .await
        .map_err(|e| {
            if e.is_panic() {
                ApiError::internal("Request processing panicked")
            } else {
                ApiError::internal("Request processing was cancelled")
            }
        })??;

        let mut response = Json(&outcome.response).into_response();
        let headers = response.headers_mut();
        insert_header(headers, REQUEST_ID_HEADER, &request_id.to_string());
        insert_header(
            headers,
            PROCESSING_TIME_HEADER,
            &outcome.timings.total_ms.to_string(),
        );
        if outcome.explanation_degraded {
            insert_header(headers, EXPLANATION_DEGRADED_HEADER, "true");
        }
        Ok::<Response, ApiError>(response)
    };

    match tokio::time::timeout_at(deadline, work).await {
        Ok(result) => result,
        Err(_) => {
            warn!(request_id = %request_id, "Request abandoned after {}s", limit.as_secs());
            Err(ApiError::timeout(limit))
        },
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::bad_request(format!("Expected multipart/form-data: {}", rejection.body_text()))
    }
}

/// Pull the `file` field out of the multipart body
async fn read_upload(
    mut multipart: Multipart,
) -> std::result::Result<(Vec<u8>, Option<String>), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok((bytes.to_vec(), content_type));
    }

    Err(ApiError::bad_request(format!(
        "Missing multipart field '{UPLOAD_FIELD}'"
    )))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(format!("Upload too large: {}", err.body_text()))
    } else {
        ApiError::bad_request(format!("Malformed multipart body: {}", err.body_text()))
    }
}
