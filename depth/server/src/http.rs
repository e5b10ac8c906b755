use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Request, State,
    },
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use depth_pipeline::{DepthSurface, ErrorCategory, FetchError, Provider};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Upper bound on an uploaded request body.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const IMAGE_FIELD: &str = "image";

#[derive(Clone)]
struct AppState {
    provider: Arc<Provider>,
}

#[derive(Debug, Serialize)]
struct DepthMapResponse {
    depth_map: DepthSurface,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid upload: {0}")]
    InvalidInput(String),

    #[error("upload exceeds the body size limit")]
    TooLarge,

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid image upload"),
            ApiError::TooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "image upload is too large"),
            ApiError::Fetch(e) => match e.category() {
                ErrorCategory::InvalidInput => (StatusCode::BAD_REQUEST, "invalid image upload"),
                ErrorCategory::Timeout => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "timed out waiting for the depth map",
                ),
                ErrorCategory::UpstreamUnavailable => {
                    (StatusCode::BAD_GATEWAY, "depth provider is unavailable")
                }
                ErrorCategory::UpstreamRejected => {
                    (StatusCode::BAD_GATEWAY, "depth provider failed to process the image")
                }
                ErrorCategory::MalformedUpstreamResponse => (
                    StatusCode::BAD_GATEWAY,
                    "depth provider returned an unexpected response",
                ),
            },
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::TooLarge
        } else {
            ApiError::InvalidInput(e.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!("request failed: {:#}", self);
        } else {
            warn!("request rejected: {:#}", self);
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

pub fn router(provider: Provider) -> Router {
    let state = AppState {
        provider: Arc::new(provider),
    };
    Router::new()
        .route("/api/upload", post(upload).options(preflight))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

/// Allows browser clients from any origin.
async fn cors_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[instrument(skip_all, level = "info")]
async fn upload(
    State(state): State<AppState>,
    form: Result<Multipart, MultipartRejection>,
) -> Result<Json<DepthMapResponse>, ApiError> {
    let mut form = form.map_err(|e| ApiError::InvalidInput(e.body_text()))?;
    let image = read_image_field(&mut form).await?;
    validate_image(&image)?;
    info!(size = image.len(), "received image");

    let depth_map = state.provider.fetch(&image).await?;
    Ok(Json(DepthMapResponse { depth_map }))
}

async fn read_image_field(form: &mut Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = form.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            let bytes = field.bytes().await?;
            if bytes.is_empty() {
                return Err(ApiError::InvalidInput("image field is empty".to_string()));
            }
            return Ok(bytes.to_vec());
        }
    }
    Err(ApiError::InvalidInput(format!(
        "missing multipart field {:?}",
        IMAGE_FIELD
    )))
}

/// Reject anything that is not a decodable image before it reaches the provider.
fn validate_image(bytes: &[u8]) -> Result<(), ApiError> {
    let format = image::guess_format(bytes)
        .map_err(|e| ApiError::InvalidInput(format!("unrecognized image format: {}", e)))?;
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ApiError::InvalidInput(format!("undecodable {:?} image: {}", format, e)))?;
    Ok(())
}
