//! HTTP surface.

use crate::error::ClipForgeError;
use crate::runner::TaskRunner;
use crate::task::{TaskId, TaskStatus, TaskView};
use crate::video::VideoGenerationRequest;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Message returned when a task is accepted.
pub const ACCEPTED_MESSAGE: &str = "Video generation started";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Runner that owns the task registry and the fallback chain.
    pub runner: TaskRunner,
}

impl AppState {
    /// Wraps a runner.
    pub fn new(runner: TaskRunner) -> Self {
        Self { runner }
    }
}

/// Errors returned to HTTP callers as `{"detail": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 404.
    #[error("{0}")]
    NotFound(&'static str),
    /// 400.
    #[error("{0}")]
    BadRequest(String),
    /// 500; the cause is logged, not returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, (*msg).to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(cause) => {
                tracing::error!(error = %cause, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Body of `POST /api/generate-video`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateVideoRequest {
    /// What the video should show.
    pub prompt: String,
    /// What the video should avoid.
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// Seed for providers that accept one.
    #[serde(default)]
    pub seed: Option<i64>,
}

/// Response of `POST /api/generate-video`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateVideoResponse {
    /// Identifier to poll with.
    pub task_id: String,
    /// Always `processing`.
    pub status: TaskStatus,
    /// Human-readable note.
    pub message: String,
}

/// Builds the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate-video", post(generate_video))
        .route("/api/video-status/{task_id}", get(video_status))
        .route("/api/videos/{task_id}", get(download_video))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn generate_video(
    State(state): State<AppState>,
    Json(body): Json<GenerateVideoRequest>,
) -> ApiResult<Json<GenerateVideoResponse>> {
    let prompt = body.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("Prompt must not be empty".into()));
    }

    let mut request = VideoGenerationRequest::new(prompt);
    if let Some(negative) = body.negative_prompt.filter(|n| !n.trim().is_empty()) {
        request = request.with_negative_prompt(negative);
    }
    if let Some(seed) = body.seed {
        request = request.with_seed(seed);
    }

    let id = state
        .runner
        .submit(request)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(GenerateVideoResponse {
        task_id: id.to_string(),
        status: TaskStatus::Processing,
        message: ACCEPTED_MESSAGE.to_string(),
    }))
}

async fn video_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskView>> {
    const NOT_FOUND: ApiError = ApiError::NotFound("Task not found");

    let id: TaskId = task_id.parse().map_err(|_| NOT_FOUND)?;
    match state.runner.status(id).await {
        Ok(view) => Ok(Json(view)),
        Err(e) if e.is_not_found() => Err(NOT_FOUND),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

async fn download_video(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Response> {
    const NOT_FOUND: ApiError = ApiError::NotFound("Video not found");

    let id: TaskId = task_id.parse().map_err(|_| NOT_FOUND)?;
    let path = match state.runner.fetch_artifact(id).await {
        Ok(path) => path,
        Err(e) if e.is_not_found() => return Err(NOT_FOUND),
        Err(e) => return Err(ApiError::Internal(e.to_string())),
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(task_id = %id, path = %path.display(), "video file missing");
            return Err(NOT_FOUND);
        }
        Err(e) => return Err(ApiError::Internal(ClipForgeError::from(e).to_string())),
    };
    let length = file.metadata().await.ok().map(|m| m.len());

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4");
    if let Some(length) = length {
        response = response.header(header::CONTENT_LENGTH, length);
    }
    response
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status() {
        let response = ApiError::NotFound("Task not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError::BadRequest("empty".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::Internal("disk full".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_generate_request_defaults() {
        let body: GenerateVideoRequest =
            serde_json::from_str(r#"{"prompt": "a cat flying"}"#).unwrap();
        assert_eq!(body.prompt, "a cat flying");
        assert!(body.negative_prompt.is_none());
        assert!(body.seed.is_none());
    }
}
