//! Job progress and download handlers.

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use animstill_models::{Job, JobId, JobState};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Progress poll response.
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub id: JobId,
    pub state: JobState,
    pub progress: u8,
    pub done: bool,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl From<Job> for ProgressResponse {
    fn from(job: Job) -> Self {
        Self {
            done: job.is_terminal(),
            id: job.id,
            state: job.state,
            progress: job.progress,
            url: job.result_url,
            error: job.error_message,
        }
    }
}

/// Snapshot of a job's progress.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProgressResponse>> {
    let job = state
        .store
        .get(&JobId::from_string(id))
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    Ok(Json(job.into()))
}

/// Rendered video of a succeeded job as an attachment.
///
/// The file is streamed, and range and conditional requests are honoured.
pub async fn download_render(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    let job = state
        .store
        .get(&JobId::from_string(id))
        .filter(|job| job.state == JobState::Succeeded)
        .ok_or_else(|| ApiError::not_found("Render not found"))?;

    let response = match ServeFile::new(&job.output_path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    if response.status() == StatusCode::NOT_FOUND {
        return Err(ApiError::not_found("Render not found"));
    }

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}.mp4\"", job.id))
        .map_err(|e| ApiError::internal(format!("Invalid download name: {}", e)))?;
    let mut response = response.map(Body::new);
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, disposition);

    Ok(response)
}
