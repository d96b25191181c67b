//! Render submission handler.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::{debug, info, warn};

use animstill_media::{crop_to_widescreen, remove_files};
use animstill_models::{AnimationKind, JobId, RenderOptions, RenderRequest, DEFAULT_SPEED};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Response to an accepted submission.
#[derive(Serialize)]
pub struct SubmitResponse {
    pub id: JobId,
}

/// Fields collected from the multipart form.
#[derive(Default)]
struct RenderForm {
    image: Option<Vec<u8>>,
    animation: Option<String>,
    speed: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> ApiResult<RenderForm> {
    let mut form = RenderForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed form data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let is_image = field
                    .content_type()
                    .is_some_and(|ct| ct.starts_with("image/"));
                if !is_image {
                    metrics::record_upload_rejected("not_an_image");
                    return Err(ApiError::bad_request("Uploaded file must be an image"));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read image: {}", e)))?;
                form.image = Some(bytes.to_vec());
            }
            "animation" | "speed" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read {}: {}", name, e)))?;
                if name == "animation" {
                    form.animation = Some(value);
                } else {
                    form.speed = Some(value);
                }
            }
            // Unknown fields are ignored
            _ => {}
        }
    }

    Ok(form)
}

fn parse_options(form: &RenderForm) -> ApiResult<RenderOptions> {
    let animation = match form.animation.as_deref() {
        Some(name) => {
            if !AnimationKind::is_known(name) {
                debug!(animation = %name, "Unknown animation, rendering static");
            }
            AnimationKind::from_name(name)
        }
        None => AnimationKind::Static,
    };

    let speed = match form.speed.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_SPEED,
        Some(raw) => raw
            .parse::<f64>()
            .map_err(|_| ApiError::Validation(format!("Invalid speed: {}", raw)))?,
    };

    RenderOptions::new(animation, speed).map_err(|e| ApiError::Validation(e.to_string()))
}

/// Accept an image, crop it to 16:9 and queue it for rendering.
///
/// Nothing is registered unless the whole submission succeeds.
pub async fn submit_render(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    let form = read_form(multipart).await?;
    let options = parse_options(&form)?;
    let image = form.image.ok_or_else(|| {
        metrics::record_upload_rejected("missing_image");
        ApiError::bad_request("Missing image file")
    })?;

    let job_id = JobId::new();
    let uploads = &state.config.uploads_dir;
    let raw_path = uploads.join(format!("{}_in", job_id));
    let crop_path = uploads.join(format!("{}_crop.jpg", job_id));
    let output_path = state.config.renders_dir.join(format!("{}.mp4", job_id));

    tokio::fs::write(&raw_path, &image)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to store upload: {}", e)))?;

    let outcome = match crop_to_widescreen(&raw_path, &crop_path).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "Crop failed");
            metrics::record_upload_rejected("crop_failed");
            remove_files(&[&raw_path, &crop_path]).await;
            return Err(e.into());
        }
    };
    remove_files(&[&raw_path]).await;

    let request = RenderRequest::new(job_id.clone(), &crop_path, output_path, options);
    state.store.insert(request.to_job())?;

    if let Err(e) = state.queue.enqueue(request) {
        state.store.remove(&job_id);
        remove_files(&[&crop_path]).await;
        return Err(ApiError::Unavailable(e.to_string()));
    }

    metrics::record_job_enqueued(options.animation.as_str());
    animstill_worker::metrics::set_queue_length(state.queue.len());

    info!(
        job_id = %job_id,
        animation = %options.animation,
        speed = options.speed,
        source = ?outcome.source,
        "Render job queued"
    );

    Ok(Json(SubmitResponse { id: job_id }))
}
