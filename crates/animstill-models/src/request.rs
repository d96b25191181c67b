//! Render request payloads.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::animation::AnimationKind;
use crate::error::{JobError, JobResult};
use crate::job::{Job, JobId};

/// Default speed multiplier when the client sends none.
pub const DEFAULT_SPEED: f64 = 1.0;

/// Slowest accepted speed; caps clips at one minute.
pub const MIN_SPEED: f64 = 0.1;

/// Fastest accepted speed.
pub const MAX_SPEED: f64 = 100.0;

/// Client-chosen animation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct RenderOptions {
    /// Motion to apply
    pub animation: AnimationKind,
    /// Speed multiplier; higher values give shorter videos
    #[validate(range(min = 0.1, max = 100.0))]
    pub speed: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            animation: AnimationKind::Static,
            speed: DEFAULT_SPEED,
        }
    }
}

impl RenderOptions {
    /// Build options, rejecting speeds outside `MIN_SPEED..=MAX_SPEED`.
    pub fn new(animation: AnimationKind, speed: f64) -> JobResult<Self> {
        let options = Self { animation, speed };
        if !speed.is_finite() {
            return Err(JobError::invalid_speed(speed));
        }
        options
            .validate()
            .map_err(|_| JobError::invalid_speed(speed))?;
        Ok(options)
    }
}

/// Queue payload handed from the submission handler to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Job this request belongs to
    pub job_id: JobId,
    /// Cropped still consumed by the encoder
    pub input_path: PathBuf,
    /// Destination of the rendered video
    pub output_path: PathBuf,
    /// Motion to apply
    pub animation: AnimationKind,
    /// Speed multiplier
    pub speed: f64,
    /// When the request was submitted
    pub submitted_at: DateTime<Utc>,
}

impl RenderRequest {
    /// Create a new render request.
    pub fn new(
        job_id: JobId,
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        options: RenderOptions,
    ) -> Self {
        Self {
            job_id,
            input_path: input_path.into(),
            output_path: output_path.into(),
            animation: options.animation,
            speed: options.speed,
            submitted_at: Utc::now(),
        }
    }

    /// The queued job record matching this request.
    pub fn to_job(&self) -> Job {
        Job::new(
            self.job_id.clone(),
            self.input_path.clone(),
            self.output_path.clone(),
            self.animation,
            self.speed,
        )
    }
}
