//! Structured render job logging.
//!
//! Every render logs the same lifecycle: dequeued, encoding, progress
//! milestones, then exactly one outcome. All lines carry the job id,
//! animation and speed through the job span.

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, info_span, warn, Span};

use animstill_media::RenderSpec;
use animstill_models::{AnimationKind, JobId, RenderRequest};

use crate::error::WorkerError;

/// Progress logged at most once per step of this size.
const MILESTONE_STEP: u8 = 25;

/// Lifecycle logger for one render request.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    animation: AnimationKind,
    speed: f64,
    waited: Duration,
}

impl JobLogger {
    pub fn for_request(request: &RenderRequest) -> Self {
        let waited = (Utc::now() - request.submitted_at).to_std().unwrap_or_default();
        Self {
            job_id: request.job_id.clone(),
            animation: request.animation,
            speed: request.speed,
            waited,
        }
    }

    /// Span wrapping everything the worker does for this job.
    pub fn span(&self) -> Span {
        info_span!(
            "render",
            job_id = %self.job_id,
            animation = %self.animation,
            speed = self.speed
        )
    }

    /// How long the request sat in the queue.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    pub fn dequeued(&self) {
        info!(waited_ms = self.waited.as_millis() as u64, "Render dequeued");
    }

    pub fn encoding(&self, spec: &RenderSpec) {
        info!(
            duration_secs = spec.duration_secs,
            frames = spec.frames(),
            fps = spec.fps,
            "Encoding"
        );
    }

    /// Log progress when it crosses a milestone since `previous`.
    pub fn progress(&self, previous: u8, current: u8) {
        if let Some(milestone) = crossed_milestone(previous, current) {
            info!(progress = current, "Render {}% done", milestone);
        }
    }

    pub fn succeeded(&self, url: &str, elapsed: Duration) {
        info!(url, elapsed_ms = elapsed.as_millis() as u64, "Render succeeded");
    }

    pub fn failed(&self, err: &WorkerError, message: &str) {
        error!(reason = err.reason(), "Render failed: {}", message);
    }

    /// A bookkeeping step failed; the job itself is unaffected.
    pub fn bookkeeping_failed(&self, step: &str, err: &dyn std::fmt::Display) {
        warn!(step, error = %err, "Render bookkeeping failed");
    }

    /// Still queued when the worker stopped.
    pub fn discarded(&self) {
        warn!(waited_ms = self.waited.as_millis() as u64, "Render discarded at shutdown");
    }
}

/// Highest multiple of the milestone step in `(previous, current]`.
fn crossed_milestone(previous: u8, current: u8) -> Option<u8> {
    let milestone = current / MILESTONE_STEP * MILESTONE_STEP;
    (milestone > previous && milestone > 0).then_some(milestone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use animstill_models::RenderOptions;

    #[test]
    fn test_crossed_milestone() {
        assert_eq!(crossed_milestone(5, 20), None);
        assert_eq!(crossed_milestone(20, 25), Some(25));
        assert_eq!(crossed_milestone(25, 30), None);
        assert_eq!(crossed_milestone(30, 77), Some(75));
        assert_eq!(crossed_milestone(75, 99), None);
        assert_eq!(crossed_milestone(99, 100), Some(100));
        assert_eq!(crossed_milestone(0, 0), None);
    }

    #[test]
    fn test_logger_carries_request_details() {
        let options = RenderOptions::new(AnimationKind::PanVertical, 1.5).unwrap();
        let request = RenderRequest::new(JobId::new(), "in.jpg", "out.mp4", options);
        let logger = JobLogger::for_request(&request);

        assert_eq!(logger.job_id, request.job_id);
        assert_eq!(logger.animation, AnimationKind::PanVertical);
        assert_eq!(logger.speed, 1.5);
        assert!(logger.waited() < Duration::from_secs(5));
    }
}
