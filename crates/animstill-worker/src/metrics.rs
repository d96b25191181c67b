//! Worker-side job metrics.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUCCEEDED_TOTAL: &str = "animstill_jobs_succeeded_total";
    pub const JOBS_FAILED_TOTAL: &str = "animstill_jobs_failed_total";
    pub const JOBS_EXPIRED_TOTAL: &str = "animstill_jobs_expired_total";
    pub const JOBS_DISCARDED_TOTAL: &str = "animstill_jobs_discarded_total";
    pub const QUEUE_WAIT_SECONDS: &str = "animstill_queue_wait_seconds";
    pub const RENDER_DURATION_SECONDS: &str = "animstill_render_duration_seconds";
    pub const QUEUE_LENGTH: &str = "animstill_queue_length";
    pub const CLEANUP_PENDING: &str = "animstill_cleanup_pending";
}

/// Record a succeeded render.
pub fn record_job_succeeded(animation: &str, duration_secs: f64) {
    let labels = [("animation", animation.to_string())];
    counter!(names::JOBS_SUCCEEDED_TOTAL, &labels).increment(1);
    histogram!(names::RENDER_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a failed render.
pub fn record_job_failed(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

/// Record a purged job.
pub fn record_job_expired() {
    counter!(names::JOBS_EXPIRED_TOTAL).increment(1);
}

/// Record a queued job dropped at shutdown.
pub fn record_job_discarded() {
    counter!(names::JOBS_DISCARDED_TOTAL).increment(1);
}

/// Record time a request spent queued before the worker took it.
pub fn record_queue_wait(wait_secs: f64) {
    histogram!(names::QUEUE_WAIT_SECONDS).record(wait_secs);
}

/// Update queue length gauge.
pub fn set_queue_length(length: usize) {
    gauge!(names::QUEUE_LENGTH).set(length as f64);
}

/// Update pending cleanup gauge.
pub fn set_cleanup_pending(count: usize) {
    gauge!(names::CLEANUP_PENDING).set(count as f64);
}
