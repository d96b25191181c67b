//! Worker error types.

use std::path::PathBuf;

use animstill_media::MediaError;
use animstill_queue::QueueError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Input image missing: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("Render worker panicked: {0}")]
    Panicked(String),

    #[error("Cleanup scheduler stopped")]
    SchedulerStopped,

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    /// Failure reason recorded on the job.
    pub fn job_error_message(&self) -> String {
        match self {
            WorkerError::Media(MediaError::Timeout(secs)) => {
                format!("Render timed out after {} seconds", secs)
            }
            WorkerError::Media(MediaError::Cancelled) => {
                "Render cancelled: worker shutting down".to_string()
            }
            WorkerError::Media(e) => e.detail(),
            other => other.to_string(),
        }
    }

    /// Metric label for the failure.
    pub fn reason(&self) -> &'static str {
        match self {
            WorkerError::Media(MediaError::Timeout(_)) => "timeout",
            WorkerError::Media(MediaError::Cancelled) => "cancelled",
            WorkerError::Media(MediaError::EncoderNotFound(_)) => "encoder_missing",
            WorkerError::Media(_) => "encoder",
            WorkerError::InputMissing(_) => "input_missing",
            WorkerError::Panicked(_) => "panic",
            _ => "internal",
        }
    }
}
