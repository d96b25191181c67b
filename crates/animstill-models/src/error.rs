//! Model error types.

use thiserror::Error;

use crate::job::JobState;

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum JobError {
    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Speed must be between 0.1 and 100, got {0}")]
    InvalidSpeed(String),
}

impl JobError {
    pub fn invalid_speed(speed: f64) -> Self {
        Self::InvalidSpeed(speed.to_string())
    }
}
