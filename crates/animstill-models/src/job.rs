//! Render job records and their lifecycle.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::animation::AnimationKind;
use crate::error::{JobError, JobResult};

/// Unique identifier for a render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in the queue
    #[default]
    Queued,
    /// Encoder is running for this job
    Running,
    /// Encoder exited with status zero
    Succeeded,
    /// Encoder failed or orchestration errored
    Failed,
    /// Retention window elapsed, record and artifacts purged
    Expired,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Expired => "expired",
        }
    }

    /// Finished states: no further progress or result changes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Expired)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Running)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed)
                | (JobState::Succeeded, JobState::Expired)
                | (JobState::Failed, JobState::Expired)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One render request's full lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Current lifecycle state
    pub state: JobState,

    /// Progress (0-100)
    pub progress: u8,

    /// Public location of the rendered video (succeeded jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,

    /// Failure reason (failed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Cropped still consumed by the encoder
    pub input_path: PathBuf,

    /// Rendered video written by the encoder
    pub output_path: PathBuf,

    /// Requested animation
    #[schemars(with = "String")]
    pub animation: AnimationKind,

    /// Requested speed multiplier
    pub speed: f64,

    /// Submission timestamp
    pub created_at: DateTime<Utc>,

    /// When the worker picked the job up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached `Succeeded` or `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job.
    pub fn new(
        id: JobId,
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        animation: AnimationKind,
        speed: f64,
    ) -> Self {
        Self {
            id,
            state: JobState::Queued,
            progress: 0,
            result_url: None,
            error_message: None,
            input_path: input_path.into(),
            output_path: output_path.into(),
            animation,
            speed,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn transition(&mut self, next: JobState) -> JobResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Accept the job for execution and raise progress to `floor`.
    pub fn start(&mut self, floor: u8) -> JobResult<()> {
        self.transition(JobState::Running)?;
        self.started_at = Some(Utc::now());
        self.progress = self.progress.max(floor.min(100));
        Ok(())
    }

    /// Record a progress estimate.
    ///
    /// Only running jobs accept updates and the value never goes down.
    /// Returns whether the stored value changed.
    pub fn record_progress(&mut self, value: u8) -> bool {
        let value = value.min(100);
        if self.state != JobState::Running || value <= self.progress {
            return false;
        }
        self.progress = value;
        true
    }

    /// Mark the job as succeeded.
    pub fn succeed(&mut self, result_url: impl Into<String>) -> JobResult<()> {
        self.transition(JobState::Succeeded)?;
        self.progress = 100;
        self.result_url = Some(result_url.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job as failed, keeping its last progress value.
    pub fn fail(&mut self, error: impl Into<String>) -> JobResult<()> {
        self.transition(JobState::Failed)?;
        self.error_message = Some(error.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job as expired ahead of its removal.
    pub fn expire(&mut self) -> JobResult<()> {
        self.transition(JobState::Expired)
    }

    /// Whether the job reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
