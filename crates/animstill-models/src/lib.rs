//! Shared data models for the animstill backend.
//!
//! This crate provides Serde-serializable types for:
//! - Render jobs and their lifecycle state machine
//! - Animation kinds accepted from clients
//! - Render requests passed through the job queue

pub mod animation;
pub mod error;
pub mod job;
pub mod request;

// Re-export common types
pub use animation::AnimationKind;
pub use error::{JobError, JobResult};
pub use job::{Job, JobId, JobState};
pub use request::{RenderOptions, RenderRequest, DEFAULT_SPEED, MAX_SPEED, MIN_SPEED};
