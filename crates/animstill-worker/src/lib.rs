//! Render worker.
//!
//! This crate provides:
//! - The sequential render loop fed by the job queue
//! - Deferred cleanup of finished jobs and their files
//! - Structured job logging and job metrics
//! - Graceful shutdown that interrupts an in-flight encoder

pub mod cleanup;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;

pub use cleanup::{purge, CleanupHandle, CleanupScheduler, CleanupTask};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::RenderWorker;
pub use logging::JobLogger;
