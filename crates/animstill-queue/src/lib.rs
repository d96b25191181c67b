//! In-process job queue and job store.
//!
//! This crate provides:
//! - `JobStore`, the shared map of job records read by progress polls and
//!   written by the worker
//! - `JobQueue`, the unbounded FIFO of pending render requests

pub mod error;
pub mod queue;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use queue::{JobQueue, JobReceiver};
pub use store::JobStore;
