//! Application state.

use std::sync::Arc;

use animstill_queue::{JobQueue, JobStore};
use animstill_worker::WorkerConfig;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub worker_config: Arc<WorkerConfig>,
    pub store: Arc<JobStore>,
    pub queue: JobQueue,
}

impl AppState {
    /// Create new application state around the worker's store and queue.
    pub fn new(config: ApiConfig, worker_config: WorkerConfig, store: Arc<JobStore>, queue: JobQueue) -> Self {
        Self {
            config,
            worker_config: Arc::new(worker_config),
            store,
            queue,
        }
    }
}
