//! Deferred removal of finished jobs.
//!
//! One task owns a min-heap of deadlines. Scheduling is a channel send, so
//! the render loop never waits on a cleanup.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use animstill_models::{JobId, RenderRequest};
use animstill_queue::JobStore;

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Record and files to drop once a job's retention window is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupTask {
    pub job_id: JobId,
    pub artifacts: Vec<PathBuf>,
}

impl CleanupTask {
    pub fn new(job_id: JobId, artifacts: Vec<PathBuf>) -> Self {
        Self { job_id, artifacts }
    }

    /// Cleanup of a request's input still and rendered video.
    pub fn for_request(request: &RenderRequest) -> Self {
        Self::new(
            request.job_id.clone(),
            vec![request.input_path.clone(), request.output_path.clone()],
        )
    }
}

/// Heap entry, ordered so the earliest deadline is on top.
#[derive(Debug)]
struct ScheduledCleanup {
    deadline: Instant,
    seq: u64,
    task: CleanupTask,
}

impl PartialEq for ScheduledCleanup {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for ScheduledCleanup {}

impl PartialOrd for ScheduledCleanup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledCleanup {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: earlier deadline (then earlier schedule) first
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Cheap handle used to schedule cleanups.
#[derive(Debug, Clone)]
pub struct CleanupHandle {
    tx: mpsc::UnboundedSender<(Instant, CleanupTask)>,
    retention: Duration,
}

impl CleanupHandle {
    /// Schedule a cleanup one retention window from now.
    pub fn schedule(&self, task: CleanupTask) -> WorkerResult<()> {
        self.schedule_at(Instant::now() + self.retention, task)
    }

    /// Schedule a cleanup at an explicit deadline.
    pub fn schedule_at(&self, deadline: Instant, task: CleanupTask) -> WorkerResult<()> {
        self.tx
            .send((deadline, task))
            .map_err(|_| WorkerError::SchedulerStopped)
    }
}

/// Task that purges jobs when their deadline passes.
pub struct CleanupScheduler {
    store: Arc<JobStore>,
    rx: mpsc::UnboundedReceiver<(Instant, CleanupTask)>,
    heap: BinaryHeap<ScheduledCleanup>,
    next_seq: u64,
}

impl CleanupScheduler {
    /// Create a scheduler and the handle feeding it.
    pub fn new(store: Arc<JobStore>, retention: Duration) -> (Self, CleanupHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                store,
                rx,
                heap: BinaryHeap::new(),
                next_seq: 0,
            },
            CleanupHandle { tx, retention },
        )
    }

    /// Create a scheduler and run it on a new task.
    pub fn spawn(store: Arc<JobStore>, retention: Duration) -> (CleanupHandle, JoinHandle<()>) {
        let (scheduler, handle) = Self::new(store, retention);
        (handle, tokio::spawn(scheduler.run()))
    }

    /// Serve deadlines until every handle is dropped.
    ///
    /// Cleanups still pending at that point are abandoned.
    pub async fn run(mut self) {
        info!("Cleanup scheduler started");

        loop {
            let next_deadline = self.heap.peek().map(|entry| entry.deadline);

            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some((deadline, task)) => self.push(deadline, task),
                    None => break,
                },

                _ = sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {
                    self.run_due().await;
                }
            }
        }

        if !self.heap.is_empty() {
            warn!(pending = self.heap.len(), "Cleanup scheduler stopping with pending cleanups");
        }
        info!("Cleanup scheduler stopped");
    }

    fn push(&mut self, deadline: Instant, task: CleanupTask) {
        debug!(job_id = %task.job_id, "Cleanup scheduled");
        self.heap.push(ScheduledCleanup {
            deadline,
            seq: self.next_seq,
            task,
        });
        self.next_seq += 1;
        metrics::set_cleanup_pending(self.heap.len());
    }

    async fn run_due(&mut self) {
        let now = Instant::now();
        while self.heap.peek().is_some_and(|entry| entry.deadline <= now) {
            if let Some(entry) = self.heap.pop() {
                purge(&self.store, &entry.task).await;
            }
        }
        metrics::set_cleanup_pending(self.heap.len());
    }
}

/// Expire a job, drop its record and delete its artifacts.
///
/// Safe to run more than once: unknown records and missing files are
/// skipped. Failures are logged, never returned.
pub async fn purge(store: &JobStore, task: &CleanupTask) -> usize {
    match store.expire_and_remove(&task.job_id) {
        Ok(Some(_)) => metrics::record_job_expired(),
        Ok(None) => debug!(job_id = %task.job_id, "Job record already gone"),
        Err(e) => {
            // Not finished; drop the record anyway, the files are going away
            warn!(job_id = %task.job_id, error = %e, "Purging unfinished job");
            store.remove(&task.job_id);
        }
    }

    let removed = animstill_media::remove_files(&task.artifacts).await;
    info!(job_id = %task.job_id, removed, "Job expired");
    removed
}
