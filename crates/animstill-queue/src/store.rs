//! Shared job records.
//!
//! The worker is the only writer of a job once it is queued; progress polls
//! read snapshots. Every operation takes the lock for a single map access
//! and never across an `.await`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use animstill_models::{Job, JobId, JobState};
use tracing::debug;

use crate::error::{QueueError, QueueResult};

/// Map of job id to job record.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a record half-written,
    // every mutation is a single assignment on the record.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new job.
    pub fn insert(&self, job: Job) -> QueueResult<()> {
        let mut jobs = self.write();
        if jobs.contains_key(&job.id) {
            return Err(QueueError::DuplicateJob(job.id));
        }
        debug!(job_id = %job.id, "Registered job");
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    /// Snapshot of a job record.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Number of jobs currently in `state`.
    pub fn count_in_state(&self, state: JobState) -> usize {
        self.read().values().filter(|job| job.state == state).count()
    }

    fn update<T>(&self, id: &JobId, f: impl FnOnce(&mut Job) -> QueueResult<T>) -> QueueResult<T> {
        let mut jobs = self.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.clone()))?;
        f(job)
    }

    /// Move a queued job to `Running` with progress raised to `floor`.
    pub fn start(&self, id: &JobId, floor: u8) -> QueueResult<Job> {
        self.update(id, |job| {
            job.start(floor)?;
            Ok(job.clone())
        })
    }

    /// Record a progress estimate for a running job.
    ///
    /// Returns whether the stored value changed. Unknown ids, jobs that are
    /// not running and values that would lower progress are ignored.
    pub fn update_progress(&self, id: &JobId, value: u8) -> bool {
        self.write()
            .get_mut(id)
            .map(|job| job.record_progress(value))
            .unwrap_or(false)
    }

    /// Mark a running job as succeeded.
    pub fn succeed(&self, id: &JobId, result_url: impl Into<String>) -> QueueResult<()> {
        let result_url = result_url.into();
        self.update(id, |job| Ok(job.succeed(result_url)?))
    }

    /// Mark a running job as failed.
    pub fn fail(&self, id: &JobId, error: impl Into<String>) -> QueueResult<()> {
        let error = error.into();
        self.update(id, |job| Ok(job.fail(error)?))
    }

    /// Expire a finished job and drop its record.
    ///
    /// Returns the removed record, or `None` if the id is unknown.
    pub fn expire_and_remove(&self, id: &JobId) -> QueueResult<Option<Job>> {
        let mut jobs = self.write();
        let Some(job) = jobs.get_mut(id) else {
            return Ok(None);
        };
        job.expire()?;
        Ok(jobs.remove(id))
    }

    /// Drop a record regardless of its state.
    ///
    /// Used to roll back a submission that could not be enqueued.
    pub fn remove(&self, id: &JobId) -> Option<Job> {
        self.write().remove(id)
    }
}
