//! Render worker.
//!
//! A single long-lived task that takes render requests off the queue one at
//! a time, runs the encoder to completion, records the outcome on the job
//! and hands the job to the cleanup scheduler.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use animstill_media::{
    build_render_command, remove_files, FfmpegRunner, ProgressEstimator, RenderSpec,
};
use animstill_models::RenderRequest;
use animstill_queue::{JobReceiver, JobStore};

use crate::cleanup::{CleanupHandle, CleanupTask};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Sequential render worker.
pub struct RenderWorker {
    config: WorkerConfig,
    store: Arc<JobStore>,
    cleanup: CleanupHandle,
    shutdown: watch::Receiver<bool>,
}

impl RenderWorker {
    /// Create a new worker.
    ///
    /// Setting `shutdown` to `true` stops the loop and kills an in-flight
    /// encoder.
    pub fn new(
        config: WorkerConfig,
        store: Arc<JobStore>,
        cleanup: CleanupHandle,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            store,
            cleanup,
            shutdown,
        }
    }

    /// Run the worker on a new task.
    pub fn spawn(self, receiver: JobReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver))
    }

    /// Process requests in submission order until shutdown or until every
    /// producer is gone.
    ///
    /// Requests still queued at that point never run: their records and
    /// files are dropped and later submissions are refused.
    pub async fn run(self, mut receiver: JobReceiver) {
        info!(
            ffmpeg = %self.config.ffmpeg_path.display(),
            fps = self.config.fps,
            width = self.config.width,
            height = self.config.height,
            "Render worker started"
        );

        let mut shutdown = self.shutdown.clone();
        let mut watching = true;

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed(), if watching => {
                    if changed.is_err() {
                        // Sender dropped without signalling; only the queue can end the loop now
                        watching = false;
                    }
                }

                request = receiver.recv() => match request {
                    Some(request) => {
                        metrics::set_queue_length(receiver.len());
                        self.process(request).await;
                    }
                    None => break,
                },
            }
        }

        let pending = receiver.close_and_drain();
        metrics::set_queue_length(0);
        for request in &pending {
            self.discard(request).await;
        }

        info!(discarded = pending.len(), "Render worker stopped");
    }

    /// Drop a request that never started, along with its record and files.
    async fn discard(&self, request: &RenderRequest) {
        let logger = JobLogger::for_request(request);
        let span = logger.span();

        async {
            self.store.remove(&request.job_id);
            remove_files(&[&request.input_path, &request.output_path]).await;
            metrics::record_job_discarded();
            logger.discarded();
        }
        .instrument(span)
        .await
    }

    /// Run one request to completion and schedule its cleanup.
    ///
    /// Never fails: every error, including a panic, ends up on the job.
    pub async fn process(&self, request: RenderRequest) {
        let logger = JobLogger::for_request(&request);
        let span = logger.span();

        async {
            logger.dequeued();
            metrics::record_queue_wait(logger.waited().as_secs_f64());
            let started = Instant::now();

            let outcome = AssertUnwindSafe(self.execute(&request, &logger))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(WorkerError::Panicked(panic_message(panic))));

            match outcome {
                Ok(url) => {
                    let elapsed = started.elapsed();
                    match self.store.succeed(&request.job_id, &url) {
                        Ok(()) => {
                            metrics::record_job_succeeded(
                                request.animation.as_str(),
                                elapsed.as_secs_f64(),
                            );
                            logger.succeeded(&url, elapsed);
                        }
                        Err(e) => logger.bookkeeping_failed("record_success", &e),
                    }
                }
                Err(e) => {
                    let message = e.job_error_message();
                    metrics::record_job_failed(e.reason());
                    logger.failed(&e, &message);
                    if let Err(store_err) = self.store.fail(&request.job_id, message) {
                        logger.bookkeeping_failed("record_failure", &store_err);
                    }
                }
            }

            if let Err(e) = self.cleanup.schedule(CleanupTask::for_request(&request)) {
                logger.bookkeeping_failed("schedule_cleanup", &e);
            }
        }
        .instrument(span)
        .await
    }

    /// Render one request, returning the public location of the video.
    async fn execute(&self, request: &RenderRequest, logger: &JobLogger) -> WorkerResult<String> {
        let floor = self.config.progress_floor;
        self.store.start(&request.job_id, floor)?;

        if !request.input_path.exists() {
            return Err(WorkerError::InputMissing(request.input_path.clone()));
        }

        let spec = RenderSpec::for_speed(
            request.animation,
            request.speed,
            self.config.fps,
            self.config.width,
            self.config.height,
        );
        let cmd = build_render_command(&spec, &request.input_path, &request.output_path);

        logger.encoding(&spec);

        let runner = FfmpegRunner::new()
            .with_program(&self.config.ffmpeg_path)
            .with_timeout(self.config.job_timeout.as_secs().max(1))
            .with_cancel(self.shutdown.clone());
        let estimator = ProgressEstimator::new(spec.duration_secs, floor, Instant::now());

        let store = Arc::clone(&self.store);
        let job_id = request.job_id.clone();
        let mut logged = floor;
        runner
            .run_with_progress(&cmd, estimator, move |pct| {
                if store.update_progress(&job_id, pct) {
                    logger.progress(logged, pct);
                    logged = pct;
                }
            })
            .await?;

        if !request.output_path.exists() {
            warn!("Encoder succeeded without writing output");
            return Err(WorkerError::job_failed("Encoder produced no output file"));
        }

        Ok(self.config.result_url(&request.output_path))
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
