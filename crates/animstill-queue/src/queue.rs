//! Unbounded FIFO of pending render requests.
//!
//! Any number of submission handlers hold a cloned [`JobQueue`]; the single
//! worker owns the [`JobReceiver`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use animstill_models::RenderRequest;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{QueueError, QueueResult};

/// Producer side of the render queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<RenderRequest>,
    depth: Arc<AtomicUsize>,
}

/// Consumer side of the render queue.
#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::UnboundedReceiver<RenderRequest>,
    depth: Arc<AtomicUsize>,
}

impl JobQueue {
    /// Create a queue and its single consumer.
    pub fn new() -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        (
            Self {
                tx,
                depth: Arc::clone(&depth),
            },
            JobReceiver { rx, depth },
        )
    }

    /// Append a request to the back of the queue.
    ///
    /// Fails only when the worker has stopped.
    pub fn enqueue(&self, request: RenderRequest) -> QueueResult<()> {
        let job_id = request.job_id.clone();
        self.depth.fetch_add(1, Ordering::SeqCst);

        if self.tx.send(request).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::enqueue_failed("render worker is not running"));
        }

        debug!(job_id = %job_id, depth = self.len(), "Enqueued render request");
        Ok(())
    }

    /// Requests waiting to be picked up.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the consumer is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl JobReceiver {
    /// Wait for the next request in submission order.
    ///
    /// Returns `None` once every producer is dropped and the queue drained.
    pub async fn recv(&mut self) -> Option<RenderRequest> {
        let request = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(request)
    }

    /// Refuse further requests and take everything still waiting.
    ///
    /// Later enqueues fail as if the worker were gone.
    pub fn close_and_drain(&mut self) -> Vec<RenderRequest> {
        self.rx.close();

        let mut pending = Vec::new();
        while let Ok(request) = self.rx.try_recv() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            pending.push(request);
        }
        pending
    }

    /// Requests waiting to be picked up.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
