//! Job Queue: ordered handoff of job ids from submission to execution.
//!
//! FIFO is sufficient; delivery is at-least-once, with the dispatcher's
//! startup recovery scan covering anything lost between enqueue and the
//! store write. The blocking dequeue takes a timeout so workers can
//! periodically re-check shutdown and capacity.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use formpilot_core_types::JobId;

#[derive(Debug, Error, Clone)]
pub enum QueueError {
    /// The queue was shut down; no further entries will arrive.
    #[error("queue closed")]
    Closed,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job id to the tail.
    async fn enqueue(&self, id: JobId) -> Result<(), QueueError>;

    /// Pop the head, waiting up to `timeout` for an entry. `Ok(None)` on
    /// timeout lets the caller re-check its own conditions and retry.
    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<JobId>, QueueError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process FIFO queue.
#[derive(Default)]
pub struct InMemoryJobQueue {
    entries: Mutex<VecDeque<JobId>>,
    notify: Notify,
    closed: AtomicBool,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the queue: pending entries drain normally, then consumers see
    /// `QueueError::Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, id: JobId) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        debug!(job = %id, "enqueued");
        self.entries.lock().push_back(id);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<JobId>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            // The notified future must exist before the emptiness check or a
            // concurrent enqueue between check and await is lost.
            let notified = self.notify.notified();

            if let Some(id) = self.entries.lock().pop_front() {
                return Ok(Some(id));
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(QueueError::Closed);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
