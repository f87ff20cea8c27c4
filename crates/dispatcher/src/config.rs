use std::time::Duration;

/// Worker-pool tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Hard bound on concurrently running jobs.
    pub max_concurrent_jobs: usize,
    /// Worker tasks in the pool; defaults to the concurrency bound capped
    /// at a small count, since each job drives a whole browser session.
    pub worker_count: Option<usize>,
    /// How long a worker blocks on the queue before re-checking shutdown.
    pub dequeue_timeout: Duration,
    /// Crash-recovery requeues allowed before a job is abandoned.
    pub max_requeues: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            worker_count: None,
            dequeue_timeout: Duration::from_secs(5),
            max_requeues: 3,
        }
    }
}

impl DispatcherConfig {
    pub fn effective_workers(&self) -> usize {
        self.worker_count
            .unwrap_or_else(|| self.max_concurrent_jobs.min(4))
            .max(1)
    }
}
