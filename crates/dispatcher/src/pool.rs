//! The worker pool itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use formpilot_core_types::{JobId, JobResult, JobSpec, JobState};
use formpilot_job_queue::{JobQueue, QueueError};
use formpilot_job_store::{JobStore, RecoveryOutcome, StateUpdate, StoreError};

use crate::config::DispatcherConfig;
use crate::errors::DispatchError;
use crate::events::JobEvent;
use crate::executor::JobExecutor;

const CLAIM_RETRY_BACKOFF: Duration = Duration::from_millis(500);
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    executor: Arc<dyn JobExecutor>,
    config: DispatcherConfig,
    /// The single piece of in-process shared state: permits bound the
    /// number of concurrently running jobs.
    slots: Arc<Semaphore>,
    events: broadcast::Sender<JobEvent>,
    shutdown: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        executor: Arc<dyn JobExecutor>,
        config: DispatcherConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            store,
            queue,
            executor,
            config,
            slots,
            events,
            shutdown: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Jobs currently holding a run slot.
    pub fn running(&self) -> usize {
        self.config.max_concurrent_jobs - self.slots.available_permits()
    }

    /// Persist a new job and hand its id to the queue.
    pub async fn submit(&self, spec: JobSpec) -> Result<JobId, DispatchError> {
        let id = self.store.create(spec).await?;
        self.queue.enqueue(id.clone()).await?;
        let _ = self.events.send(JobEvent::Submitted(id.clone()));
        info!(job = %id, "job submitted");
        Ok(id)
    }

    /// Run startup recovery, then spawn the worker pool. Idempotent.
    pub async fn start(self: &Arc<Self>) -> Result<(), DispatchError> {
        self.recover_orphans().await?;

        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            return Ok(());
        }
        for worker in 0..self.config.effective_workers() {
            let this = Arc::clone(self);
            workers.push(tokio::spawn(async move { this.worker_loop(worker).await }));
        }
        info!(workers = workers.len(), bound = self.config.max_concurrent_jobs, "dispatcher started");
        Ok(())
    }

    /// Stop accepting work and wait for workers to drain.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        info!("dispatcher stopped");
    }

    /// Re-enqueue jobs stranded by a crash: `Running` jobs with no owning
    /// worker go back to `Pending` (bounded by the requeue budget), and
    /// `Pending` jobs are re-enqueued in case their original enqueue was
    /// lost. Claims are CAS-guarded, so duplicate queue entries are safe.
    async fn recover_orphans(&self) -> Result<(), DispatchError> {
        for id in self.store.jobs_in_state(JobState::Running).await? {
            match self.store.recover(&id, self.config.max_requeues).await {
                Ok(RecoveryOutcome::Requeued(count)) => {
                    warn!(job = %id, requeues = count, "re-enqueueing orphaned running job");
                    self.queue.enqueue(id).await?;
                }
                Ok(RecoveryOutcome::Abandoned) => {
                    warn!(job = %id, "orphaned job exceeded requeue budget; abandoned");
                    let _ = self.events.send(JobEvent::Failed {
                        id,
                        error: "abandoned by crash recovery".to_string(),
                    });
                }
                Err(err) => warn!(job = %id, error = %err, "orphan recovery failed"),
            }
        }

        for id in self.store.jobs_in_state(JobState::Pending).await? {
            self.queue.enqueue(id).await?;
        }
        Ok(())
    }

    async fn worker_loop(self: Arc<Self>, worker: usize) {
        debug!(worker, "worker started");
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            match self.queue.dequeue_blocking(self.config.dequeue_timeout).await {
                Err(QueueError::Closed) => break,
                Ok(None) => continue,
                Ok(Some(id)) => {
                    let permit = match Arc::clone(&self.slots).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    self.run_claimed(worker, id).await;
                    drop(permit);
                }
            }
        }
        debug!(worker, "worker stopped");
    }

    async fn run_claimed(&self, worker: usize, id: JobId) {
        // Claim is a CAS transition: exactly one worker wins a duplicate
        // delivery, everyone else sees InvalidTransition and moves on.
        let job = match self
            .store
            .transition(&id, JobState::Running, StateUpdate::default())
            .await
        {
            Ok(job) => job,
            Err(StoreError::InvalidTransition { from, .. }) => {
                debug!(job = %id, %from, "claim lost; job no longer pending");
                return;
            }
            Err(StoreError::NotFound(_)) => {
                warn!(job = %id, "dequeued id for unknown job");
                return;
            }
            Err(err @ StoreError::Persistence(_)) => {
                warn!(job = %id, error = %err, "claim failed; store unreachable, re-enqueueing");
                let _ = self.queue.enqueue(id).await;
                tokio::time::sleep(CLAIM_RETRY_BACKOFF).await;
                return;
            }
        };
        let _ = self.events.send(JobEvent::Started(id.clone()));
        info!(job = %id, worker, url = %job.url, "job claimed");

        let started = Instant::now();
        // On timeout the execute future is dropped, abandoning in-flight
        // driver calls; the driver cleans up its own session afterwards.
        let outcome = tokio::time::timeout(job.config.timeout, self.executor.execute(&job)).await;
        match outcome {
            Ok(Ok(result)) => {
                let success = result.success;
                match self
                    .store
                    .transition(&id, JobState::Completed, StateUpdate::with_result(result))
                    .await
                {
                    Ok(_) => {
                        info!(
                            job = %id,
                            worker,
                            success,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "job completed"
                        );
                        let _ = self.events.send(JobEvent::Completed(id));
                    }
                    Err(err) => warn!(job = %id, error = %err, "failed to persist completion"),
                }
            }
            Ok(Err(err)) => self.fail_job(&id, err.to_string()).await,
            Err(_) => {
                self.fail_job(&id, format!("job timed out after {:?}", job.config.timeout))
                    .await
            }
        }
    }

    async fn fail_job(&self, id: &JobId, message: String) {
        warn!(job = %id, error = %message, "job failed");
        let update = StateUpdate {
            result: Some(JobResult::fatal(message.clone())),
            error_message: Some(message.clone()),
        };
        if let Err(err) = self.store.transition(id, JobState::Failed, update).await {
            warn!(job = %id, error = %err, "failed to persist failure");
        }
        let _ = self.events.send(JobEvent::Failed {
            id: id.clone(),
            error: message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    use formpilot_core_types::{Job, JobConfig};
    use formpilot_driver::DriverError;
    use formpilot_job_queue::InMemoryJobQueue;
    use formpilot_job_store::MemoryJobStore;

    use crate::executor::{ExecuteError, NoopExecutor};

    fn spec() -> JobSpec {
        JobSpec::new("https://example.test/form").with_field("firstName", "Jan")
    }

    fn dispatcher(
        store: Arc<MemoryJobStore>,
        executor: Arc<dyn JobExecutor>,
        config: DispatcherConfig,
    ) -> Arc<Dispatcher> {
        let queue = Arc::new(InMemoryJobQueue::new());
        Arc::new(Dispatcher::new(store, queue, executor, config))
    }

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            dequeue_timeout: Duration::from_millis(20),
            ..DispatcherConfig::default()
        }
    }

    async fn wait_for_state(
        store: &MemoryJobStore,
        id: &JobId,
        state: JobState,
        budget: Duration,
    ) -> Job {
        let deadline = Instant::now() + budget;
        loop {
            let job = store.get(id).await.unwrap();
            if job.state == state {
                return job;
            }
            assert!(
                Instant::now() < deadline,
                "job {id} stuck in {} waiting for {state}",
                job.state
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn submitted_job_runs_to_completion() {
        let store = Arc::new(MemoryJobStore::new());
        let dispatcher = dispatcher(store.clone(), Arc::new(NoopExecutor), fast_config());
        dispatcher.start().await.unwrap();

        let id = dispatcher.submit(spec()).await.unwrap();
        let job = wait_for_state(&store, &id, JobState::Completed, Duration::from_secs(2)).await;
        assert!(job.result.unwrap().success);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_some());

        dispatcher.shutdown().await;
    }

    struct FailingExecutor;

    #[async_trait]
    impl JobExecutor for FailingExecutor {
        async fn execute(&self, job: &Job) -> Result<JobResult, ExecuteError> {
            Err(ExecuteError::Driver(DriverError::Navigation(format!(
                "cannot reach {}",
                job.url
            ))))
        }
    }

    #[tokio::test]
    async fn executor_error_fails_the_job_without_killing_the_worker() {
        let store = Arc::new(MemoryJobStore::new());
        let dispatcher = dispatcher(store.clone(), Arc::new(FailingExecutor), fast_config());
        dispatcher.start().await.unwrap();

        let failed = dispatcher.submit(spec()).await.unwrap();
        let job = wait_for_state(&store, &failed, JobState::Failed, Duration::from_secs(2)).await;
        assert!(job.error_message.unwrap().contains("navigation failed"));
        assert_eq!(
            store.interactions_for(&failed).await.unwrap().len(),
            0,
            "no interactions for a job that never reached its fields"
        );

        dispatcher.shutdown().await;
    }

    /// Executor that records the peak number of concurrent executions.
    struct GaugeExecutor {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GaugeExecutor {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JobExecutor for GaugeExecutor {
        async fn execute(&self, _job: &Job) -> Result<JobResult, ExecuteError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(JobResult {
                success: true,
                field_outcomes: Vec::new(),
                submit: None,
                verification: None,
                error: None,
            })
        }
    }

    #[tokio::test]
    async fn running_jobs_never_exceed_the_bound() {
        let store = Arc::new(MemoryJobStore::new());
        let gauge = GaugeExecutor::new();
        let config = DispatcherConfig {
            max_concurrent_jobs: 3,
            worker_count: Some(6),
            dequeue_timeout: Duration::from_millis(20),
            ..DispatcherConfig::default()
        };
        let dispatcher = dispatcher(store.clone(), gauge.clone(), config);
        dispatcher.start().await.unwrap();

        let mut ids = Vec::new();
        for _ in 0..10 {
            ids.push(dispatcher.submit(spec()).await.unwrap());
        }
        for id in &ids {
            wait_for_state(&store, id, JobState::Completed, Duration::from_secs(5)).await;
        }

        assert!(
            gauge.peak.load(Ordering::SeqCst) <= 3,
            "peak concurrency {} exceeded bound 3",
            gauge.peak.load(Ordering::SeqCst)
        );

        dispatcher.shutdown().await;
    }

    /// Counts how many times jobs were actually executed.
    struct CountingExecutor(AtomicUsize);

    #[async_trait]
    impl JobExecutor for CountingExecutor {
        async fn execute(&self, _job: &Job) -> Result<JobResult, ExecuteError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(JobResult {
                success: true,
                field_outcomes: Vec::new(),
                submit: None,
                verification: None,
                error: None,
            })
        }
    }

    #[tokio::test]
    async fn duplicate_queue_delivery_executes_once() {
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let counter = Arc::new(CountingExecutor(AtomicUsize::new(0)));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            queue.clone(),
            counter.clone(),
            fast_config(),
        ));

        let id = store.create(spec()).await.unwrap();
        // At-least-once delivery: the same id arrives twice.
        queue.enqueue(id.clone()).await.unwrap();
        queue.enqueue(id.clone()).await.unwrap();

        dispatcher.start().await.unwrap();
        wait_for_state(&store, &id, JobState::Completed, Duration::from_secs(2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        dispatcher.shutdown().await;
    }

    struct SlowExecutor;

    #[async_trait]
    impl JobExecutor for SlowExecutor {
        async fn execute(&self, _job: &Job) -> Result<JobResult, ExecuteError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(JobResult {
                success: true,
                field_outcomes: Vec::new(),
                submit: None,
                verification: None,
                error: None,
            })
        }
    }

    #[tokio::test]
    async fn job_timeout_fails_the_job() {
        let store = Arc::new(MemoryJobStore::new());
        let dispatcher = dispatcher(store.clone(), Arc::new(SlowExecutor), fast_config());
        dispatcher.start().await.unwrap();

        let spec = spec().with_config(JobConfig::default().with_timeout(Duration::from_millis(50)));
        let id = dispatcher.submit(spec).await.unwrap();
        let job = wait_for_state(&store, &id, JobState::Failed, Duration::from_secs(2)).await;
        assert!(job.error_message.unwrap().contains("timed out"));

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn startup_recovery_requeues_orphaned_running_jobs() {
        let store = Arc::new(MemoryJobStore::new());
        // Simulate a crash: job claimed but never finished.
        let id = store.create(spec()).await.unwrap();
        store
            .transition(&id, JobState::Running, StateUpdate::default())
            .await
            .unwrap();

        let dispatcher = dispatcher(store.clone(), Arc::new(NoopExecutor), fast_config());
        dispatcher.start().await.unwrap();

        let job = wait_for_state(&store, &id, JobState::Completed, Duration::from_secs(2)).await;
        assert_eq!(job.requeue_count, 1);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn recovery_abandons_past_the_requeue_budget() {
        let store = Arc::new(MemoryJobStore::new());
        let id = store.create(spec()).await.unwrap();
        store
            .transition(&id, JobState::Running, StateUpdate::default())
            .await
            .unwrap();

        let config = DispatcherConfig {
            max_requeues: 0,
            dequeue_timeout: Duration::from_millis(20),
            ..DispatcherConfig::default()
        };
        let dispatcher = dispatcher(store.clone(), Arc::new(NoopExecutor), config);
        dispatcher.start().await.unwrap();

        let job = wait_for_state(&store, &id, JobState::Failed, Duration::from_secs(2)).await;
        assert!(job.error_message.unwrap().contains("crash-recovery"));

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn events_cover_the_lifecycle() {
        let store = Arc::new(MemoryJobStore::new());
        let dispatcher = dispatcher(store.clone(), Arc::new(NoopExecutor), fast_config());
        let mut events = dispatcher.subscribe();
        dispatcher.start().await.unwrap();

        let id = dispatcher.submit(spec()).await.unwrap();
        wait_for_state(&store, &id, JobState::Completed, Duration::from_secs(2)).await;
        // The Completed event is sent just after the state becomes visible.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(format!("{event:?}"));
        }
        assert!(seen.iter().any(|e| e.starts_with("Submitted")));
        assert!(seen.iter().any(|e| e.starts_with("Started")));
        assert!(seen.iter().any(|e| e.starts_with("Completed")));

        dispatcher.shutdown().await;
    }
}
