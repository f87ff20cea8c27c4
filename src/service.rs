//! The facade the front ends call: submit, status, results, metrics.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use formpilot_core_types::{JobId, JobMetrics, JobResult, JobSpec, JobState};
use formpilot_dispatcher::{Dispatcher, JobEvent};
use formpilot_driver::{BrowserDriver, ModelService};
use formpilot_job_queue::InMemoryJobQueue;
use formpilot_job_store::{JobStore, MemoryJobStore, SqliteJobStore, StoreError};
use formpilot_learning_store::{
    LearningStore, MemoryLearningStore, Optimizer, SqliteLearningStore,
};

use crate::config::{AppConfig, StorageBackend};
use crate::errors::ServiceError;
use crate::runner::FormRunner;

const HEALTH_INTERVAL: Duration = Duration::from_secs(30);
const HEALTH_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Point-in-time view of one job's lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub requeue_count: u32,
    pub interactions: usize,
    pub error_message: Option<String>,
}

pub struct AutomationService {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<Dispatcher>,
    optimizer: Arc<Optimizer>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AutomationService {
    pub async fn new(
        config: &AppConfig,
        driver: Arc<dyn BrowserDriver>,
        model: Arc<dyn ModelService>,
    ) -> Result<Self, ServiceError> {
        let (store, patterns): (Arc<dyn JobStore>, Arc<dyn LearningStore>) =
            match config.storage.backend {
                StorageBackend::Memory => (
                    Arc::new(MemoryJobStore::new()),
                    Arc::new(MemoryLearningStore::new()),
                ),
                StorageBackend::Sqlite => {
                    std::fs::create_dir_all(&config.storage.data_dir)
                        .map_err(|e| ServiceError::Store(StoreError::persistence(e)))?;
                    (
                        Arc::new(SqliteJobStore::open(config.storage.data_dir.join("jobs.db")).await?),
                        Arc::new(
                            SqliteLearningStore::open(config.storage.data_dir.join("learning.db"))
                                .await?,
                        ),
                    )
                }
            };

        let queue = Arc::new(InMemoryJobQueue::new());
        let runner = Arc::new(FormRunner::new(
            driver,
            model,
            Arc::clone(&store),
            Arc::clone(&patterns),
            config.resolver.runner_config(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            queue,
            runner,
            config.dispatcher.clone().into(),
        ));
        let optimizer = Arc::new(Optimizer::new(
            Arc::clone(&store),
            patterns,
            config.optimizer.clone().into(),
        ));

        Ok(Self {
            store,
            dispatcher,
            optimizer,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Run startup recovery, spawn the worker pool, the optimization sweep
    /// and the health tick. Idempotent.
    pub async fn start(&self) -> Result<(), ServiceError> {
        self.dispatcher.start().await?;

        let mut tasks = self.tasks.lock().await;
        if tasks.is_empty() {
            tasks.push(Arc::clone(&self.optimizer).spawn());
            tasks.push(self.spawn_health_tick());
        }
        info!("automation service started");
        Ok(())
    }

    fn spawn_health_tick(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.aggregate_metrics(HEALTH_WINDOW).await {
                    Ok(metrics) => info!(
                        active = dispatcher.running(),
                        total = metrics.total,
                        succeeded = metrics.succeeded,
                        failed = metrics.failed,
                        "health check"
                    ),
                    Err(err) => warn!(error = %err, "health check failed"),
                }
            }
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.dispatcher.subscribe()
    }

    pub async fn submit_job(&self, spec: JobSpec) -> Result<JobId, ServiceError> {
        Ok(self.dispatcher.submit(spec).await?)
    }

    pub async fn get_status(&self, id: &JobId) -> Result<JobStatus, ServiceError> {
        let job = self.store.get(id).await.map_err(ServiceError::from_store)?;
        let interactions = self.store.interactions_for(id).await?;
        Ok(JobStatus {
            id: job.id,
            state: job.state,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            requeue_count: job.requeue_count,
            interactions: interactions.len(),
            error_message: job.error_message,
        })
    }

    /// The per-attempt interaction log for one job.
    pub async fn get_interactions(
        &self,
        id: &JobId,
    ) -> Result<Vec<formpilot_core_types::Interaction>, ServiceError> {
        // Surfacing NotFound for the id keeps parity with get_status.
        self.store.get(id).await.map_err(ServiceError::from_store)?;
        Ok(self.store.interactions_for(id).await?)
    }

    /// The full result, or `Pending` while the job has not reached a
    /// terminal state.
    pub async fn get_results(&self, id: &JobId) -> Result<JobResult, ServiceError> {
        let job = self.store.get(id).await.map_err(ServiceError::from_store)?;
        if !job.state.is_terminal() {
            return Err(ServiceError::Pending(id.clone()));
        }
        Ok(job.result.unwrap_or_else(|| {
            JobResult::fatal(
                job.error_message
                    .unwrap_or_else(|| "no result recorded".to_string()),
            )
        }))
    }

    pub async fn metrics(&self, window: Duration) -> Result<JobMetrics, ServiceError> {
        Ok(self.store.aggregate_metrics(window).await?)
    }

    /// Run the learning sweep once, outside its periodic schedule.
    pub async fn run_sweep(&self) -> Result<usize, ServiceError> {
        Ok(self.optimizer.run_once().await?)
    }

    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("automation service stopped");
    }
}
