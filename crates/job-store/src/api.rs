use std::time::Duration;

use async_trait::async_trait;

use formpilot_core_types::{Interaction, Job, JobId, JobMetrics, JobResult, JobSpec, JobState};

use crate::errors::StoreError;

/// Fields written alongside a state transition.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub result: Option<JobResult>,
    pub error_message: Option<String>,
}

impl StateUpdate {
    pub fn with_result(result: JobResult) -> Self {
        Self {
            result: Some(result),
            error_message: None,
        }
    }

    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            result: None,
            error_message: Some(message.into()),
        }
    }
}

/// What crash recovery did with an orphaned running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Returned to pending; the new requeue count is included.
    Requeued(u32),
    /// The requeue budget was exhausted; the job was force-failed.
    Abandoned,
}

/// Durable record of jobs and their interaction history.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job in `Pending` state.
    async fn create(&self, spec: JobSpec) -> Result<JobId, StoreError>;

    async fn get(&self, id: &JobId) -> Result<Job, StoreError>;

    /// Atomically move a job to `to`, compare-and-updating against the one
    /// legal predecessor state. `started_at` / `completed_at` are stamped by
    /// the store according to the target state.
    async fn transition(
        &self,
        id: &JobId,
        to: JobState,
        update: StateUpdate,
    ) -> Result<Job, StoreError>;

    /// Crash-recovery path for a job stranded in `Running` with no owning
    /// worker: requeue it (bumping the requeue count) or force-fail it once
    /// `max_requeues` is exceeded.
    async fn recover(&self, id: &JobId, max_requeues: u32) -> Result<RecoveryOutcome, StoreError>;

    /// Append-only insert; fails loudly, never silently.
    async fn append_interaction(&self, interaction: Interaction) -> Result<(), StoreError>;

    async fn interactions_for(&self, id: &JobId) -> Result<Vec<Interaction>, StoreError>;

    /// Interactions created within the trailing window, oldest first.
    async fn recent_interactions(&self, window: Duration) -> Result<Vec<Interaction>, StoreError>;

    async fn jobs_in_state(&self, state: JobState) -> Result<Vec<JobId>, StoreError>;

    /// Windowed counts and average duration over jobs created in the window.
    async fn aggregate_metrics(&self, window: Duration) -> Result<JobMetrics, StoreError>;
}
