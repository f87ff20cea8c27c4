//! In-memory store for tests and single-process runs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use formpilot_core_types::{Interaction, Job, JobId, JobMetrics, JobSpec, JobState};

use crate::api::{JobStore, RecoveryOutcome, StateUpdate};
use crate::errors::StoreError;

/// Start of a trailing window, saturating at the epoch minimum for
/// absurdly large windows.
pub(crate) fn window_cutoff(window: Duration) -> chrono::DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|span| Utc::now().checked_sub_signed(span))
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC)
}

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    interactions: RwLock<Vec<Interaction>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_transition(job: &mut Job, to: JobState, update: StateUpdate) {
        let now = Utc::now();
        job.state = to;
        match to {
            JobState::Running => job.started_at = Some(now),
            JobState::Completed | JobState::Failed => job.completed_at = Some(now),
            JobState::Pending => {}
        }
        if update.result.is_some() {
            job.result = update.result;
        }
        if update.error_message.is_some() {
            job.error_message = update.error_message;
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, spec: JobSpec) -> Result<JobId, StoreError> {
        let job = Job::from_spec(spec);
        let id = job.id.clone();
        self.jobs.write().insert(id.clone(), job);
        Ok(id)
    }

    async fn get(&self, id: &JobId) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn transition(
        &self,
        id: &JobId,
        to: JobState,
        update: StateUpdate,
    ) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if !job.state.can_transition(to) {
            return Err(StoreError::InvalidTransition {
                job: id.clone(),
                from: job.state,
                to,
            });
        }
        Self::apply_transition(job, to, update);
        Ok(job.clone())
    }

    async fn recover(&self, id: &JobId, max_requeues: u32) -> Result<RecoveryOutcome, StoreError> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if job.state != JobState::Running {
            return Err(StoreError::InvalidTransition {
                job: id.clone(),
                from: job.state,
                to: JobState::Pending,
            });
        }
        if job.requeue_count >= max_requeues {
            Self::apply_transition(
                job,
                JobState::Failed,
                StateUpdate::with_error(format!(
                    "abandoned after {} crash-recovery requeues",
                    job.requeue_count
                )),
            );
            return Ok(RecoveryOutcome::Abandoned);
        }
        job.requeue_count += 1;
        job.state = JobState::Pending;
        job.started_at = None;
        Ok(RecoveryOutcome::Requeued(job.requeue_count))
    }

    async fn append_interaction(&self, interaction: Interaction) -> Result<(), StoreError> {
        if !self.jobs.read().contains_key(&interaction.job_id) {
            return Err(StoreError::NotFound(interaction.job_id.clone()));
        }
        self.interactions.write().push(interaction);
        Ok(())
    }

    async fn interactions_for(&self, id: &JobId) -> Result<Vec<Interaction>, StoreError> {
        Ok(self
            .interactions
            .read()
            .iter()
            .filter(|i| &i.job_id == id)
            .cloned()
            .collect())
    }

    async fn recent_interactions(&self, window: Duration) -> Result<Vec<Interaction>, StoreError> {
        let cutoff = window_cutoff(window);
        Ok(self
            .interactions
            .read()
            .iter()
            .filter(|i| i.created_at > cutoff)
            .cloned()
            .collect())
    }

    async fn jobs_in_state(&self, state: JobState) -> Result<Vec<JobId>, StoreError> {
        Ok(self
            .jobs
            .read()
            .values()
            .filter(|job| job.state == state)
            .map(|job| job.id.clone())
            .collect())
    }

    async fn aggregate_metrics(&self, window: Duration) -> Result<JobMetrics, StoreError> {
        let cutoff = window_cutoff(window);
        let jobs = self.jobs.read();
        let mut metrics = JobMetrics::default();
        let mut durations = Vec::new();
        for job in jobs.values().filter(|job| job.created_at > cutoff) {
            metrics.total += 1;
            match job.state {
                JobState::Completed => metrics.succeeded += 1,
                JobState::Failed => metrics.failed += 1,
                _ => {}
            }
            if let (Some(started), Some(completed)) = (job.started_at, job.completed_at) {
                durations.push((completed - started).num_milliseconds() as f64);
            }
        }
        if !durations.is_empty() {
            metrics.avg_duration_ms = Some(durations.iter().sum::<f64>() / durations.len() as f64);
        }
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formpilot_core_types::{ActionKind, JobResult, StrategyKind};

    fn spec() -> JobSpec {
        JobSpec::new("https://example.test/form").with_field("firstName", "Jan")
    }

    #[tokio::test]
    async fn create_then_full_lifecycle() {
        let store = MemoryJobStore::new();
        let id = store.create(spec()).await.unwrap();

        let job = store.get(&id).await.unwrap();
        assert_eq!(job.state, JobState::Pending);

        let running = store
            .transition(&id, JobState::Running, StateUpdate::default())
            .await
            .unwrap();
        assert!(running.started_at.is_some());

        let done = store
            .transition(
                &id,
                JobState::Completed,
                StateUpdate::with_result(JobResult {
                    success: true,
                    field_outcomes: Vec::new(),
                    submit: None,
                    verification: None,
                    error: None,
                }),
            )
            .await
            .unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert!(done.completed_at.is_some());
        assert!(done.result.unwrap().success);
    }

    #[tokio::test]
    async fn double_claim_is_rejected() {
        let store = MemoryJobStore::new();
        let id = store.create(spec()).await.unwrap();

        store
            .transition(&id, JobState::Running, StateUpdate::default())
            .await
            .unwrap();
        let err = store
            .transition(&id, JobState::Running, StateUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn terminal_states_are_final() {
        let store = MemoryJobStore::new();
        let id = store.create(spec()).await.unwrap();
        store
            .transition(&id, JobState::Running, StateUpdate::default())
            .await
            .unwrap();
        store
            .transition(&id, JobState::Failed, StateUpdate::with_error("boom"))
            .await
            .unwrap();

        for to in [JobState::Running, JobState::Completed] {
            let err = store
                .transition(&id, to, StateUpdate::default())
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidTransition { .. }));
        }
    }

    #[tokio::test]
    async fn interactions_require_existing_job() {
        let store = MemoryJobStore::new();
        let orphan = Interaction::success(
            JobId::new(),
            ActionKind::Fill,
            "#firstName",
            "text",
            StrategyKind::Declared,
            10,
        );
        let err = store.append_interaction(orphan).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let id = store.create(spec()).await.unwrap();
        let record = Interaction::success(
            id.clone(),
            ActionKind::Fill,
            "#firstName",
            "text",
            StrategyKind::Declared,
            10,
        );
        store.append_interaction(record).await.unwrap();
        assert_eq!(store.interactions_for(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recover_requeues_then_abandons() {
        let store = MemoryJobStore::new();
        let id = store.create(spec()).await.unwrap();
        store
            .transition(&id, JobState::Running, StateUpdate::default())
            .await
            .unwrap();

        assert_eq!(
            store.recover(&id, 1).await.unwrap(),
            RecoveryOutcome::Requeued(1)
        );
        let job = store.get(&id).await.unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert!(job.started_at.is_none());

        store
            .transition(&id, JobState::Running, StateUpdate::default())
            .await
            .unwrap();
        assert_eq!(
            store.recover(&id, 1).await.unwrap(),
            RecoveryOutcome::Abandoned
        );
        assert_eq!(store.get(&id).await.unwrap().state, JobState::Failed);
    }

    #[tokio::test]
    async fn metrics_aggregate_terminal_jobs() {
        let store = MemoryJobStore::new();
        let done = store.create(spec()).await.unwrap();
        store
            .transition(&done, JobState::Running, StateUpdate::default())
            .await
            .unwrap();
        store
            .transition(&done, JobState::Completed, StateUpdate::default())
            .await
            .unwrap();

        let failed = store.create(spec()).await.unwrap();
        store
            .transition(&failed, JobState::Running, StateUpdate::default())
            .await
            .unwrap();
        store
            .transition(&failed, JobState::Failed, StateUpdate::with_error("boom"))
            .await
            .unwrap();

        store.create(spec()).await.unwrap();

        let metrics = store
            .aggregate_metrics(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(metrics.total, 3);
        assert_eq!(metrics.succeeded, 1);
        assert_eq!(metrics.failed, 1);
        assert!(metrics.avg_duration_ms.is_some());
    }
}
