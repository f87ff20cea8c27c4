use async_trait::async_trait;
use thiserror::Error;

use formpilot_core_types::{Job, JobResult};
use formpilot_driver::{DriverError, ModelServiceError};
use formpilot_job_store::StoreError;

/// A job-fatal execution failure.
///
/// Field-level trouble never surfaces here: it is absorbed into the
/// `JobResult` outcome list. Only errors that sink the whole job (failed
/// navigation, unusable analysis, unreachable store) bubble up.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Model(#[from] ModelServiceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Executes one claimed job end to end.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job) -> Result<JobResult, ExecuteError>;
}

/// Executor that does nothing and reports success; for tests and wiring
/// checks.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopExecutor;

#[async_trait]
impl JobExecutor for NoopExecutor {
    async fn execute(&self, _job: &Job) -> Result<JobResult, ExecuteError> {
        Ok(JobResult {
            success: true,
            field_outcomes: Vec::new(),
            submit: None,
            verification: None,
            error: None,
        })
    }
}
