//! Facade-level error type.

use thiserror::Error;

use formpilot_core_types::JobId;
use formpilot_dispatcher::DispatchError;
use formpilot_job_store::StoreError;
use formpilot_learning_store::LearningError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Results were requested before the job reached a terminal state.
    #[error("job {0} has not finished yet")]
    Pending(JobId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Learning(#[from] LearningError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Surface a store-level NotFound as the caller-facing variant.
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::Store(other),
        }
    }
}
