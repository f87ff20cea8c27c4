use formpilot_core_types::{JobId, JobState};
use thiserror::Error;

/// Job Store error taxonomy.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// The backing store is unreachable or rejected the operation.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The requested lifecycle move is illegal from the job's current state.
    #[error("invalid transition for job {job}: {from} -> {to}")]
    InvalidTransition {
        job: JobId,
        from: JobState,
        to: JobState,
    },

    #[error("job not found: {0}")]
    NotFound(JobId),
}

impl StoreError {
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        StoreError::Persistence(err.to_string())
    }
}
