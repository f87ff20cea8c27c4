use thiserror::Error;

/// Failures surfaced by the external browser driver.
#[derive(Debug, Error, Clone)]
pub enum DriverError {
    /// Navigation to the target URL failed; fatal to the owning job.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// No element matched the selector within the wait budget.
    #[error("element not found: {0}")]
    NotFound(String),

    /// The element was resolved but the action on it failed.
    #[error("action failed on {selector}: {reason}")]
    ActionFailed { selector: String, reason: String },

    /// The driver did not answer within the caller-supplied timeout.
    #[error("driver timed out: {0}")]
    Timeout(String),

    /// The underlying browser session is gone.
    #[error("browser session lost: {0}")]
    Session(String),
}

impl DriverError {
    /// Whether a field-level retry is worth attempting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::ActionFailed { .. } | DriverError::Timeout(_) | DriverError::NotFound(_)
        )
    }
}

/// Failures from the form-analysis / vision-model service.
///
/// The service is treated as unreliable: inside the resolver chain any of
/// these means "strategy unavailable" and the chain moves on.
#[derive(Debug, Error, Clone)]
pub enum ModelServiceError {
    #[error("model service timed out: {0}")]
    Timeout(String),

    #[error("model service unavailable: {0}")]
    Unavailable(String),

    #[error("model service returned malformed output: {0}")]
    Malformed(String),
}
