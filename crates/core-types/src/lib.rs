//! Shared primitives for the formpilot engine crates.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod descriptor;
pub mod interaction;
pub mod job;

pub use descriptor::{
    CompletionCheck, ElementDescriptor, FormAnalysis, Point, StrategyKind, VisualMatch,
};
pub use interaction::{ActionKind, Interaction};
pub use job::{
    FieldOutcome, FileRef, Job, JobConfig, JobMetrics, JobResult, JobSpec, JobState, StrategyMode,
};

/// Identity of one end-to-end automation request.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
