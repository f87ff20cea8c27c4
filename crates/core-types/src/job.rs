//! Job model and lifecycle state machine.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::{CompletionCheck, StrategyKind};
use crate::JobId;

/// Lifecycle state of a job.
///
/// The machine is strictly monotonic: `Pending -> Running -> Completed | Failed`.
/// Terminal states are never left again; crash recovery goes through a
/// dedicated store operation, not through `can_transition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<JobState> {
        match value {
            "pending" => Some(JobState::Pending),
            "running" => Some(JobState::Running),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether moving from `self` to `to` is a legal lifecycle step.
    pub fn can_transition(self, to: JobState) -> bool {
        matches!(
            (self, to),
            (JobState::Pending, JobState::Running)
                | (JobState::Running, JobState::Completed)
                | (JobState::Running, JobState::Failed)
        )
    }

    /// The single state a job must be in before it may enter `to`.
    ///
    /// The linear machine makes this unambiguous, which is what lets the
    /// store implement transitions as one compare-and-update.
    pub fn required_predecessor(to: JobState) -> Option<JobState> {
        match to {
            JobState::Pending => None,
            JobState::Running => Some(JobState::Pending),
            JobState::Completed | JobState::Failed => Some(JobState::Running),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which strategy families the resolver may use for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    /// DOM-derived strategies only (declared, learned, accessibility, text).
    Dom,
    /// Declared selector plus the screen-space strategies (position, visual).
    Visual,
    /// The full six-strategy chain.
    Hybrid,
}

impl Default for StrategyMode {
    fn default() -> Self {
        StrategyMode::Hybrid
    }
}

/// Per-job tuning knobs supplied at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub strategy_mode: StrategyMode,
    /// Extra attempts per field action on driver failure.
    pub max_retries: u32,
    /// Overall wall-clock budget for the job.
    pub timeout: Duration,
    /// When off, only the declared selector is ever tried.
    pub self_healing: bool,
    /// Run a model-backed completion check after filling.
    pub visual_verification: bool,
    /// Minimum confidence for accepting a visual-model match.
    pub confidence_threshold: f64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            strategy_mode: StrategyMode::default(),
            max_retries: 2,
            timeout: Duration::from_secs(120),
            self_healing: true,
            visual_verification: false,
            confidence_threshold: 0.7,
        }
    }
}

impl JobConfig {
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_strategy_mode(mut self, mode: StrategyMode) -> Self {
        self.strategy_mode = mode;
        self
    }

    pub fn with_self_healing(mut self, enabled: bool) -> Self {
        self.self_healing = enabled;
        self
    }

    pub fn with_visual_verification(mut self, enabled: bool) -> Self {
        self.visual_verification = enabled;
        self
    }
}

/// A file to hand to an upload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Field name the file belongs to.
    pub field: String,
    /// Path as understood by the external driver.
    pub path: String,
}

/// Submission payload: everything needed to create a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub url: String,
    /// Field name to value, ordered for deterministic iteration.
    pub fields: BTreeMap<String, String>,
    pub files: Vec<FileRef>,
    pub config: JobConfig,
}

impl JobSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fields: BTreeMap::new(),
            files: Vec::new(),
            config: JobConfig::default(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_file(mut self, field: impl Into<String>, path: impl Into<String>) -> Self {
        self.files.push(FileRef {
            field: field.into(),
            path: path.into(),
        });
        self
    }

    pub fn with_config(mut self, config: JobConfig) -> Self {
        self.config = config;
        self
    }
}

/// Outcome of one logical field within a job result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldOutcome {
    pub field: String,
    pub required: bool,
    pub success: bool,
    /// A required field that could not be resolved; surfaced to the caller
    /// without failing the whole job.
    pub blocking: bool,
    pub strategy: Option<StrategyKind>,
    pub attempts: u32,
    pub error: Option<String>,
}

impl FieldOutcome {
    pub fn succeeded(
        field: impl Into<String>,
        required: bool,
        strategy: StrategyKind,
        attempts: u32,
    ) -> Self {
        Self {
            field: field.into(),
            required,
            success: true,
            blocking: false,
            strategy: Some(strategy),
            attempts,
            error: None,
        }
    }

    pub fn failed(
        field: impl Into<String>,
        required: bool,
        strategy: Option<StrategyKind>,
        attempts: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            required,
            success: false,
            blocking: required,
            strategy,
            attempts,
            error: Some(error.into()),
        }
    }
}

/// Aggregated result persisted when a job reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    pub field_outcomes: Vec<FieldOutcome>,
    pub submit: Option<FieldOutcome>,
    pub verification: Option<CompletionCheck>,
    pub error: Option<String>,
}

impl JobResult {
    /// Result shape for a job that failed before any field was touched.
    pub fn fatal(error: impl Into<String>) -> Self {
        Self {
            success: false,
            field_outcomes: Vec::new(),
            submit: None,
            verification: None,
            error: Some(error.into()),
        }
    }
}

/// One persisted automation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub fields: BTreeMap<String, String>,
    pub files: Vec<FileRef>,
    pub config: JobConfig,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Times this job has been re-enqueued by crash recovery.
    pub requeue_count: u32,
    pub result: Option<JobResult>,
    pub error_message: Option<String>,
}

impl Job {
    pub fn from_spec(spec: JobSpec) -> Self {
        Self {
            id: JobId::new(),
            url: spec.url,
            fields: spec.fields,
            files: spec.files,
            config: spec.config,
            state: JobState::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            requeue_count: 0,
            result: None,
            error_message: None,
        }
    }
}

/// Windowed aggregate over finished jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMetrics {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub avg_duration_ms: Option<f64>,
}

impl JobMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_is_monotonic() {
        assert!(JobState::Pending.can_transition(JobState::Running));
        assert!(JobState::Running.can_transition(JobState::Completed));
        assert!(JobState::Running.can_transition(JobState::Failed));

        assert!(!JobState::Pending.can_transition(JobState::Completed));
        assert!(!JobState::Completed.can_transition(JobState::Running));
        assert!(!JobState::Failed.can_transition(JobState::Pending));
        assert!(!JobState::Running.can_transition(JobState::Pending));
    }

    #[test]
    fn predecessor_matches_transition_table() {
        for to in [
            JobState::Pending,
            JobState::Running,
            JobState::Completed,
            JobState::Failed,
        ] {
            if let Some(from) = JobState::required_predecessor(to) {
                assert!(from.can_transition(to));
            }
        }
        assert_eq!(JobState::required_predecessor(JobState::Pending), None);
    }

    #[test]
    fn spec_builder_collects_fields_in_order() {
        let spec = JobSpec::new("https://example.test/form")
            .with_field("firstName", "Jan")
            .with_field("email", "jan@example.com")
            .with_file("resume", "/tmp/resume.pdf");

        let names: Vec<&String> = spec.fields.keys().collect();
        assert_eq!(names, ["email", "firstName"]);
        assert_eq!(spec.files.len(), 1);
        assert_eq!(spec.config.max_retries, 2);
    }

    #[test]
    fn job_from_spec_starts_pending() {
        let job = Job::from_spec(JobSpec::new("https://example.test"));
        assert_eq!(job.state, JobState::Pending);
        assert!(job.started_at.is_none());
        assert_eq!(job.requeue_count, 0);
    }

    #[test]
    fn failed_outcome_on_required_field_is_blocking() {
        let outcome = FieldOutcome::failed("email", true, None, 1, "no match");
        assert!(outcome.blocking);
        let optional = FieldOutcome::failed("nickname", false, None, 1, "no match");
        assert!(!optional.blocking);
    }
}
