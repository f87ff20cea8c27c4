//! Append-only interaction records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::StrategyKind;
use crate::JobId;

/// The action performed against a resolved element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Fill,
    Upload,
    Click,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Fill => "fill",
            ActionKind::Upload => "upload",
            ActionKind::Click => "click",
        }
    }

    pub fn parse(value: &str) -> Option<ActionKind> {
        match value {
            "fill" => Some(ActionKind::Fill),
            "upload" => Some(ActionKind::Upload),
            "click" => Some(ActionKind::Click),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempted action against one element within one job.
///
/// Records are append-only and never mutated after creation; one attempt
/// yields one record, so a field retried twice produces three rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub job_id: JobId,
    pub action: ActionKind,
    pub selector: String,
    pub element_type: String,
    pub success: bool,
    pub error: Option<String>,
    /// Strategy that produced the element, or `None` when resolution failed.
    pub strategy: Option<StrategyKind>,
    pub elapsed_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl Interaction {
    pub fn success(
        job_id: JobId,
        action: ActionKind,
        selector: impl Into<String>,
        element_type: impl Into<String>,
        strategy: StrategyKind,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            job_id,
            action,
            selector: selector.into(),
            element_type: element_type.into(),
            success: true,
            error: None,
            strategy: Some(strategy),
            elapsed_ms,
            created_at: Utc::now(),
        }
    }

    pub fn failure(
        job_id: JobId,
        action: ActionKind,
        selector: impl Into<String>,
        element_type: impl Into<String>,
        strategy: Option<StrategyKind>,
        elapsed_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            action,
            selector: selector.into(),
            element_type: element_type.into(),
            success: false,
            error: Some(error.into()),
            strategy,
            elapsed_ms,
            created_at: Utc::now(),
        }
    }
}
