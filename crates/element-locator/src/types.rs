use std::time::Duration;

use serde::{Deserialize, Serialize};

use formpilot_core_types::StrategyKind;
use formpilot_driver::ElementHandle;

/// How one strategy in the chain fared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Matched { selector: String },
    Failed { reason: String },
}

/// One entry in the resolution trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: StrategyKind,
    pub outcome: AttemptOutcome,
}

/// Successful resolution: the element plus the full attempt trace.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub handle: ElementHandle,
    /// Strategy that produced the handle.
    pub strategy: StrategyKind,
    /// Selector (or probe description) that matched.
    pub selector: String,
    /// Everything tried up to and including the winning strategy.
    pub attempts: Vec<StrategyAttempt>,
}

/// Tuning for the strategy chain.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Visibility wait for the declared selector.
    pub visibility_wait: Duration,
    /// Shorter wait for generated candidate selectors.
    pub candidate_wait: Duration,
    /// Minimum confidence for accepting a visual-model match.
    pub confidence_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            visibility_wait: Duration::from_millis(2000),
            candidate_wait: Duration::from_millis(1000),
            confidence_threshold: 0.7,
        }
    }
}
