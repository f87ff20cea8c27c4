use formpilot_core_types::StrategyKind;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Every strategy in the chain was exhausted.
    #[error("element '{field}' not resolved; strategies attempted: {attempted:?}")]
    ElementNotResolved {
        field: String,
        attempted: Vec<StrategyKind>,
    },

    /// One strategy could not produce an element; the chain continues.
    #[error("strategy '{strategy}' failed: {reason}")]
    StrategyFailed {
        strategy: StrategyKind,
        reason: String,
    },

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
}

impl LocatorError {
    pub fn strategy_failed(strategy: StrategyKind, reason: impl std::fmt::Display) -> Self {
        LocatorError::StrategyFailed {
            strategy,
            reason: reason.to_string(),
        }
    }
}
