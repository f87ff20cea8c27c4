use async_trait::async_trait;
use thiserror::Error;

use formpilot_core_types::ActionKind;

use crate::model::StrategyPattern;

#[derive(Debug, Error, Clone)]
pub enum LearningError {
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl LearningError {
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        LearningError::Persistence(err.to_string())
    }
}

/// Storage for strategy patterns.
///
/// Reads are snapshot-based; `replace` is atomic per key and is only called
/// by the optimization sweep.
#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn patterns_for(
        &self,
        element_type: &str,
        action: ActionKind,
    ) -> Result<Option<StrategyPattern>, LearningError>;

    async fn replace(&self, pattern: StrategyPattern) -> Result<(), LearningError>;

    async fn all_patterns(&self) -> Result<Vec<StrategyPattern>, LearningError>;
}
