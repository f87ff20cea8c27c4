//! Chain orchestration: try each strategy in declared order, stop at the
//! first one that yields an element, and keep the full attempt trace.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use formpilot_core_types::{ActionKind, ElementDescriptor, StrategyMode};
use formpilot_driver::{BrowserDriver, ModelService};
use formpilot_learning_store::LearningStore;

use crate::errors::LocatorError;
use crate::strategies::{
    AccessibilityStrategy, DeclaredStrategy, LearnedStrategy, PositionStrategy, Strategy,
    TextStrategy, VisualStrategy,
};
use crate::types::{AttemptOutcome, Resolution, ResolverConfig, StrategyAttempt};

#[async_trait]
pub trait ElementResolver: Send + Sync {
    async fn resolve(
        &self,
        driver: &dyn BrowserDriver,
        descriptor: &ElementDescriptor,
        action: ActionKind,
    ) -> Result<Resolution, LocatorError>;
}

pub struct AdaptiveResolver {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl AdaptiveResolver {
    /// Build the chain for a job's strategy mode.
    ///
    /// With self-healing off, only the declared selector is ever tried.
    /// `Dom` keeps the DOM-derived fallbacks, `Visual` the screen-space
    /// ones, `Hybrid` the full chain.
    pub fn for_mode(
        mode: StrategyMode,
        self_healing: bool,
        patterns: Arc<dyn LearningStore>,
        model: Arc<dyn ModelService>,
        config: &ResolverConfig,
    ) -> Self {
        let mut strategies: Vec<Arc<dyn Strategy>> =
            vec![Arc::new(DeclaredStrategy::new(config.visibility_wait))];
        if self_healing {
            let dom = matches!(mode, StrategyMode::Dom | StrategyMode::Hybrid);
            let screen = matches!(mode, StrategyMode::Visual | StrategyMode::Hybrid);
            if dom {
                strategies.push(Arc::new(LearnedStrategy::new(
                    patterns,
                    config.candidate_wait,
                )));
                strategies.push(Arc::new(AccessibilityStrategy::new(config.candidate_wait)));
                strategies.push(Arc::new(TextStrategy::new(config.candidate_wait)));
            }
            if screen {
                strategies.push(Arc::new(PositionStrategy));
                strategies.push(Arc::new(VisualStrategy::new(
                    model,
                    config.confidence_threshold,
                )));
            }
        }
        Self { strategies }
    }

    /// Explicit chain, mainly for tests.
    pub fn with_strategies(strategies: Vec<Arc<dyn Strategy>>) -> Self {
        Self { strategies }
    }
}

#[async_trait]
impl ElementResolver for AdaptiveResolver {
    async fn resolve(
        &self,
        driver: &dyn BrowserDriver,
        descriptor: &ElementDescriptor,
        action: ActionKind,
    ) -> Result<Resolution, LocatorError> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let kind = strategy.kind();
            debug!(field = %descriptor.name, strategy = kind.name(), "trying strategy");

            match strategy.attempt(driver, descriptor, action).await {
                Ok(located) => {
                    info!(
                        field = %descriptor.name,
                        strategy = kind.name(),
                        selector = %located.selector,
                        "element resolved"
                    );
                    attempts.push(StrategyAttempt {
                        strategy: kind,
                        outcome: AttemptOutcome::Matched {
                            selector: located.selector.clone(),
                        },
                    });
                    return Ok(Resolution {
                        handle: located.handle,
                        strategy: kind,
                        selector: located.selector,
                        attempts,
                    });
                }
                Err(err) => {
                    debug!(
                        field = %descriptor.name,
                        strategy = kind.name(),
                        error = %err,
                        "strategy failed"
                    );
                    attempts.push(StrategyAttempt {
                        strategy: kind,
                        outcome: AttemptOutcome::Failed {
                            reason: err.to_string(),
                        },
                    });
                }
            }
        }

        Err(LocatorError::ElementNotResolved {
            field: descriptor.name.clone(),
            attempted: attempts.iter().map(|a| a.strategy).collect(),
        })
    }
}
