//! Periodic sweep turning recent Interactions into ranked StrategyPatterns.
//!
//! This is the only writer of patterns. It is non-destructive on partial
//! failure: a failed scan changes nothing, and a failed per-key write
//! leaves that key's previous ranking in place.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use formpilot_core_types::ActionKind;
use formpilot_job_store::JobStore;

use crate::api::{LearningError, LearningStore};
use crate::model::{RankedSelector, StrategyPattern};

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Trailing window of interactions to aggregate.
    pub window: Duration,
    /// How often the sweep runs.
    pub interval: Duration,
    /// Selectors kept per (element type, action) key.
    pub top_n: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(24 * 60 * 60),
            interval: Duration::from_secs(30 * 60),
            top_n: 10,
        }
    }
}

pub struct Optimizer {
    jobs: Arc<dyn JobStore>,
    patterns: Arc<dyn LearningStore>,
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        patterns: Arc<dyn LearningStore>,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            jobs,
            patterns,
            config,
        }
    }

    /// Run one sweep; returns the number of keys replaced.
    pub async fn run_once(&self) -> Result<usize, LearningError> {
        let recent = self
            .jobs
            .recent_interactions(self.config.window)
            .await
            .map_err(LearningError::persistence)?;

        let mut grouped: HashMap<(String, ActionKind), HashMap<String, (u64, u64)>> =
            HashMap::new();
        for record in recent {
            if record.selector.is_empty() {
                continue;
            }
            let counts = grouped
                .entry((record.element_type.clone(), record.action))
                .or_default()
                .entry(record.selector.clone())
                .or_insert((0, 0));
            counts.1 += 1;
            if record.success {
                counts.0 += 1;
            }
        }

        let mut replaced = 0;
        for ((element_type, action), selectors) in grouped {
            let mut ranked: Vec<RankedSelector> = selectors
                .into_iter()
                .filter(|(_, (successes, _))| *successes > 0)
                .map(|(selector, (successes, total))| RankedSelector {
                    selector,
                    success_rate: successes as f64 / total as f64,
                    samples: total,
                })
                .collect();
            if ranked.is_empty() {
                continue;
            }
            ranked.sort_by(|a, b| {
                b.success_rate
                    .partial_cmp(&a.success_rate)
                    .unwrap_or(Ordering::Equal)
                    .then(b.samples.cmp(&a.samples))
            });
            ranked.truncate(self.config.top_n);

            debug!(
                element_type,
                action = %action,
                selectors = ranked.len(),
                "replacing strategy pattern"
            );
            let pattern = StrategyPattern::new(element_type.clone(), action, ranked);
            if let Err(err) = self.patterns.replace(pattern).await {
                warn!(
                    element_type,
                    action = %action,
                    error = %err,
                    "pattern replace failed; prior ranking retained"
                );
                continue;
            }
            replaced += 1;
        }

        info!(replaced, "strategy pattern sweep finished");
        Ok(replaced)
    }

    /// Run the sweep every `interval` until the handle is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; skip so the first sweep waits a
            // full period after startup
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = self.run_once().await {
                    warn!(error = %err, "sweep failed; prior patterns retained");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use formpilot_core_types::{Interaction, JobSpec, StrategyKind};
    use formpilot_job_store::MemoryJobStore;

    use crate::memory::MemoryLearningStore;

    async fn seeded_store() -> (Arc<MemoryJobStore>, formpilot_core_types::JobId) {
        let store = Arc::new(MemoryJobStore::new());
        let id = store
            .create(JobSpec::new("https://example.test/form"))
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn single_success_seeds_a_pattern() {
        let (jobs, id) = seeded_store().await;
        jobs.append_interaction(Interaction::success(
            id,
            ActionKind::Fill,
            "#firstName",
            "text",
            StrategyKind::Declared,
            15,
        ))
        .await
        .unwrap();

        let patterns = Arc::new(MemoryLearningStore::new());
        let optimizer = Optimizer::new(jobs, patterns.clone(), OptimizerConfig::default());
        let replaced = optimizer.run_once().await.unwrap();
        assert_eq!(replaced, 1);

        let pattern = patterns
            .patterns_for("text", ActionKind::Fill)
            .await
            .unwrap()
            .expect("pattern for (text, fill)");
        assert_eq!(pattern.top().unwrap().selector, "#firstName");
        assert_eq!(pattern.top().unwrap().samples, 1);
        assert!((pattern.top().unwrap().success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn ranking_prefers_rate_then_samples() {
        let (jobs, id) = seeded_store().await;
        // "#a": 2/2, "#b": 2/4, "#c": 1/1; expect a (rate 1.0, 2 samples),
        // then c (rate 1.0, 1 sample), then b.
        for (selector, success) in [
            ("#a", true),
            ("#a", true),
            ("#b", true),
            ("#b", false),
            ("#b", true),
            ("#b", false),
            ("#c", true),
        ] {
            let record = if success {
                Interaction::success(
                    id.clone(),
                    ActionKind::Fill,
                    selector,
                    "text",
                    StrategyKind::Declared,
                    10,
                )
            } else {
                Interaction::failure(
                    id.clone(),
                    ActionKind::Fill,
                    selector,
                    "text",
                    Some(StrategyKind::Declared),
                    10,
                    "failed",
                )
            };
            jobs.append_interaction(record).await.unwrap();
        }

        let patterns = Arc::new(MemoryLearningStore::new());
        let optimizer = Optimizer::new(jobs, patterns.clone(), OptimizerConfig::default());
        optimizer.run_once().await.unwrap();

        let pattern = patterns
            .patterns_for("text", ActionKind::Fill)
            .await
            .unwrap()
            .unwrap();
        let order: Vec<&str> = pattern
            .selectors
            .iter()
            .map(|s| s.selector.as_str())
            .collect();
        assert_eq!(order, ["#a", "#c", "#b"]);
    }

    #[tokio::test]
    async fn all_failures_produce_no_pattern() {
        let (jobs, id) = seeded_store().await;
        jobs.append_interaction(Interaction::failure(
            id,
            ActionKind::Fill,
            "#broken",
            "text",
            None,
            10,
            "never worked",
        ))
        .await
        .unwrap();

        let patterns = Arc::new(MemoryLearningStore::new());
        let optimizer = Optimizer::new(jobs, patterns.clone(), OptimizerConfig::default());
        assert_eq!(optimizer.run_once().await.unwrap(), 0);
        assert!(patterns.all_patterns().await.unwrap().is_empty());
    }

    struct FailingLearningStore;

    #[async_trait]
    impl LearningStore for FailingLearningStore {
        async fn patterns_for(
            &self,
            _element_type: &str,
            _action: ActionKind,
        ) -> Result<Option<StrategyPattern>, LearningError> {
            Ok(None)
        }

        async fn replace(&self, _pattern: StrategyPattern) -> Result<(), LearningError> {
            Err(LearningError::Persistence("disk full".into()))
        }

        async fn all_patterns(&self) -> Result<Vec<StrategyPattern>, LearningError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn sweep_survives_per_key_write_failure() {
        let (jobs, id) = seeded_store().await;
        jobs.append_interaction(Interaction::success(
            id,
            ActionKind::Fill,
            "#firstName",
            "text",
            StrategyKind::Declared,
            15,
        ))
        .await
        .unwrap();

        let optimizer = Optimizer::new(
            jobs,
            Arc::new(FailingLearningStore),
            OptimizerConfig::default(),
        );
        // Does not error out; the key is just skipped.
        assert_eq!(optimizer.run_once().await.unwrap(), 0);
    }
}
