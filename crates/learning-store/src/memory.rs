use async_trait::async_trait;
use dashmap::DashMap;

use formpilot_core_types::ActionKind;

use crate::api::{LearningError, LearningStore};
use crate::model::StrategyPattern;

/// In-memory pattern store for tests and single-process runs.
#[derive(Default)]
pub struct MemoryLearningStore {
    patterns: DashMap<(String, ActionKind), StrategyPattern>,
}

impl MemoryLearningStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LearningStore for MemoryLearningStore {
    async fn patterns_for(
        &self,
        element_type: &str,
        action: ActionKind,
    ) -> Result<Option<StrategyPattern>, LearningError> {
        Ok(self
            .patterns
            .get(&(element_type.to_string(), action))
            .map(|entry| entry.value().clone()))
    }

    async fn replace(&self, pattern: StrategyPattern) -> Result<(), LearningError> {
        self.patterns
            .insert((pattern.element_type.clone(), pattern.action), pattern);
        Ok(())
    }

    async fn all_patterns(&self) -> Result<Vec<StrategyPattern>, LearningError> {
        Ok(self
            .patterns
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RankedSelector;

    #[tokio::test]
    async fn replace_overwrites_per_key() {
        let store = MemoryLearningStore::new();
        store
            .replace(StrategyPattern::new(
                "text",
                ActionKind::Fill,
                vec![RankedSelector {
                    selector: "#old".into(),
                    success_rate: 0.4,
                    samples: 5,
                }],
            ))
            .await
            .unwrap();
        store
            .replace(StrategyPattern::new(
                "text",
                ActionKind::Fill,
                vec![RankedSelector {
                    selector: "#new".into(),
                    success_rate: 0.9,
                    samples: 10,
                }],
            ))
            .await
            .unwrap();

        let pattern = store
            .patterns_for("text", ActionKind::Fill)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pattern.top().unwrap().selector, "#new");

        assert!(store
            .patterns_for("text", ActionKind::Click)
            .await
            .unwrap()
            .is_none());
    }
}
