use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use formpilot_core_types::ActionKind;

/// One historically successful selector with its aggregate score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSelector {
    pub selector: String,
    /// Successes over total attempts within the aggregation window.
    pub success_rate: f64,
    pub samples: u64,
}

/// Ranked selectors for one (element type, action) pair.
///
/// Entries are replaced wholesale per key by the sweep, never edited in
/// place, so readers always see a consistent ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPattern {
    pub element_type: String,
    pub action: ActionKind,
    /// Descending by (success rate, samples).
    pub selectors: Vec<RankedSelector>,
    pub updated_at: DateTime<Utc>,
}

impl StrategyPattern {
    pub fn new(
        element_type: impl Into<String>,
        action: ActionKind,
        selectors: Vec<RankedSelector>,
    ) -> Self {
        Self {
            element_type: element_type.into(),
            action,
            selectors,
            updated_at: Utc::now(),
        }
    }

    pub fn top(&self) -> Option<&RankedSelector> {
        self.selectors.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_is_first_entry() {
        let pattern = StrategyPattern::new(
            "text",
            ActionKind::Fill,
            vec![
                RankedSelector {
                    selector: "#firstName".into(),
                    success_rate: 1.0,
                    samples: 4,
                },
                RankedSelector {
                    selector: "input[name=firstName]".into(),
                    success_rate: 0.5,
                    samples: 2,
                },
            ],
        );
        assert_eq!(pattern.top().unwrap().selector, "#firstName");
    }
}
