//! Adaptive Element Resolver.
//!
//! Resolves a logical field descriptor to a concrete page element through an
//! ordered chain of fallback strategies, first success wins:
//!
//! 1. Declared: the upstream-analysis selector
//! 2. Learned: historically successful selectors, ranked
//! 3. Accessibility: role / aria / name / test-id conventions
//! 4. Text: label, placeholder, humanized field name
//! 5. Position: probe last-known coordinates
//! 6. Visual: vision-model lookup above a confidence threshold
//!
//! Every attempt, success or failure, is reported back to the caller so it
//! can be recorded as an Interaction.

pub mod errors;
pub mod resolver;
pub mod strategies;
pub mod types;

pub use errors::LocatorError;
pub use resolver::{AdaptiveResolver, ElementResolver};
pub use strategies::{
    AccessibilityStrategy, DeclaredStrategy, LearnedStrategy, Located, PositionStrategy, Strategy,
    TextStrategy, VisualStrategy,
};
pub use types::{AttemptOutcome, Resolution, ResolverConfig, StrategyAttempt};
