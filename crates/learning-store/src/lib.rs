//! Learning Store: aggregated historical outcomes per (element type, action)
//! used to re-rank resolution strategies.
//!
//! Patterns are written only by the periodic optimization sweep; the
//! resolver reads snapshots. A failed sweep leaves prior patterns intact.

pub mod api;
pub mod memory;
pub mod model;
pub mod optimize;
pub mod sqlite;

pub use api::{LearningError, LearningStore};
pub use memory::MemoryLearningStore;
pub use model::{RankedSelector, StrategyPattern};
pub use optimize::{Optimizer, OptimizerConfig};
pub use sqlite::SqliteLearningStore;
