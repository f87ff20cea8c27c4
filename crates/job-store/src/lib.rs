//! Job Store: the durable record of jobs and their interaction history.
//!
//! Jobs are owned exclusively by this store and mutated only through the
//! lifecycle contract; interactions are append-only. Two backends are
//! provided: an in-memory store for tests and single-process setups, and a
//! SQLite store whose state transitions are single-row compare-and-updates.

pub mod api;
pub mod errors;
pub mod memory;
pub mod sqlite;

pub use api::{JobStore, RecoveryOutcome, StateUpdate};
pub use errors::StoreError;
pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;
