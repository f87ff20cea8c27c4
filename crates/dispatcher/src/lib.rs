//! Dispatcher: the bounded worker pool.
//!
//! Workers pull job ids from the queue, claim them with an atomic
//! compare-and-update transition to `Running`, execute them under the job's
//! timeout, and persist the terminal state. The semaphore owned here is the
//! only in-process shared state; the count of running jobs never exceeds
//! its permit count. The worker loop is the isolation boundary: nothing a
//! job does crashes the process.

pub mod config;
pub mod errors;
pub mod events;
pub mod executor;
pub mod pool;

pub use config::DispatcherConfig;
pub use errors::DispatchError;
pub use events::JobEvent;
pub use executor::{ExecuteError, JobExecutor, NoopExecutor};
pub use pool::Dispatcher;
