//! Contracts for the external browser-automation driver and the
//! form-analysis / vision-model service.
//!
//! The engine consumes these capabilities and never implements them; real
//! integrations live outside this workspace. Noop implementations are
//! provided so the engine can be wired and exercised without a browser.

pub mod api;
pub mod error;
pub mod noop;

pub use api::{BrowserDriver, ElementHandle, ModelService, PageSnapshot, Screenshot, WaitPolicy};
pub use error::{DriverError, ModelServiceError};
pub use noop::{NoopDriver, NoopModelService};
