//! formpilot: adaptive web-form automation engine.
//!
//! The core pairs a bounded-concurrency job dispatcher with a
//! strategy-chain element resolver that learns from historical outcomes.
//! Front ends talk to [`AutomationService`]; the browser driver and the
//! form-analysis model are external collaborators behind the traits in
//! `formpilot-driver`.

pub mod config;
pub mod errors;
pub mod runner;
pub mod service;

pub use config::{AppConfig, StorageBackend};
pub use errors::ServiceError;
pub use runner::{FormRunner, RunnerConfig};
pub use service::{AutomationService, JobStatus};

pub use formpilot_core_types::{
    ActionKind, ElementDescriptor, FieldOutcome, Interaction, Job, JobConfig, JobId, JobMetrics,
    JobResult, JobSpec, JobState, StrategyKind, StrategyMode,
};
pub use formpilot_dispatcher::JobEvent;
pub use formpilot_driver::{BrowserDriver, ModelService, NoopDriver, NoopModelService};
