use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use formpilot_core_types::{
    ActionKind, CompletionCheck, ElementDescriptor, FormAnalysis, VisualMatch,
};

use crate::error::{DriverError, ModelServiceError};

/// What "page is ready" means for a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

/// Opaque reference to a concrete, actionable element on the live page.
///
/// The driver owns the underlying node; the engine only passes the handle
/// back into `act`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub id: String,
    /// Selector (or probe description) the handle was obtained through.
    pub selector: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            selector: selector.into(),
        }
    }
}

/// Raw screenshot bytes as produced by the driver.
#[derive(Debug, Clone, Default)]
pub struct Screenshot(pub Vec<u8>);

/// Page state handed to the model service for structure analysis.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: String,
    pub screenshot: Screenshot,
}

/// The external browser-automation driver.
///
/// All calls block until done or until the caller-supplied (or
/// driver-internal) timeout elapses; the driver releases its own resources
/// after the owning job finishes.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(
        &self,
        url: &str,
        wait: WaitPolicy,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Resolve a selector to an element, waiting up to `wait` for it to be
    /// visible.
    async fn resolve(&self, selector: &str, wait: Duration) -> Result<ElementHandle, DriverError>;

    async fn act(
        &self,
        element: &ElementHandle,
        action: ActionKind,
        value: Option<&str>,
    ) -> Result<(), DriverError>;

    /// Probe a screen coordinate and return whatever element receives focus.
    async fn probe(&self, x: f64, y: f64) -> Result<ElementHandle, DriverError>;

    async fn screenshot(&self) -> Result<Screenshot, DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;
}

/// The external form-analysis / vision-model service.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Derive the logical form structure (fields, uploads, submit control)
    /// from a page snapshot.
    async fn analyze_structure(
        &self,
        snapshot: &PageSnapshot,
    ) -> Result<FormAnalysis, ModelServiceError>;

    /// Locate a described element visually in a screenshot.
    async fn locate_visually(
        &self,
        screenshot: &Screenshot,
        descriptor: &ElementDescriptor,
    ) -> Result<VisualMatch, ModelServiceError>;

    /// Judge whether the filled form looks complete and submittable.
    async fn verify_completion(
        &self,
        screenshot: &Screenshot,
    ) -> Result<CompletionCheck, ModelServiceError>;
}
