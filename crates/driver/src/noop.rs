//! Inert driver and model-service implementations.
//!
//! Used by the CLI when no real integration is configured and by tests
//! that only exercise orchestration paths.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use formpilot_core_types::{
    ActionKind, CompletionCheck, ElementDescriptor, FormAnalysis, VisualMatch,
};

use crate::api::{BrowserDriver, ElementHandle, ModelService, PageSnapshot, Screenshot, WaitPolicy};
use crate::error::{DriverError, ModelServiceError};

/// Driver that accepts navigation but never finds anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDriver;

#[async_trait]
impl BrowserDriver for NoopDriver {
    async fn navigate(
        &self,
        url: &str,
        _wait: WaitPolicy,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        debug!(url, "noop driver: navigate");
        Ok(())
    }

    async fn resolve(&self, selector: &str, _wait: Duration) -> Result<ElementHandle, DriverError> {
        Err(DriverError::NotFound(selector.to_string()))
    }

    async fn act(
        &self,
        element: &ElementHandle,
        _action: ActionKind,
        _value: Option<&str>,
    ) -> Result<(), DriverError> {
        Err(DriverError::ActionFailed {
            selector: element.selector.clone(),
            reason: "noop driver".to_string(),
        })
    }

    async fn probe(&self, x: f64, y: f64) -> Result<ElementHandle, DriverError> {
        Err(DriverError::NotFound(format!("point ({x}, {y})")))
    }

    async fn screenshot(&self) -> Result<Screenshot, DriverError> {
        Ok(Screenshot::default())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok("about:blank".to_string())
    }
}

/// Model service that reports nothing to fill and no visual matches.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopModelService;

#[async_trait]
impl ModelService for NoopModelService {
    async fn analyze_structure(
        &self,
        _snapshot: &PageSnapshot,
    ) -> Result<FormAnalysis, ModelServiceError> {
        Ok(FormAnalysis::default())
    }

    async fn locate_visually(
        &self,
        _screenshot: &Screenshot,
        _descriptor: &ElementDescriptor,
    ) -> Result<VisualMatch, ModelServiceError> {
        Ok(VisualMatch {
            found: false,
            x: 0.0,
            y: 0.0,
            confidence: 0.0,
        })
    }

    async fn verify_completion(
        &self,
        _screenshot: &Screenshot,
    ) -> Result<CompletionCheck, ModelServiceError> {
        Err(ModelServiceError::Unavailable(
            "no model service configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_driver_never_resolves() {
        let driver = NoopDriver;
        driver
            .navigate(
                "https://example.test",
                WaitPolicy::NetworkIdle,
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        let err = driver
            .resolve("#firstName", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::NotFound(_)));
    }

    #[tokio::test]
    async fn noop_model_reports_empty_analysis() {
        let model = NoopModelService;
        let snapshot = PageSnapshot {
            url: "https://example.test".into(),
            screenshot: Screenshot::default(),
        };
        let analysis = model.analyze_structure(&snapshot).await.unwrap();
        assert!(analysis.fields.is_empty());
        assert!(analysis.submit.is_none());
    }
}
