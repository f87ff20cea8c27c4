//! The six resolution strategies, in chain order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use formpilot_core_types::{ActionKind, ElementDescriptor, StrategyKind};
use formpilot_driver::{BrowserDriver, ElementHandle, ModelService};
use formpilot_learning_store::LearningStore;

use crate::errors::LocatorError;

/// A strategy match: the handle plus the selector that produced it.
#[derive(Debug, Clone)]
pub struct Located {
    pub handle: ElementHandle,
    pub selector: String,
}

/// One way of turning a logical descriptor into a concrete element.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn attempt(
        &self,
        driver: &dyn BrowserDriver,
        descriptor: &ElementDescriptor,
        action: ActionKind,
    ) -> Result<Located, LocatorError>;
}

/// 1. The selector supplied by upstream form analysis.
pub struct DeclaredStrategy {
    wait: Duration,
}

impl DeclaredStrategy {
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }
}

#[async_trait]
impl Strategy for DeclaredStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Declared
    }

    async fn attempt(
        &self,
        driver: &dyn BrowserDriver,
        descriptor: &ElementDescriptor,
        _action: ActionKind,
    ) -> Result<Located, LocatorError> {
        if descriptor.selector.is_empty() {
            return Err(LocatorError::InvalidDescriptor(format!(
                "empty declared selector for field '{}'",
                descriptor.name
            )));
        }
        let handle = driver
            .resolve(&descriptor.selector, self.wait)
            .await
            .map_err(|e| LocatorError::strategy_failed(StrategyKind::Declared, e))?;
        Ok(Located {
            selector: descriptor.selector.clone(),
            handle,
        })
    }
}

/// 2. Selectors that historically worked for this (element type, action).
pub struct LearnedStrategy {
    patterns: Arc<dyn LearningStore>,
    wait: Duration,
}

impl LearnedStrategy {
    pub fn new(patterns: Arc<dyn LearningStore>, wait: Duration) -> Self {
        Self { patterns, wait }
    }
}

#[async_trait]
impl Strategy for LearnedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Learned
    }

    async fn attempt(
        &self,
        driver: &dyn BrowserDriver,
        descriptor: &ElementDescriptor,
        action: ActionKind,
    ) -> Result<Located, LocatorError> {
        let pattern = self
            .patterns
            .patterns_for(&descriptor.element_type, action)
            .await
            .map_err(|e| LocatorError::strategy_failed(StrategyKind::Learned, e))?;
        let Some(pattern) = pattern else {
            return Err(LocatorError::strategy_failed(
                StrategyKind::Learned,
                "no learned selectors for this element type and action",
            ));
        };

        // Already ranked by success rate, then sample count.
        for ranked in &pattern.selectors {
            debug!(
                selector = %ranked.selector,
                rate = ranked.success_rate,
                "trying learned selector"
            );
            if let Ok(handle) = driver.resolve(&ranked.selector, self.wait).await {
                return Ok(Located {
                    selector: ranked.selector.clone(),
                    handle,
                });
            }
        }
        Err(LocatorError::strategy_failed(
            StrategyKind::Learned,
            format!("{} learned selectors, none matched", pattern.selectors.len()),
        ))
    }
}

/// 3. Accessibility conventions: role, aria attributes, name, test ids.
pub struct AccessibilityStrategy {
    wait: Duration,
}

impl AccessibilityStrategy {
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }

    fn candidates(descriptor: &ElementDescriptor) -> Vec<String> {
        let name = &descriptor.name;
        let mut candidates = Vec::new();
        if let Some(role) = &descriptor.role {
            candidates.push(format!(r#"[role="{role}"]"#));
        }
        candidates.push(format!(r#"[role="{}"]"#, descriptor.element_type));
        candidates.push(format!(r#"[aria-label*="{name}"]"#));
        candidates.push(format!(r#"[aria-labelledby*="{name}"]"#));
        candidates.push(format!(r#"input[name="{name}"]"#));
        candidates.push(format!(r#"*[data-testid*="{name}"]"#));
        candidates
    }
}

#[async_trait]
impl Strategy for AccessibilityStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Accessibility
    }

    async fn attempt(
        &self,
        driver: &dyn BrowserDriver,
        descriptor: &ElementDescriptor,
        _action: ActionKind,
    ) -> Result<Located, LocatorError> {
        for candidate in Self::candidates(descriptor) {
            if let Ok(handle) = driver.resolve(&candidate, self.wait).await {
                return Ok(Located {
                    selector: candidate,
                    handle,
                });
            }
        }
        Err(LocatorError::strategy_failed(
            StrategyKind::Accessibility,
            "no accessibility candidate matched",
        ))
    }
}

/// 4. Label text, placeholder text, or a humanized form of the field name.
pub struct TextStrategy {
    wait: Duration,
}

impl TextStrategy {
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }

    fn candidate_texts(descriptor: &ElementDescriptor) -> Vec<String> {
        let mut texts = vec![descriptor.name.clone()];
        if let Some(label) = &descriptor.label {
            texts.push(label.clone());
        }
        if let Some(placeholder) = &descriptor.placeholder {
            texts.push(placeholder.clone());
        }
        texts.push(humanize(&descriptor.name));

        texts.retain(|t| !t.trim().is_empty());
        texts.dedup();
        texts
    }

    fn candidates(descriptor: &ElementDescriptor) -> Vec<String> {
        let mut candidates = Vec::new();
        for text in Self::candidate_texts(descriptor) {
            let text = text.replace('"', "\\\"");
            candidates.push(format!(r#"label:has-text("{text}") input"#));
            candidates.push(format!(r#"input[placeholder*="{text}"]"#));
            candidates.push(format!(r#"textarea[placeholder*="{text}"]"#));
        }
        candidates
    }
}

/// Split a camelCase identifier into words: `firstName` -> `first Name`.
fn humanize(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() && !out.is_empty() {
            out.push(' ');
        }
        out.push(ch);
    }
    out.trim().to_string()
}

#[async_trait]
impl Strategy for TextStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Text
    }

    async fn attempt(
        &self,
        driver: &dyn BrowserDriver,
        descriptor: &ElementDescriptor,
        _action: ActionKind,
    ) -> Result<Located, LocatorError> {
        for candidate in Self::candidates(descriptor) {
            if let Ok(handle) = driver.resolve(&candidate, self.wait).await {
                return Ok(Located {
                    selector: candidate,
                    handle,
                });
            }
        }
        Err(LocatorError::strategy_failed(
            StrategyKind::Text,
            "no text candidate matched",
        ))
    }
}

/// 5. Probe the last-known screen coordinates and take whatever focuses.
pub struct PositionStrategy;

#[async_trait]
impl Strategy for PositionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Position
    }

    async fn attempt(
        &self,
        driver: &dyn BrowserDriver,
        descriptor: &ElementDescriptor,
        _action: ActionKind,
    ) -> Result<Located, LocatorError> {
        let Some(position) = descriptor.position else {
            return Err(LocatorError::strategy_failed(
                StrategyKind::Position,
                "no known position for this field",
            ));
        };
        let handle = driver
            .probe(position.x, position.y)
            .await
            .map_err(|e| LocatorError::strategy_failed(StrategyKind::Position, e))?;
        Ok(Located {
            selector: handle.selector.clone(),
            handle,
        })
    }
}

/// 6. Ask the vision model, accept only above the confidence threshold.
pub struct VisualStrategy {
    model: Arc<dyn ModelService>,
    threshold: f64,
}

impl VisualStrategy {
    pub fn new(model: Arc<dyn ModelService>, threshold: f64) -> Self {
        Self { model, threshold }
    }
}

#[async_trait]
impl Strategy for VisualStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Visual
    }

    async fn attempt(
        &self,
        driver: &dyn BrowserDriver,
        descriptor: &ElementDescriptor,
        _action: ActionKind,
    ) -> Result<Located, LocatorError> {
        let screenshot = driver
            .screenshot()
            .await
            .map_err(|e| LocatorError::strategy_failed(StrategyKind::Visual, e))?;
        // Model-service failure means "strategy unavailable", never fatal.
        let found = self
            .model
            .locate_visually(&screenshot, descriptor)
            .await
            .map_err(|e| LocatorError::strategy_failed(StrategyKind::Visual, e))?;

        if !found.found {
            return Err(LocatorError::strategy_failed(
                StrategyKind::Visual,
                "no visual match",
            ));
        }
        if found.confidence <= self.threshold {
            return Err(LocatorError::strategy_failed(
                StrategyKind::Visual,
                format!(
                    "confidence {:.2} below threshold {:.2}",
                    found.confidence, self.threshold
                ),
            ));
        }

        let handle = driver
            .probe(found.x, found.y)
            .await
            .map_err(|e| LocatorError::strategy_failed(StrategyKind::Visual, e))?;
        Ok(Located {
            selector: handle.selector.clone(),
            handle,
        })
    }
}
