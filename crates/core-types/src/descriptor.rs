//! Logical element descriptions and resolution strategy identifiers.

use serde::{Deserialize, Serialize};

/// A resolution strategy, in the order the resolver tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// The selector declared by upstream form analysis.
    Declared,
    /// Selectors ranked by historical success for this element type/action.
    Learned,
    /// Role, aria attributes, name and test-id conventions.
    Accessibility,
    /// Label, placeholder or humanized field-name text.
    Text,
    /// Probe the last-known screen coordinates.
    Position,
    /// Vision-model lookup over a screenshot.
    Visual,
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Declared => "declared",
            StrategyKind::Learned => "learned",
            StrategyKind::Accessibility => "accessibility",
            StrategyKind::Text => "text",
            StrategyKind::Position => "position",
            StrategyKind::Visual => "visual",
        }
    }

    pub fn parse(value: &str) -> Option<StrategyKind> {
        match value {
            "declared" => Some(StrategyKind::Declared),
            "learned" => Some(StrategyKind::Learned),
            "accessibility" => Some(StrategyKind::Accessibility),
            "text" => Some(StrategyKind::Text),
            "position" => Some(StrategyKind::Position),
            "visual" => Some(StrategyKind::Visual),
            _ => None,
        }
    }

    /// Full fallback chain in fixed order.
    pub fn chain() -> [StrategyKind; 6] {
        [
            StrategyKind::Declared,
            StrategyKind::Learned,
            StrategyKind::Accessibility,
            StrategyKind::Text,
            StrategyKind::Position,
            StrategyKind::Visual,
        ]
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A screen coordinate from a previous observation of the element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Driver-agnostic identity of a form field to be resolved.
///
/// Constructed per resolution attempt from form-analysis output; never
/// persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub name: String,
    /// Declared type: text, select, checkbox, file, ...
    pub element_type: String,
    /// Selector supplied by upstream analysis.
    pub selector: String,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub position: Option<Point>,
    pub role: Option<String>,
    pub required: bool,
}

impl ElementDescriptor {
    pub fn new(
        name: impl Into<String>,
        element_type: impl Into<String>,
        selector: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            element_type: element_type.into(),
            selector: selector.into(),
            label: None,
            placeholder: None,
            position: None,
            role: None,
            required: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Point { x, y });
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Output of upstream form analysis for one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormAnalysis {
    /// Fields in the order they should be processed.
    pub fields: Vec<ElementDescriptor>,
    pub file_uploads: Vec<ElementDescriptor>,
    pub submit: Option<ElementDescriptor>,
}

/// Answer from the vision model when asked to locate an element.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisualMatch {
    pub found: bool,
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

/// Model-backed check of the filled form before submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionCheck {
    pub completed: bool,
    pub ready_for_submission: bool,
    pub confidence: f64,
    pub validation_errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_order_is_fixed() {
        let chain = StrategyKind::chain();
        assert_eq!(chain[0], StrategyKind::Declared);
        assert_eq!(chain[1], StrategyKind::Learned);
        assert_eq!(chain[2], StrategyKind::Accessibility);
        assert_eq!(chain[3], StrategyKind::Text);
        assert_eq!(chain[4], StrategyKind::Position);
        assert_eq!(chain[5], StrategyKind::Visual);
    }

    #[test]
    fn strategy_names_round_trip() {
        for kind in StrategyKind::chain() {
            assert_eq!(StrategyKind::parse(kind.name()), Some(kind));
        }
        assert_eq!(StrategyKind::parse("unknown"), None);
    }

    #[test]
    fn descriptor_builder() {
        let descriptor = ElementDescriptor::new("email", "text", "#email")
            .with_label("E-mail address")
            .with_position(120.0, 340.0)
            .required();
        assert_eq!(descriptor.label.as_deref(), Some("E-mail address"));
        assert!(descriptor.required);
        assert!(descriptor.position.is_some());
    }
}
