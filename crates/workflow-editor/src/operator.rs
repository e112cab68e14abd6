//! Node payloads and the capabilities the editor dispatches on
//!
//! The editor never inspects payload types directly. Everything it needs to
//! know (argument range, build-dependency status, terminal markers,
//! annotations, disabled state) goes through [`NodeCapabilities`].

use serde::{Deserialize, Serialize};
use workflow_graph::GraphDescriptor;

/// Inclusive bounds on the number of arguments a node accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentRange {
    pub min: usize,
    pub max: usize,
}

impl ArgumentRange {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// No arguments accepted
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Exactly one argument
    pub fn unary() -> Self {
        Self::new(1, 1)
    }

    pub fn contains(&self, count: usize) -> bool {
        count >= self.min && count <= self.max
    }
}

/// Capability queries the editor and layout engine use on node payloads
pub trait NodeCapabilities {
    /// How many predecessors the node accepts
    fn argument_range(&self) -> ArgumentRange;

    /// Build dependencies feed a node without consuming an argument slot
    fn is_build_dependency(&self) -> bool;

    /// Marks an argument entry point of a nested workflow
    fn is_input_marker(&self) -> bool {
        false
    }

    /// Marks the result of a nested workflow
    fn is_output_marker(&self) -> bool {
        false
    }

    /// Free-standing notes laid out apart from trivial components
    fn is_annotation(&self) -> bool {
        false
    }

    /// Whether the node is switched off
    fn is_disabled(&self) -> bool {
        false
    }

    /// The payload with any disabled wrapper removed
    fn unwrap_disabled(&self) -> &Self;
}

/// An operator from the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDescriptor {
    pub name: String,
    pub arguments: ArgumentRange,
    #[serde(default)]
    pub build_dependency: bool,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl OperatorDescriptor {
    pub fn new(name: impl Into<String>, arguments: ArgumentRange) -> Self {
        Self {
            name: name.into(),
            arguments,
            build_dependency: false,
            properties: serde_json::Value::Null,
        }
    }

    /// Mark the operator as a build dependency
    pub fn as_build_dependency(mut self) -> Self {
        self.build_dependency = true;
        self
    }

    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }
}

/// A node holding a nested workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupOperator {
    pub id: String,
    pub name: String,
    pub workflow: GraphDescriptor<Operator>,
}

impl GroupOperator {
    pub fn new(name: impl Into<String>, workflow: GraphDescriptor<Operator>) -> Self {
        Self {
            id: format!("group-{}", uuid::Uuid::new_v4()),
            name: name.into(),
            workflow,
        }
    }

    /// Number of input markers in the nested workflow
    pub fn input_count(&self) -> usize {
        self.workflow
            .nodes
            .iter()
            .filter(|node| node.is_input_marker())
            .count()
    }
}

/// Workflow node payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operator {
    /// A catalog operator
    Element(OperatorDescriptor),
    /// Argument entry point of a nested workflow
    WorkflowInput { index: usize },
    /// Result of a nested workflow
    WorkflowOutput,
    /// A free-standing note
    Annotation { text: String },
    /// A nested workflow
    Group(GroupOperator),
    /// A switched-off node; keeps its wiring but is inactive
    Disabled { operator: Box<Operator> },
}

impl Operator {
    /// Catalog operator with the given name and argument range
    pub fn element(name: impl Into<String>, min: usize, max: usize) -> Self {
        Self::Element(OperatorDescriptor::new(name, ArgumentRange::new(min, max)))
    }

    pub fn annotation(text: impl Into<String>) -> Self {
        Self::Annotation { text: text.into() }
    }

    /// Wrap in the disabled variant; already disabled payloads are unchanged
    pub fn disable(self) -> Self {
        match self {
            Self::Disabled { .. } => self,
            other => Self::Disabled {
                operator: Box::new(other),
            },
        }
    }

    /// Display name used by views and logs
    pub fn name(&self) -> &str {
        match self {
            Self::Element(descriptor) => &descriptor.name,
            Self::WorkflowInput { .. } => "WorkflowInput",
            Self::WorkflowOutput => "WorkflowOutput",
            Self::Annotation { text } => text,
            Self::Group(group) => &group.name,
            Self::Disabled { operator } => operator.name(),
        }
    }

    /// The nested workflow of an enabled group
    pub fn as_group(&self) -> Option<&GroupOperator> {
        match self {
            Self::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Index of a workflow input marker
    pub fn input_index(&self) -> Option<usize> {
        match self.unwrap_disabled() {
            Self::WorkflowInput { index } => Some(*index),
            _ => None,
        }
    }

    pub(crate) fn set_input_index(&mut self, value: usize) {
        match self {
            Self::WorkflowInput { index } => *index = value,
            Self::Disabled { operator } => operator.set_input_index(value),
            _ => {}
        }
    }
}

impl NodeCapabilities for Operator {
    fn argument_range(&self) -> ArgumentRange {
        match self {
            Self::Element(descriptor) => descriptor.arguments,
            Self::WorkflowInput { .. } | Self::Annotation { .. } => ArgumentRange::none(),
            Self::WorkflowOutput => ArgumentRange::unary(),
            Self::Group(group) => ArgumentRange::new(0, group.input_count()),
            Self::Disabled { operator } => operator.argument_range(),
        }
    }

    fn is_build_dependency(&self) -> bool {
        match self {
            Self::Element(descriptor) => descriptor.build_dependency,
            Self::Annotation { .. } => true,
            Self::Disabled { operator } => operator.is_build_dependency(),
            _ => false,
        }
    }

    fn is_input_marker(&self) -> bool {
        matches!(self, Self::WorkflowInput { .. })
    }

    fn is_output_marker(&self) -> bool {
        matches!(self, Self::WorkflowOutput)
    }

    fn is_annotation(&self) -> bool {
        matches!(self.unwrap_disabled(), Self::Annotation { .. })
    }

    fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled { .. })
    }

    fn unwrap_disabled(&self) -> &Self {
        match self {
            Self::Disabled { operator } => operator.unwrap_disabled(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_delegates_capabilities() {
        let op = Operator::Element(
            OperatorDescriptor::new("Timer", ArgumentRange::new(0, 1)).as_build_dependency(),
        )
        .disable();
        assert!(op.is_disabled());
        assert!(op.is_build_dependency());
        assert_eq!(op.argument_range(), ArgumentRange::new(0, 1));
        assert_eq!(op.name(), "Timer");
        assert!(matches!(op.unwrap_disabled(), Operator::Element(_)));
        assert_eq!(op.clone().disable(), op);
    }

    #[test]
    fn test_group_argument_range_counts_inputs() {
        let workflow = GraphDescriptor {
            nodes: vec![
                Operator::WorkflowInput { index: 0 },
                Operator::WorkflowInput { index: 1 },
                Operator::element("Zip", 2, 2),
                Operator::WorkflowOutput,
            ],
            edges: Vec::new(),
        };
        let group = Operator::Group(GroupOperator::new("Pair", workflow));
        assert_eq!(group.argument_range(), ArgumentRange::new(0, 2));
        assert!(group.as_group().unwrap().id.starts_with("group-"));
    }

    #[test]
    fn test_serde_tagged() {
        let op = Operator::element("Select", 1, 1);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["kind"], "element");
        assert_eq!(json["arguments"]["max"], 1);
        let parsed: Operator = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, op);

        let marker: Operator =
            serde_json::from_value(serde_json::json!({"kind": "workflow_input", "index": 3}))
                .unwrap();
        assert_eq!(marker.input_index(), Some(3));
    }
}
