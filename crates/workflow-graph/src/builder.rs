//! Fluent builder for workflow graphs
//!
//! Provides a name-addressed API for constructing graphs programmatically.

use std::collections::HashMap;

use crate::error::{GraphError, Result};
use crate::graph::WorkflowGraph;
use crate::types::{EdgeLabel, NodeId};

/// Fluent builder for constructing workflow graphs
///
/// # Example
///
/// ```ignore
/// let (graph, ids) = GraphBuilder::new()
///     .add_node("source", source_payload)
///     .add_node("sink", sink_payload)
///     .add_edge("source", "sink", 0)
///     .build()?;
/// ```
pub struct GraphBuilder<T> {
    nodes: Vec<(String, T)>,
    edges: Vec<(String, String, usize)>,
    sort: bool,
}

impl<T> Default for GraphBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GraphBuilder<T> {
    /// Create a new graph builder
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            sort: true,
        }
    }

    /// Add a named node to the graph
    pub fn add_node(mut self, name: impl Into<String>, value: T) -> Self {
        self.nodes.push((name.into(), value));
        self
    }

    /// Add an edge filling argument slot `index` on the target
    pub fn add_edge(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        index: usize,
    ) -> Self {
        self.edges.push((source.into(), target.into(), index));
        self
    }

    /// Keep insertion order instead of sorting topologically on build
    pub fn unsorted(mut self) -> Self {
        self.sort = false;
        self
    }

    /// Build the graph, returning it with the ids of the named nodes
    pub fn build(self) -> Result<(WorkflowGraph<T>, HashMap<String, NodeId>)> {
        let mut graph = WorkflowGraph::new();
        let mut names = HashMap::new();
        for (name, value) in self.nodes {
            let id = graph.add_value(value);
            names.insert(name, id);
        }

        for (source, target, index) in self.edges {
            let from = *names.get(&source).ok_or(GraphError::UnknownName(source))?;
            let to = *names.get(&target).ok_or(GraphError::UnknownName(target))?;
            graph.connect(from, to, EdgeLabel::new(index))?;
        }

        if self.sort {
            graph.sort_topologically()?;
        }
        Ok((graph, names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_chain() {
        let (graph, ids) = GraphBuilder::new()
            .add_node("c", 'c')
            .add_node("b", 'b')
            .add_node("a", 'a')
            .add_edge("a", "b", 0)
            .add_edge("b", "c", 0)
            .build()
            .unwrap();
        assert_eq!(graph.nodes(), &[ids["a"], ids["b"], ids["c"]]);
        assert_eq!(*graph.value(ids["b"]).unwrap(), 'b');
    }

    #[test]
    fn test_unknown_node_name() {
        let result = GraphBuilder::new()
            .add_node("a", 1)
            .add_edge("a", "missing", 0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_unsorted_keeps_order() {
        let (graph, ids) = GraphBuilder::new()
            .add_node("b", 2)
            .add_node("a", 1)
            .add_edge("a", "b", 0)
            .unsorted()
            .build()
            .unwrap();
        assert_eq!(graph.nodes(), &[ids["b"], ids["a"]]);
    }
}
