//! Structural snapshots of a graph or of a node subset
//!
//! A [`GraphDescriptor`] is a plain, identity-free copy of nodes and their
//! internal edges. It is used both as the serialized form of a workflow and
//! as the explicit deep clone applied by editing operations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result, StoreError, StoreResult};
use crate::graph::WorkflowGraph;
use crate::types::{EdgeLabel, NodeId};

/// An edge between two descriptor nodes, by position in `nodes`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDescriptor {
    pub from: usize,
    pub to: usize,
    pub label: EdgeLabel,
}

/// Identity-free copy of a graph fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Deserialize<'de>"
))]
pub struct GraphDescriptor<T> {
    pub nodes: Vec<T>,
    #[serde(default)]
    pub edges: Vec<EdgeDescriptor>,
}

impl<T> Default for GraphDescriptor<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl<T> GraphDescriptor<T> {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check that every edge refers to a node in the descriptor
    pub fn validate(&self) -> StoreResult<()> {
        for edge in &self.edges {
            if edge.from >= self.nodes.len() || edge.to >= self.nodes.len() {
                return Err(StoreError::InvalidDescriptor(format!(
                    "edge {} -> {} out of range for {} nodes",
                    edge.from,
                    edge.to,
                    self.nodes.len()
                )));
            }
        }
        Ok(())
    }

    /// Sources of the fragment: nodes with no internal incoming edge
    pub fn sources(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|index| !self.edges.iter().any(|edge| edge.to == *index))
            .collect()
    }

    /// Sinks of the fragment: nodes with no internal outgoing edge
    pub fn sinks(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|index| !self.edges.iter().any(|edge| edge.from == *index))
            .collect()
    }
}

impl<T: Clone> WorkflowGraph<T> {
    /// Copy the given nodes and the edges between them.
    ///
    /// Edges to nodes outside the subset are dropped. Node order follows
    /// `nodes`; edge order follows each source's successor order.
    pub fn extract(&self, nodes: &[NodeId]) -> Result<GraphDescriptor<T>> {
        let positions: HashMap<NodeId, usize> = nodes
            .iter()
            .enumerate()
            .map(|(position, node)| (*node, position))
            .collect();

        let mut descriptor = GraphDescriptor::default();
        for &node in nodes {
            descriptor.nodes.push(self.value(node)?.clone());
        }
        for (from, &node) in nodes.iter().enumerate() {
            for edge in self.successors(node)? {
                if let Some(&to) = positions.get(&edge.target) {
                    descriptor.edges.push(EdgeDescriptor {
                        from,
                        to,
                        label: edge.label,
                    });
                }
            }
        }
        Ok(descriptor)
    }

    /// Snapshot of the whole graph in canonical order
    pub fn to_descriptor(&self) -> Result<GraphDescriptor<T>> {
        self.extract(self.nodes())
    }

    /// Materialize a descriptor as fresh detached nodes.
    ///
    /// The returned ids are in descriptor order and carry the descriptor's
    /// edges among themselves. None of them is a member of the graph yet.
    pub fn instantiate(&mut self, descriptor: &GraphDescriptor<T>) -> Result<Vec<NodeId>> {
        let ids: Vec<NodeId> = descriptor
            .nodes
            .iter()
            .map(|value| self.allocate(value.clone()))
            .collect();
        for edge in &descriptor.edges {
            let (Some(&from), Some(&to)) = (ids.get(edge.from), ids.get(edge.to)) else {
                return Err(GraphError::IndexOutOfRange {
                    index: edge.from.max(edge.to),
                    len: ids.len(),
                });
            };
            let edge = self.new_edge(to, edge.label);
            self.attach_detached(from, edge)?;
        }
        Ok(ids)
    }

    /// Build a graph from a descriptor, keeping descriptor order
    pub fn from_descriptor(descriptor: &GraphDescriptor<T>) -> Result<Self> {
        let mut graph = Self::new();
        let ids = graph.instantiate(descriptor)?;
        graph.insert_range(0, &ids)?;
        Ok(graph)
    }
}
