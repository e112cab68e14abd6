//! Identity and edge types shared by the graph model

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable node identity. Never reused within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Stable edge identity. Never reused within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// The argument slot an edge fills on its target node.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EdgeLabel {
    pub index: usize,
}

impl EdgeLabel {
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

/// An outgoing edge stored in the successor list of its source node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub target: NodeId,
    pub label: EdgeLabel,
}

/// An incoming edge seen from its target.
///
/// `position` is the index of `edge` inside the successor list of `source`
/// at the time the predecessor was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredecessorEdge {
    pub source: NodeId,
    pub edge: Edge,
    pub position: usize,
}
