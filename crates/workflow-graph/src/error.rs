//! Error types for the workflow graph model

use thiserror::Error;

use crate::types::{EdgeId, NodeId};

/// Result type alias using GraphError
pub type Result<T> = std::result::Result<T, GraphError>;

/// Structural errors raised by graph primitives.
///
/// These indicate a stale reference or an out-of-range position and are
/// treated as fatal by callers that expect the structure to be consistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The node is not known to this graph
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// The node exists but is not currently a member of the graph
    #[error("Node {0} is not a member of the graph")]
    NotInGraph(NodeId),

    /// The node is already a member and cannot be restored
    #[error("Node {0} is already a member of the graph")]
    AlreadyInGraph(NodeId),

    /// No successor edge with this identity exists on the node
    #[error("Edge {edge} not found on node {node}")]
    EdgeNotFound { node: NodeId, edge: EdgeId },

    /// No node holds an edge with this identity
    #[error("Edge {0} is not attached to any node")]
    UnknownEdge(EdgeId),

    /// A successor position is out of range
    #[error("Edge position {position} is out of range for node {node}")]
    EdgePositionOutOfRange { node: NodeId, position: usize },

    /// A node order index is out of range
    #[error("Node index {index} is out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// A builder edge names a node that was never added
    #[error("Unknown node name: {0}")]
    UnknownName(String),

    /// The graph is not acyclic
    #[error("Graph contains a cycle")]
    CycleDetected,
}

/// Result type alias using StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors produced when encoding or decoding stored graphs
#[derive(Debug, Error)]
pub enum StoreError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Descriptor refers to nodes it does not contain
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),
}
