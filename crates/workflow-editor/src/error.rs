//! Error types for the workflow editor

use thiserror::Error;
use workflow_graph::{GraphError, NodeId, StoreError};

/// Result type alias using EditorError
pub type Result<T> = std::result::Result<T, EditorError>;

/// An edit that was rejected before it could leave the workflow inconsistent.
///
/// Validation errors are recoverable: the graph is left exactly as it was
/// before the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A node cannot be connected to itself
    #[error("Node {0} cannot be connected to itself")]
    SelfLoop(NodeId),

    /// The connection already exists
    #[error("Node {from} is already connected to {to}")]
    DuplicateEdge { from: NodeId, to: NodeId },

    /// The connection would close a cycle
    #[error("Connecting {from} to {to} would create a cycle")]
    Cycle { from: NodeId, to: NodeId },

    /// The target accepts no more arguments
    #[error("Node {target} accepts at most {max} arguments")]
    ArgumentRangeOverflow { target: NodeId, max: usize },

    /// A selected node is only reachable through unselected nodes
    #[error("Selection contains a broken branch at node {0}")]
    BrokenBranch(NodeId),

    /// Only the single sink of a grouped selection may feed nodes outside it
    #[error("Node {0} feeds nodes outside the selection but is not its only sink")]
    AmbiguousGroupOutput(NodeId),

    /// Non-branching insertion targets must not form a chain
    #[error("Insertion targets form a chain")]
    InvalidInsertChain,

    /// The nodes cannot be reordered relative to the target
    #[error("Node {node} cannot be reordered onto {target}")]
    InvalidReorder { node: NodeId, target: NodeId },

    /// The move target is part of the moved selection
    #[error("Node {0} cannot be the target of its own move")]
    InvalidMoveTarget(NodeId),

    /// The node is not an enabled group
    #[error("Node {0} is not a group")]
    NotAGroup(NodeId),

    /// The operation needs at least one node
    #[error("No nodes selected")]
    EmptySelection,
}

/// Misuse of the command history
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Undo, redo or clear requested while a composite command is open
    #[error("Cannot {0} while a composite command is in progress")]
    CompositeInProgress(&'static str),

    /// `end_composite` called without a matching `begin_composite`
    #[error("No composite command in progress")]
    NoComposite,

    /// A recorded action failed against the current structure
    #[error("Command action failed: {0}")]
    Action(#[from] GraphError),
}

/// Errors returned by editor operations
#[derive(Debug, Error)]
pub enum EditorError {
    /// The edit was rejected and rolled back
    #[error("Invalid edit: {0}")]
    Validation(#[from] ValidationError),

    /// The workflow structure is inconsistent
    #[error("Structural error: {0}")]
    Structural(#[from] GraphError),

    /// The command history was misused
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// A stored workflow could not be read or written
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl EditorError {
    /// Whether the edit was rejected by validation
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
