//! Workflow Editor - undoable structural editing of workflow graphs
//!
//! This crate provides an interactive editing session over a
//! [`workflow_graph::WorkflowGraph`]. It supports:
//!
//! - Inserting, deleting, connecting and disconnecting nodes
//! - Reordering branches and moving nodes between components
//! - Grouping selections into nested workflows and expanding them again
//! - Copy/paste of subgraphs through a [`workflow_graph::GraphStore`]
//! - Undo/redo of every edit, including nested composite edits
//! - Layered layout recomputed once per edit
//!
//! # Architecture
//!
//! - `WorkflowEditor`: Owns the workflow, its layout and the edit history
//! - `CommandExecutor`: Generic undo/redo stack of reversible commands
//! - `LayoutEngine`: Layered layout pipeline producing a `LayeredGraph`
//! - `GraphView`: Collaborator receiving layouts and exposing the selection
//!
//! # Example
//!
//! ```ignore
//! use workflow_editor::{InsertMode, Operator, WorkflowEditor};
//! use workflow_graph::GraphBuilder;
//!
//! let (graph, ids) = GraphBuilder::new()
//!     .add_node("source", Operator::element("Source", 0, 0))
//!     .add_node("sink", Operator::element("Sink", 1, 1))
//!     .add_edge("source", "sink", 0)
//!     .build()?;
//! let mut editor = WorkflowEditor::with_workflow(graph)?;
//! editor.insert_node(Operator::element("Filter", 1, 1), &[ids["source"]], InsertMode::Successor, false)?;
//! editor.undo()?;
//! ```

pub mod command;
pub mod config;
pub mod editor;
pub mod error;
pub mod layout;
pub mod operator;
pub mod view;

// Re-export key types
pub use command::{Action, CommandExecutor};
pub use config::{EditorConfig, LayoutConfig};
pub use editor::{InsertMode, WorkflowEditor};
pub use error::{CommandError, EditorError, Result, ValidationError};
pub use layout::{GraphNode, LayeredGraph, LayoutEngine};
pub use operator::{ArgumentRange, GroupOperator, NodeCapabilities, Operator, OperatorDescriptor};
pub use view::{GraphView, MemoryView};
