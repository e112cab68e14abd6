//! Workflow Graph - ordered, index-labelled DAG model
//!
//! This crate provides the graph model underneath the workflow editor:
//!
//! - Ordered node membership with stable node and edge identities
//! - Successor edges labelled with the argument slot they fill on the target
//! - Stable topological sort and connected-component decomposition
//! - Explicit structural deep clone through [`GraphDescriptor`]
//! - zstd-compressed JSON persistence through [`GraphStore`]
//!
//! Removed nodes stay in the graph's arena with their outgoing edges, so
//! edits recorded by identity can always be replayed in reverse.

pub mod builder;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod store;
pub mod traversal;
pub mod types;

// Re-export key types
pub use builder::GraphBuilder;
pub use descriptor::{EdgeDescriptor, GraphDescriptor};
pub use error::{GraphError, Result, StoreError, StoreResult};
pub use graph::WorkflowGraph;
pub use store::{CompressedJsonStore, GraphStore, JsonStore};
pub use types::{Edge, EdgeId, EdgeLabel, NodeId, PredecessorEdge};
