//! View collaborator interface
//!
//! The editor pushes freshly computed layouts and selections to a view and
//! reads back what the user has selected and where the cursor is.

use workflow_graph::NodeId;

use crate::layout::LayeredGraph;

/// Receives layout updates and exposes the user's selection
pub trait GraphView {
    /// A new layout replaced the previous one
    fn update_layout(&mut self, layout: &LayeredGraph);

    /// The editor changed the selection
    fn update_selection(&mut self, nodes: &[NodeId]);

    /// Currently selected workflow nodes, in selection order
    fn selected_nodes(&self) -> Vec<NodeId>;

    /// Node under the keyboard cursor
    fn cursor_node(&self) -> Option<NodeId>;
}

/// In-memory view holding the last layout and selection
#[derive(Debug, Clone, Default)]
pub struct MemoryView {
    layout: LayeredGraph,
    selection: Vec<NodeId>,
    cursor: Option<NodeId>,
    layout_updates: usize,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select nodes as a user would; the cursor moves to the last one
    pub fn select(&mut self, nodes: &[NodeId]) {
        self.selection = nodes.to_vec();
        self.cursor = nodes.last().copied();
    }

    pub fn set_cursor(&mut self, node: Option<NodeId>) {
        self.cursor = node;
    }

    /// The last layout received
    pub fn layout(&self) -> &LayeredGraph {
        &self.layout
    }

    /// How many layouts were received
    pub fn layout_updates(&self) -> usize {
        self.layout_updates
    }
}

impl GraphView for MemoryView {
    fn update_layout(&mut self, layout: &LayeredGraph) {
        self.layout = layout.clone();
        self.layout_updates += 1;
    }

    fn update_selection(&mut self, nodes: &[NodeId]) {
        self.select(nodes);
    }

    fn selected_nodes(&self) -> Vec<NodeId> {
        self.selection.clone()
    }

    fn cursor_node(&self) -> Option<NodeId> {
        self.cursor
    }
}
