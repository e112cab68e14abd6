//! Layered layout of workflow graphs
//!
//! The layout assigns every node a layer and a position within that layer.
//! Layer 0 holds the sinks; a node's layer is one more than the highest
//! layer among its successors. Edges spanning several layers are broken into
//! chains of dummy nodes so that every edge in the layered graph connects
//! adjacent layers. The whole structure is rebuilt on every refresh.

mod layering;

use std::collections::HashMap;

use workflow_graph::{EdgeId, EdgeLabel, NodeId, WorkflowGraph};

use crate::config::LayoutConfig;
use crate::operator::NodeCapabilities;

/// Position of a node in the [`LayeredGraph`] arena
pub type LayoutIndex = usize;

/// What a layout node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutNodeKind {
    /// A workflow node
    Node(NodeId),
    /// One segment of an edge spanning several layers
    EdgeSpan { source: NodeId, edge: EdgeId },
    /// Padding inserted to straighten branches
    Spacer,
}

/// Edge between layout nodes in adjacent layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutEdge {
    pub target: LayoutIndex,
    pub label: EdgeLabel,
}

/// A node of the layered graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub kind: LayoutNodeKind,
    pub layer: usize,
    pub layer_index: usize,
    pub successors: Vec<LayoutEdge>,
    /// Number of workflow edges targeting this node
    pub argument_count: usize,
    /// Position of the workflow node in canonical order
    pub index: Option<usize>,
    pub annotation: bool,
}

impl GraphNode {
    fn new(kind: LayoutNodeKind, layer: usize) -> Self {
        Self {
            kind,
            layer,
            layer_index: 0,
            successors: Vec::new(),
            argument_count: 0,
            index: None,
            annotation: false,
        }
    }

    /// The workflow node, if this is not a dummy
    pub fn value(&self) -> Option<NodeId> {
        match self.kind {
            LayoutNodeKind::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.value().is_none()
    }
}

/// Nodes sharing one layer, in layer-index order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNodeGrouping {
    pub layer: usize,
    pub nodes: Vec<LayoutIndex>,
}

impl GraphNodeGrouping {
    fn new(layer: usize) -> Self {
        Self {
            layer,
            nodes: Vec::new(),
        }
    }
}

/// Result of a layout pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayeredGraph {
    nodes: Vec<GraphNode>,
    layers: Vec<GraphNodeGrouping>,
    lookup: HashMap<NodeId, LayoutIndex>,
}

impl LayeredGraph {
    /// Layers ordered by layer number, sinks first
    pub fn layers(&self) -> &[GraphNodeGrouping] {
        &self.layers
    }

    /// All layout nodes, dummies included
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, index: LayoutIndex) -> Option<&GraphNode> {
        self.nodes.get(index)
    }

    /// Layout node of a workflow node
    pub fn find(&self, node: NodeId) -> Option<&GraphNode> {
        self.lookup.get(&node).and_then(|index| self.nodes.get(*index))
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Downstream-increasing rank of a layout node: sources of the longest
    /// chains get rank 0 and every edge goes from rank `r` to rank `r + 1`.
    pub fn rank(&self, node: &GraphNode) -> usize {
        self.layers.len().saturating_sub(node.layer + 1)
    }

    /// `(layer, layer_index)` of a workflow node
    pub fn position(&self, node: NodeId) -> Option<(usize, usize)> {
        self.find(node).map(|n| (n.layer, n.layer_index))
    }
}

/// Computes [`LayeredGraph`]s from workflow graphs
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Lay out every connected component and merge them side by side.
    ///
    /// Components keep their topological order. Layer indices of each
    /// component are offset by the widest layer of the components merged
    /// before it, so no two components share a `(layer, layer_index)`.
    pub fn compute<T: NodeCapabilities>(
        &self,
        graph: &WorkflowGraph<T>,
    ) -> workflow_graph::Result<LayeredGraph> {
        let mut arena = Vec::new();
        let mut layers: Vec<GraphNodeGrouping> = Vec::new();
        let mut offset = 0;
        let mut singletons: Option<GraphNodeGrouping> = None;

        for component in graph.connected_components()? {
            let mut layered = layering::longest_path(&mut arena, graph, &component)?;
            if self.config.sort_edge_labels {
                layering::sort_layer_edge_labels(&mut arena, &mut layered);
            }
            if self.config.remove_successor_kinks {
                layering::remove_successor_kinks(&mut arena, &mut layered);
            }

            if self.config.batch_trivial_components && component.len() == 1 {
                let Some(node) = layered.first().and_then(|layer| layer.nodes.first()).copied()
                else {
                    continue;
                };
                match singletons.as_mut() {
                    Some(batch) if !arena[node].annotation => batch.nodes.push(node),
                    Some(_) => {
                        if let Some(batch) = singletons.replace(GraphNodeGrouping {
                            layer: 0,
                            nodes: vec![node],
                        }) {
                            merge_singletons(&mut arena, batch, &mut layers, &mut offset);
                        }
                    }
                    None => {
                        singletons = Some(GraphNodeGrouping {
                            layer: 0,
                            nodes: vec![node],
                        })
                    }
                }
                continue;
            }

            if let Some(batch) = singletons.take() {
                merge_singletons(&mut arena, batch, &mut layers, &mut offset);
            }
            merge_component(&mut arena, layered, &mut layers, &mut offset);
        }

        if let Some(batch) = singletons.take() {
            merge_singletons(&mut arena, batch, &mut layers, &mut offset);
        }

        let mut lookup = HashMap::new();
        for (index, layout_node) in arena.iter_mut().enumerate() {
            if let LayoutNodeKind::Node(node) = layout_node.kind {
                layout_node.index = graph.index_of(node);
                lookup.insert(node, index);
            }
        }

        log::debug!(
            "Computed layout: {} layers, {} layout nodes",
            layers.len(),
            arena.len()
        );
        Ok(LayeredGraph {
            nodes: arena,
            layers,
            lookup,
        })
    }
}

/// Spread a batch of single-node components over consecutive layers of one
/// row, the first node taking the highest layer.
fn merge_singletons(
    arena: &mut [GraphNode],
    batch: GraphNodeGrouping,
    layers: &mut Vec<GraphNodeGrouping>,
    offset: &mut usize,
) {
    let count = batch.nodes.len();
    let mut layered = Vec::with_capacity(count);
    for (i, node) in batch.nodes.into_iter().enumerate() {
        let key = count - i - 1;
        arena[node].layer = key;
        arena[node].layer_index = 0;
        layered.insert(
            0,
            GraphNodeGrouping {
                layer: key,
                nodes: vec![node],
            },
        );
    }
    merge_component(arena, layered, layers, offset);
}

fn merge_component(
    arena: &mut [GraphNode],
    layered: Vec<GraphNodeGrouping>,
    layers: &mut Vec<GraphNodeGrouping>,
    offset: &mut usize,
) {
    let mut max_layer_count = 0;
    for grouping in layered {
        max_layer_count = max_layer_count.max(grouping.nodes.len());
        for &node in &grouping.nodes {
            arena[node].layer_index += *offset;
        }
        match layers.get_mut(grouping.layer) {
            Some(existing) => existing.nodes.extend(grouping.nodes),
            None => layers.push(grouping),
        }
    }
    *offset += max_layer_count;
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use workflow_graph::GraphBuilder;

    use super::*;
    use crate::operator::Operator;

    fn op(name: &str) -> Operator {
        Operator::element(name, 0, 4)
    }

    fn layout(graph: &WorkflowGraph<Operator>) -> LayeredGraph {
        LayoutEngine::default().compute(graph).unwrap()
    }

    #[test]
    fn test_chain_layers() {
        let (graph, ids) = GraphBuilder::new()
            .add_node("a", op("a"))
            .add_node("b", op("b"))
            .add_node("c", op("c"))
            .add_edge("a", "b", 0)
            .add_edge("b", "c", 0)
            .build()
            .unwrap();
        let layered = layout(&graph);
        assert_eq!(layered.layer_count(), 3);
        assert_eq!(layered.position(ids["c"]), Some((0, 0)));
        assert_eq!(layered.position(ids["b"]), Some((1, 0)));
        assert_eq!(layered.position(ids["a"]), Some((2, 0)));
        assert_eq!(layered.rank(layered.find(ids["a"]).unwrap()), 0);
        assert_eq!(layered.find(ids["b"]).unwrap().argument_count, 1);
        assert_eq!(layered.find(ids["a"]).unwrap().index, Some(0));
    }

    #[test]
    fn test_long_edge_gets_dummies() {
        let (graph, ids) = GraphBuilder::new()
            .add_node("a", op("a"))
            .add_node("b", op("b"))
            .add_node("c", op("c"))
            .add_node("d", op("d"))
            .add_edge("a", "b", 0)
            .add_edge("b", "c", 0)
            .add_edge("c", "d", 0)
            .add_edge("a", "d", 1)
            .build()
            .unwrap();
        let layered = layout(&graph);
        let dummies: Vec<&GraphNode> = layered
            .nodes()
            .iter()
            .filter(|n| matches!(n.kind, LayoutNodeKind::EdgeSpan { .. }))
            .collect();
        assert_eq!(dummies.len(), 2);
        assert_eq!(layered.find(ids["a"]).unwrap().layer, 3);
        assert_eq!(layered.find(ids["d"]).unwrap().argument_count, 2);
    }

    #[test]
    fn test_every_edge_spans_one_rank() {
        let (graph, _) = GraphBuilder::new()
            .add_node("a", op("a"))
            .add_node("b", op("b"))
            .add_node("c", op("c"))
            .add_node("d", op("d"))
            .add_node("e", op("e"))
            .add_edge("a", "b", 0)
            .add_edge("a", "e", 0)
            .add_edge("b", "c", 0)
            .add_edge("c", "e", 1)
            .add_edge("d", "e", 2)
            .build()
            .unwrap();
        let layered = layout(&graph);
        for node in layered.nodes() {
            for edge in &node.successors {
                let target = layered.node(edge.target).unwrap();
                assert_eq!(layered.rank(target), layered.rank(node) + 1);
            }
        }
    }

    #[test]
    fn test_components_do_not_overlap() {
        let (graph, _) = GraphBuilder::new()
            .add_node("a", op("a"))
            .add_node("b", op("b"))
            .add_node("c", op("c"))
            .add_node("d", op("d"))
            .add_edge("a", "b", 0)
            .add_edge("c", "d", 0)
            .build()
            .unwrap();
        let layered = layout(&graph);
        let mut seen = HashSet::new();
        for node in layered.nodes() {
            assert!(seen.insert((node.layer, node.layer_index)));
        }
        let rows: HashSet<usize> = layered
            .nodes()
            .iter()
            .map(|node| node.layer_index)
            .collect();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_trivial_components_share_a_row() {
        let (graph, ids) = GraphBuilder::new()
            .add_node("a", op("a"))
            .add_node("b", op("b"))
            .add_node("c", op("c"))
            .build()
            .unwrap();
        let layered = layout(&graph);
        assert_eq!(layered.position(ids["a"]), Some((2, 0)));
        assert_eq!(layered.position(ids["b"]), Some((1, 0)));
        assert_eq!(layered.position(ids["c"]), Some((0, 0)));
    }

    #[test]
    fn test_annotation_starts_new_row() {
        let (graph, ids) = GraphBuilder::new()
            .add_node("a", op("a"))
            .add_node("note", Operator::annotation("note"))
            .add_node("b", op("b"))
            .build()
            .unwrap();
        let layered = layout(&graph);
        assert_eq!(layered.position(ids["a"]), Some((0, 0)));
        assert_eq!(layered.position(ids["note"]), Some((1, 1)));
        assert_eq!(layered.position(ids["b"]), Some((0, 1)));
    }

    #[test]
    fn test_unbatched_trivial_components() {
        let (graph, ids) = GraphBuilder::new()
            .add_node("a", op("a"))
            .add_node("b", op("b"))
            .build()
            .unwrap();
        let engine = LayoutEngine::new(LayoutConfig {
            batch_trivial_components: false,
            ..LayoutConfig::default()
        });
        let layered = engine.compute(&graph).unwrap();
        assert_eq!(layered.position(ids["a"]), Some((0, 0)));
        assert_eq!(layered.position(ids["b"]), Some((0, 1)));
    }

    #[test]
    fn test_layout_is_deterministic() {
        let (graph, _) = GraphBuilder::new()
            .add_node("a", op("a"))
            .add_node("b", op("b"))
            .add_node("c", op("c"))
            .add_node("d", op("d"))
            .add_node("e", op("e"))
            .add_node("f", op("f"))
            .add_edge("a", "c", 0)
            .add_edge("b", "c", 1)
            .add_edge("c", "d", 0)
            .add_edge("a", "d", 1)
            .add_edge("e", "f", 0)
            .build()
            .unwrap();
        assert_eq!(layout(&graph), layout(&graph));
    }
}
