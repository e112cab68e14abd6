//! Layering passes for a single connected component

use std::collections::HashMap;

use workflow_graph::{NodeId, WorkflowGraph};

use super::{GraphNode, GraphNodeGrouping, LayoutEdge, LayoutIndex, LayoutNodeKind};
use crate::operator::NodeCapabilities;

/// Assign layers by longest path to a sink.
///
/// `component` must be in topological order. Nodes are visited in reverse,
/// so every successor is layered before its predecessors. Within a layer,
/// later-placed nodes go first.
pub(super) fn longest_path<T: NodeCapabilities>(
    arena: &mut Vec<GraphNode>,
    graph: &WorkflowGraph<T>,
    component: &[NodeId],
) -> workflow_graph::Result<Vec<GraphNodeGrouping>> {
    let mut layer_map: HashMap<NodeId, LayoutIndex> = HashMap::new();
    let mut layers: Vec<GraphNodeGrouping> = Vec::new();

    for &node in component.iter().rev() {
        let successors = graph.successors(node)?;
        let mut targets = Vec::with_capacity(successors.len());
        let mut layer = 0;
        for edge in successors {
            let target = *layer_map
                .get(&edge.target)
                .ok_or(workflow_graph::GraphError::NodeNotFound(edge.target))?;
            layer = layer.max(arena[target].layer);
            arena[target].argument_count += 1;
            targets.push(target);
        }
        if !successors.is_empty() {
            layer += 1;
        }

        let mut layered_successors = Vec::with_capacity(successors.len());
        let mut chains = Vec::new();
        for (edge, &target) in successors.iter().zip(&targets) {
            let mut current = target;
            let mut chain = Vec::new();
            for dummy_layer in arena[target].layer + 1..layer {
                let mut dummy = GraphNode::new(
                    LayoutNodeKind::EdgeSpan {
                        source: node,
                        edge: edge.id,
                    },
                    dummy_layer,
                );
                dummy.successors.push(LayoutEdge {
                    target: current,
                    label: edge.label,
                });
                arena.push(dummy);
                current = arena.len() - 1;
                chain.push(current);
            }
            layered_successors.push(LayoutEdge {
                target: current,
                label: edge.label,
            });
            chains.extend(chain.into_iter().rev());
        }

        for dummy in chains {
            place(&mut layers, arena, dummy);
        }

        let mut layout_node = GraphNode::new(LayoutNodeKind::Node(node), layer);
        layout_node.successors = layered_successors;
        layout_node.annotation = graph.value(node)?.is_annotation();
        arena.push(layout_node);
        let index = arena.len() - 1;
        layer_map.insert(node, index);
        place(&mut layers, arena, index);
    }

    for grouping in &layers {
        reindex(arena, grouping);
    }
    Ok(layers)
}

fn place(layers: &mut Vec<GraphNodeGrouping>, arena: &[GraphNode], node: LayoutIndex) {
    let layer = arena[node].layer;
    match layers.iter_mut().find(|grouping| grouping.layer == layer) {
        Some(grouping) => grouping.nodes.insert(0, node),
        None => {
            let mut grouping = GraphNodeGrouping::new(layer);
            grouping.nodes.push(node);
            layers.push(grouping);
        }
    }
}

fn reindex(arena: &mut [GraphNode], grouping: &GraphNodeGrouping) {
    for (position, &node) in grouping.nodes.iter().enumerate() {
        arena[node].layer_index = position;
    }
}

fn spacer(arena: &mut Vec<GraphNode>, layer: usize) -> LayoutIndex {
    arena.push(GraphNode::new(LayoutNodeKind::Spacer, layer));
    arena.len() - 1
}

/// Order every layer but the first by the position of each node's
/// successors, then by argument index. A node is placed at its first
/// occurrence in that ordering.
pub(super) fn sort_layer_edge_labels(arena: &mut [GraphNode], layers: &mut [GraphNodeGrouping]) {
    for grouping in layers.iter_mut().skip(1) {
        let mut keyed = Vec::new();
        for &node in &grouping.nodes {
            for edge in &arena[node].successors {
                keyed.push(((arena[edge.target].layer_index, edge.label), node));
            }
        }
        keyed.sort_by_key(|(key, _)| *key);

        let mut sorted = Vec::with_capacity(grouping.nodes.len());
        for (_, node) in keyed {
            if !sorted.contains(&node) {
                sorted.push(node);
            }
        }
        for &node in &grouping.nodes {
            if !sorted.contains(&node) {
                sorted.push(node);
            }
        }
        grouping.nodes = sorted;
        reindex(arena, grouping);
    }
}

/// Pad each layer so no node sits left of its leftmost successor.
fn remove_branch_kinks(arena: &mut Vec<GraphNode>, layers: &mut [GraphNodeGrouping]) -> bool {
    let mut removed = false;
    for grouping in layers.iter_mut().skip(1) {
        let mut sorted = Vec::with_capacity(grouping.nodes.len());
        for &node in &grouping.nodes {
            let min_successor = arena[node]
                .successors
                .iter()
                .map(|edge| arena[edge.target].layer_index)
                .min();
            if let Some(min_successor) = min_successor {
                while sorted.len() < min_successor {
                    sorted.push(spacer(arena, grouping.layer));
                    removed = true;
                }
            }
            sorted.push(node);
        }
        grouping.nodes = sorted;
        reindex(arena, grouping);
    }
    removed
}

/// Pad each layer so no merge point sits left of its leftmost predecessor.
fn remove_merge_gaps(arena: &mut Vec<GraphNode>, layers: &mut [GraphNodeGrouping]) -> bool {
    let mut removed = false;
    let mut predecessors: HashMap<LayoutIndex, Vec<LayoutIndex>> = HashMap::new();
    let count = layers.len();
    for i in (0..count).rev() {
        let grouping = &mut layers[i];
        if i < count - 1 {
            let mut sorted = Vec::with_capacity(grouping.nodes.len());
            for &node in &grouping.nodes {
                let min_predecessor = predecessors.get(&node).and_then(|preds| {
                    preds.iter().map(|pred| arena[*pred].layer_index).min()
                });
                if let Some(min_predecessor) = min_predecessor {
                    while sorted.len() < min_predecessor {
                        sorted.push(spacer(arena, grouping.layer));
                        removed = true;
                    }
                }
                sorted.push(node);
            }
            grouping.nodes = sorted;
            reindex(arena, grouping);
        }

        predecessors.clear();
        for &node in &grouping.nodes {
            for edge in &arena[node].successors {
                predecessors.entry(edge.target).or_default().push(node);
            }
        }
    }
    removed
}

/// Kink removal, then merge-gap removal, then kink removal again only if
/// gap removal changed anything. Never iterated further.
pub(super) fn remove_successor_kinks(arena: &mut Vec<GraphNode>, layers: &mut [GraphNodeGrouping]) {
    remove_branch_kinks(arena, layers);
    if remove_merge_gaps(arena, layers) {
        remove_branch_kinks(arena, layers);
    }
}

#[cfg(test)]
mod tests {
    use workflow_graph::GraphBuilder;

    use super::*;
    use crate::operator::Operator;

    fn layered(
        graph: &WorkflowGraph<Operator>,
    ) -> (Vec<GraphNode>, Vec<GraphNodeGrouping>) {
        let mut arena = Vec::new();
        let order = graph.topological_sort().unwrap();
        let layers = longest_path(&mut arena, graph, &order).unwrap();
        (arena, layers)
    }

    fn names(
        graph: &WorkflowGraph<Operator>,
        arena: &[GraphNode],
        grouping: &GraphNodeGrouping,
    ) -> Vec<String> {
        grouping
            .nodes
            .iter()
            .map(|&index| match arena[index].kind {
                LayoutNodeKind::Node(node) => graph.value(node).unwrap().name().to_string(),
                LayoutNodeKind::EdgeSpan { .. } => "~".to_string(),
                LayoutNodeKind::Spacer => "_".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_layers_keyed_from_sinks() {
        let (graph, _) = GraphBuilder::new()
            .add_node("a", Operator::element("a", 0, 0))
            .add_node("b", Operator::element("b", 0, 0))
            .add_node("join", Operator::element("join", 2, 2))
            .add_edge("a", "join", 0)
            .add_edge("b", "join", 1)
            .build()
            .unwrap();
        let (arena, layers) = layered(&graph);
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].layer, 0);
        assert_eq!(names(&graph, &arena, &layers[0]), vec!["join"]);
        assert_eq!(names(&graph, &arena, &layers[1]), vec!["a", "b"]);
    }

    #[test]
    fn test_sort_by_argument_label() {
        let (graph, _) = GraphBuilder::new()
            .add_node("join", Operator::element("join", 2, 2))
            .add_node("b", Operator::element("b", 0, 0))
            .add_node("a", Operator::element("a", 0, 0))
            .add_edge("b", "join", 1)
            .add_edge("a", "join", 0)
            .unsorted()
            .build()
            .unwrap();
        let mut arena = Vec::new();
        let order = vec![
            graph.nodes()[1],
            graph.nodes()[2],
            graph.nodes()[0],
        ];
        let mut layers = longest_path(&mut arena, &graph, &order).unwrap();
        // placement follows the reverse visit; the label sort restores argument order
        assert_eq!(names(&graph, &arena, &layers[1]), vec!["b", "a"]);
        sort_layer_edge_labels(&mut arena, &mut layers);
        assert_eq!(names(&graph, &arena, &layers[1]), vec!["a", "b"]);
        assert_eq!(arena[layers[1].nodes[1]].layer_index, 1);
    }

    #[test]
    fn test_branch_kink_padding() {
        // a feeds both sinks; c hangs off the second branch only
        let (graph, _) = GraphBuilder::new()
            .add_node("s", Operator::element("s", 0, 0))
            .add_node("x", Operator::element("x", 1, 1))
            .add_node("y", Operator::element("y", 1, 1))
            .add_edge("s", "x", 0)
            .add_edge("s", "y", 0)
            .build()
            .unwrap();
        let (mut arena, mut layers) = layered(&graph);
        sort_layer_edge_labels(&mut arena, &mut layers);
        remove_successor_kinks(&mut arena, &mut layers);
        assert_eq!(names(&graph, &arena, &layers[0]), vec!["x", "y"]);
        assert_eq!(names(&graph, &arena, &layers[1]), vec!["s"]);
    }

    #[test]
    fn test_second_branch_source_is_padded() {
        let (graph, _) = GraphBuilder::new()
            .add_node("p", Operator::element("p", 0, 0))
            .add_node("q", Operator::element("q", 0, 0))
            .add_node("x", Operator::element("x", 1, 1))
            .add_node("y", Operator::element("y", 1, 1))
            .add_edge("p", "x", 0)
            .add_edge("q", "y", 0)
            .add_edge("p", "y", 1)
            .build()
            .unwrap();
        let (mut arena, mut layers) = layered(&graph);
        sort_layer_edge_labels(&mut arena, &mut layers);
        remove_successor_kinks(&mut arena, &mut layers);
        for grouping in &layers {
            for (position, &node) in grouping.nodes.iter().enumerate() {
                assert_eq!(arena[node].layer_index, position);
                assert_eq!(arena[node].layer, grouping.layer);
            }
        }
        // every real node is still placed exactly once
        let placed: usize = layers
            .iter()
            .flat_map(|grouping| grouping.nodes.iter())
            .filter(|&&node| !arena[node].is_dummy())
            .count();
        assert_eq!(placed, 4);
    }
}
