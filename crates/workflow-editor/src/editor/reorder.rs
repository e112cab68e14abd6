//! Reordering branches and components

use std::collections::{HashMap, HashSet};

use workflow_graph::{GraphError, NodeId};

use super::{first_index_of_component, GraphResult, Script, WorkflowEditor, Workspace};
use crate::error::{Result, ValidationError};
use crate::view::GraphView;

impl<V: GraphView + 'static> WorkflowEditor<V> {
    /// Move each node's branch before the branch of `target`.
    ///
    /// Nodes sharing a successor with `target` swap argument slots on that
    /// successor. Nodes elsewhere in the same component move their branch in
    /// front of the target's branch. Nodes in another component move their
    /// whole component in front of the target's component. Returns the
    /// reordered nodes; nodes of a moved component are replaced by copies.
    pub fn reorder(&mut self, nodes: &[NodeId], target: NodeId) -> Result<Vec<NodeId>> {
        self.check_reorder(nodes, target)?;
        let selection = self.sort_selection(nodes)?;
        let nodes = nodes.to_vec();
        self.transaction("reorder", selection.clone(), move |editor| {
            let mut replaced = HashMap::new();
            for node in editor.sort_reorder_commands(&nodes, target)? {
                if !editor.workspace.workflow.contains(node) {
                    continue;
                }
                replaced.extend(editor.reorder_node(node, target)?);
            }
            let selection: Vec<NodeId> = selection
                .iter()
                .map(|node| replaced.get(node).copied().unwrap_or(*node))
                .collect();
            Ok((selection.clone(), selection))
        })
    }

    /// Whether every node can be reordered onto `target`
    pub fn can_reorder(&self, nodes: &[NodeId], target: NodeId) -> bool {
        self.check_reorder(nodes, target).is_ok()
    }

    /// A node can be reordered unless its downstream overlaps the target's
    /// without the two sharing a direct successor.
    fn check_reorder(&self, nodes: &[NodeId], target: NodeId) -> Result<()> {
        let workflow = &self.workspace.workflow;
        self.index_of(target)?;
        let target_successors = successor_targets(workflow, target)?;
        let target_reach: HashSet<NodeId> =
            workflow.depth_first_search(target)?.into_iter().collect();
        for &node in nodes {
            self.index_of(node)?;
            if node == target {
                return Err(ValidationError::InvalidReorder { node, target }.into());
            }
            let shared = successor_targets(workflow, node)?
                .iter()
                .any(|successor| target_successors.contains(successor));
            if shared {
                continue;
            }
            let overlaps = workflow
                .depth_first_search(node)?
                .iter()
                .any(|reached| target_reach.contains(reached));
            if overlaps {
                return Err(ValidationError::InvalidReorder { node, target }.into());
            }
        }
        Ok(())
    }

    /// Order in which to reorder the nodes.
    ///
    /// Nodes whose downstream overlaps an earlier node's are dropped, as are
    /// later nodes of a component that is moved as a whole. Component moves
    /// go last.
    fn sort_reorder_commands(&self, nodes: &[NodeId], target: NodeId) -> GraphResult<Vec<NodeId>> {
        let workflow = &self.workspace.workflow;
        let target_successors = successor_targets(workflow, target)?;
        let components = workflow.connected_components()?;
        let component_index = |node: NodeId| {
            components
                .iter()
                .position(|component| component.contains(&node))
        };
        let target_component = component_index(target);

        let mut sources: Vec<Option<NodeId>> = nodes.iter().copied().map(Some).collect();
        let mut component_moves = Vec::new();
        for i in 0..sources.len() {
            let Some(node) = sources[i] else {
                continue;
            };
            let chained = successor_targets(workflow, node)?
                .iter()
                .any(|successor| target_successors.contains(successor));
            if chained {
                continue;
            }

            let node_component = component_index(node);
            if node_component != target_component {
                component_moves.push(node);
                sources[i] = None;
            }
            let reach: HashSet<NodeId> = workflow.depth_first_search(node)?.into_iter().collect();
            for later in sources.iter_mut().skip(i + 1) {
                let Some(other) = *later else {
                    continue;
                };
                let overlaps = workflow
                    .depth_first_search(other)?
                    .iter()
                    .any(|reached| reach.contains(reached));
                if overlaps
                    || (node_component != target_component
                        && node_component == component_index(other))
                {
                    *later = None;
                }
            }
        }

        let mut ordered: Vec<NodeId> = sources.into_iter().flatten().collect();
        ordered.extend(component_moves);
        Ok(ordered)
    }

    /// Reorder a single node, returning copies that replaced original nodes
    fn reorder_node(&mut self, source: NodeId, target: NodeId) -> Result<HashMap<NodeId, NodeId>> {
        let workflow = &self.workspace.workflow;
        let source_edges = workflow.successors(source)?.to_vec();
        let target_edges = workflow.successors(target)?.to_vec();

        let mut splice = Script::new();
        let mut restore = Script::new();
        for source_edge in &source_edges {
            let Some(target_edge) = target_edges
                .iter()
                .find(|edge| edge.target == source_edge.target)
            else {
                continue;
            };
            let from = source_edge.label.index;
            let to = target_edge.label.index;
            let siblings = workflow.predecessor_edges(source_edge.target)?;
            let (moved_to, shift, shifted): (usize, isize, Vec<_>) = if from < to {
                let shifted = siblings
                    .iter()
                    .filter(|sibling| sibling.edge.label.index > from && sibling.edge.label.index < to)
                    .map(|sibling| sibling.edge.id)
                    .collect();
                (to - 1, -1, shifted)
            } else {
                let shifted = siblings
                    .iter()
                    .filter(|sibling| sibling.edge.label.index >= to && sibling.edge.label.index < from)
                    .map(|sibling| sibling.edge.id)
                    .collect();
                (to, 1, shifted)
            };

            let edge = source_edge.id;
            let undo_shifted = shifted.clone();
            splice.push(move |workspace: &mut Workspace<V>| {
                workspace
                    .workflow
                    .update_label(edge, |label| label.index = moved_to)?;
                for sibling in &shifted {
                    workspace
                        .workflow
                        .update_label(*sibling, |label| label.index = offset(label.index, shift))?;
                }
                Ok(())
            });
            restore.push(move |workspace: &mut Workspace<V>| {
                workspace
                    .workflow
                    .update_label(edge, |label| label.index = from)?;
                for sibling in &undo_shifted {
                    workspace
                        .workflow
                        .update_label(*sibling, |label| label.index = offset(label.index, -shift))?;
                }
                Ok(())
            });
        }

        if !splice.is_empty() {
            log::debug!("Swapping argument slots of {} and {}", source, target);
            let mut sort = Script::new();
            sort.push(super::sort_workflow);
            self.record(Script::new(), sort.clone())?;
            self.record(splice, restore)?;
            self.record(sort, Script::new())?;
            return Ok(HashMap::new());
        }

        let workflow = &self.workspace.workflow;
        let source_component = workflow.component_of(source)?;
        if source_component.contains(&target) {
            self.reorder_branch(source, target)?;
            Ok(HashMap::new())
        } else {
            let target_component = workflow.component_of(target)?;
            self.reorder_component(&source_component, &target_component)
        }
    }

    /// Put the branch of `source` in front of the branch of `target` inside
    /// one component.
    fn reorder_branch(&mut self, source: NodeId, target: NodeId) -> Result<()> {
        let workflow = &self.workspace.workflow;
        let order = workflow.topological_sort()?;
        let mut distance: HashMap<NodeId, usize> = HashMap::with_capacity(order.len());
        for &node in order.iter().rev() {
            let mut longest = 0;
            for edge in workflow.successors(node)? {
                if let Some(successor) = distance.get(&edge.target) {
                    longest = longest.max(successor + 1);
                }
            }
            distance.insert(node, longest);
        }

        let source_ancestors = ancestors(workflow, source)?;
        let target_ancestors = ancestors(workflow, target)?;
        let ancestor = workflow
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, node)| source_ancestors.contains(*node) && target_ancestors.contains(*node))
            .min_by_key(|(index, node)| (distance.get(*node).copied().unwrap_or_default(), *index))
            .map(|(_, node)| *node);

        let mut splice = Script::new();
        let mut restore = Script::new();
        if let Some(ancestor) = ancestor {
            let edges = workflow.successors(ancestor)?;
            let toward = |goal: NodeId| -> GraphResult<Option<usize>> {
                for (position, edge) in edges.iter().enumerate() {
                    if edge.target == goal || workflow.is_reachable(edge.target, goal)? {
                        return Ok(Some(position));
                    }
                }
                Ok(None)
            };
            if let (Some(from), Some(before)) = (toward(source)?, toward(target)?) {
                if from != before {
                    let moved = edges[from];
                    let anchor = edges[before].id;
                    log::debug!("Splicing branch of {} before {} at {}", source, target, ancestor);
                    splice.push(move |workspace: &mut Workspace<V>| {
                        workspace.workflow.remove_edge(ancestor, moved.id)?;
                        let position = workspace
                            .workflow
                            .successors(ancestor)?
                            .iter()
                            .position(|edge| edge.id == anchor)
                            .ok_or(GraphError::EdgeNotFound {
                                node: ancestor,
                                edge: anchor,
                            })?;
                        workspace.workflow.insert_edge(ancestor, position, moved)
                    });
                    restore.push(move |workspace: &mut Workspace<V>| {
                        workspace.workflow.remove_edge(ancestor, moved.id)?;
                        workspace.workflow.insert_edge(ancestor, from, moved)
                    });
                }
            }
        }

        let sinks_of = |node: NodeId| -> GraphResult<Vec<NodeId>> {
            let reach: HashSet<NodeId> = workflow.depth_first_search(node)?.into_iter().collect();
            Ok(workflow
                .nodes()
                .iter()
                .copied()
                .filter(|member| reach.contains(member))
                .filter(|member| workflow.successors(*member).map_or(false, |s| s.is_empty()))
                .collect())
        };
        let source_sinks = sinks_of(source)?;
        let sink_index = sinks_of(target)?
            .first()
            .and_then(|sink| workflow.index_of(*sink));
        let target_index = self.index_of(target)?;

        let reorder = self.reversible_sort();
        self.record(Script::new(), reorder.revert)?;
        self.record(splice, restore)?;
        let mut reposition = Script::new();
        reposition.push(move |workspace: &mut Workspace<V>| {
            if let Some(index) = sink_index {
                workspace.workflow.insert_range(index, &source_sinks)?;
            }
            let index = workspace
                .workflow
                .index_of(target)
                .unwrap_or(target_index);
            workspace.workflow.insert(index, source)
        });
        self.record(reposition, Script::new())?;
        self.record(reorder.apply, Script::new())
    }

    /// Replace a component with a copy placed right before another component
    fn reorder_component(
        &mut self,
        component: &[NodeId],
        target_component: &[NodeId],
    ) -> Result<HashMap<NodeId, NodeId>> {
        let workflow = &self.workspace.workflow;
        let Some(target_index) = first_index_of_component(workflow, target_component) else {
            return Ok(HashMap::new());
        };

        let mut placements = Vec::with_capacity(component.len());
        for &node in component {
            let index = self.index_of(node)?;
            placements.push((index, node));
        }
        placements.sort_by_key(|(index, _)| *index);
        let originals: Vec<NodeId> = placements.iter().map(|(_, node)| *node).collect();
        let before = placements
            .iter()
            .filter(|(index, _)| *index < target_index)
            .count();
        let insert_index = target_index - before;

        let fragment = self.workspace.workflow.extract(&originals)?;
        let clones = self.workspace.workflow.instantiate(&fragment)?;
        log::debug!(
            "Moving component of {} nodes to index {}",
            clones.len(),
            insert_index
        );

        let mut apply = Script::new();
        let removed = originals.clone();
        let inserted = clones.clone();
        apply.push(move |workspace: &mut Workspace<V>| {
            workspace.workflow.remove_range(&removed)?;
            workspace.workflow.insert_range(insert_index, &inserted)
        });
        let mut revert = Script::new();
        let copies = clones.clone();
        revert.push(move |workspace: &mut Workspace<V>| {
            workspace.workflow.remove_range(&copies)?;
            workspace.workflow.restore(&placements)
        });
        self.record(apply, revert)?;

        Ok(originals.into_iter().zip(clones).collect())
    }
}

fn successor_targets<T>(
    workflow: &workflow_graph::WorkflowGraph<T>,
    node: NodeId,
) -> GraphResult<Vec<NodeId>> {
    Ok(workflow
        .successors(node)?
        .iter()
        .map(|edge| edge.target)
        .collect())
}

/// Every member node that reaches `node`, excluding `node` itself
fn ancestors<T>(workflow: &workflow_graph::WorkflowGraph<T>, node: NodeId) -> GraphResult<HashSet<NodeId>> {
    let mut found = HashSet::new();
    let mut pending = vec![node];
    while let Some(current) = pending.pop() {
        for pred in workflow.predecessors(current)? {
            if found.insert(pred) {
                pending.push(pred);
            }
        }
    }
    Ok(found)
}

fn offset(index: usize, shift: isize) -> usize {
    index.saturating_add_signed(shift)
}
