//! Deleting and moving nodes

use std::collections::HashSet;

use workflow_graph::{Edge, NodeId};

use super::{add_workflow_input, remove_workflow_input, Edit, InsertMode, Script, WorkflowEditor, Workspace};
use crate::error::{Result, ValidationError};
use crate::operator::NodeCapabilities;
use crate::view::GraphView;

/// An edge wired around a deleted node
#[derive(Debug, Clone, Copy)]
struct Heal {
    source: NodeId,
    position: usize,
    edge: Edge,
}

impl<V: GraphView + 'static> WorkflowEditor<V> {
    /// Delete nodes.
    ///
    /// With `replace_edges`, a node with exactly one predecessor, or with one
    /// successor fed by nothing else, is bypassed so its neighbours stay
    /// connected.
    pub fn delete_nodes(&mut self, nodes: &[NodeId], replace_edges: bool) -> Result<()> {
        let nodes = self.sort_selection(nodes)?;
        if nodes.is_empty() {
            return Ok(());
        }
        self.transaction("delete nodes", nodes.clone(), move |editor| {
            let reorder = editor.reversible_sort();
            editor.record(Script::new(), reorder.revert)?;
            for &node in &nodes {
                editor.delete_node(node, replace_edges, None)?;
            }
            editor.record(reorder.apply, Script::new())?;
            Ok(((), Vec::new()))
        })
    }

    /// Remove a single node.
    ///
    /// With `replace_edges`, a node with exactly one predecessor, or with one
    /// successor fed by nothing else, is bypassed: its predecessors are wired
    /// to its successors keeping their argument slots. Otherwise the
    /// successors' remaining arguments shift down to close the gap. Undo puts
    /// the node back at `index`, or appends it when there is none.
    pub(super) fn delete_node(
        &mut self,
        node: NodeId,
        replace_edges: bool,
        index: Option<usize>,
    ) -> Result<()> {
        let workflow = &self.workspace.workflow;
        self.index_of(node)?;
        let predecessors = workflow.predecessor_edges(node)?;
        let successors = workflow.successors(node)?.to_vec();

        let simple_predecessor = predecessors.len() == 1;
        let simple_successor = successors.len() == 1
            && workflow.predecessors(successors[0].target)?.len() == 1;
        let mut replace = replace_edges && (simple_predecessor || simple_successor);
        if replace && !simple_predecessor {
            let successor = successors[0].target;
            let max = workflow.value(successor)?.argument_range().max;
            let mut gained = 0;
            for pred in &predecessors {
                if !workflow.value(pred.source)?.is_build_dependency() {
                    gained += 1;
                }
            }
            if gained > max {
                log::debug!("Not bypassing {}: {} would exceed {} arguments", node, successor, max);
                replace = false;
            }
        }

        let mut heals = Vec::new();
        let mut replaced = HashSet::new();
        if replace {
            for pred in &predecessors {
                for successor in &successors {
                    if self.workspace.workflow.has_edge(pred.source, successor.target)? {
                        continue;
                    }
                    let edge = if simple_predecessor {
                        *successor
                    } else {
                        self.workspace
                            .workflow
                            .new_edge(successor.target, pred.edge.label)
                    };
                    replaced.insert(successor.id);
                    heals.push(Heal {
                        source: pred.source,
                        position: pred.position,
                        edge,
                    });
                }
            }
            heals.reverse();
        }

        let workflow = &self.workspace.workflow;
        let mut siblings = Vec::new();
        for successor in successors.iter().filter(|edge| !replaced.contains(&edge.id)) {
            for sibling in workflow.predecessor_edges(successor.target)? {
                if sibling.source != node && sibling.edge.label > successor.label {
                    siblings.push(sibling.edge.id);
                }
            }
        }
        log::debug!(
            "Deleting {} ({} bypass edges, {} shifted arguments)",
            node,
            heals.len(),
            siblings.len()
        );

        let mut edit = Edit::new();
        let applied = heals.clone();
        let shifted = siblings.clone();
        edit.apply.push(move |workspace: &mut Workspace<V>| {
            for heal in &applied {
                if simple_predecessor {
                    workspace
                        .workflow
                        .insert_edge(heal.source, heal.position, heal.edge)?;
                } else {
                    workspace
                        .workflow
                        .set_edge(heal.source, heal.position, heal.edge)?;
                }
            }
            workspace.workflow.remove(node)?;
            remove_workflow_input(&mut workspace.workflow, node)?;
            for sibling in &shifted {
                workspace.workflow.update_label(*sibling, |label| {
                    label.index = label.index.saturating_sub(1)
                })?;
            }
            Ok(())
        });

        edit.revert.push(move |workspace: &mut Workspace<V>| {
            match index {
                Some(index) => workspace.workflow.insert(index, node)?,
                None => workspace.workflow.add(node)?,
            }
            add_workflow_input(&mut workspace.workflow, node)?;
            for pred in &predecessors {
                workspace
                    .workflow
                    .insert_edge(pred.source, pred.position, pred.edge)?;
            }
            for sibling in &siblings {
                workspace
                    .workflow
                    .update_label(*sibling, |label| label.index += 1)?;
            }
            for heal in &heals {
                workspace.workflow.remove_edge(heal.source, heal.edge.id)?;
            }
            Ok(())
        });
        self.record_edit(edit)
    }

    /// Move nodes next to `target`.
    ///
    /// The nodes are deleted, bypassing them where possible, and a structural
    /// copy is inserted relative to `target` as [`Self::insert_node`] would.
    /// Build dependencies feeding the moved nodes follow them. Returns the
    /// moved copies, which become the selection.
    pub fn move_nodes(
        &mut self,
        nodes: &[NodeId],
        target: NodeId,
        mode: InsertMode,
        branch: bool,
    ) -> Result<Vec<NodeId>> {
        let nodes = self.sort_selection(nodes)?;
        if nodes.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }
        self.index_of(target)?;
        if nodes.contains(&target) {
            return Err(ValidationError::InvalidMoveTarget(target).into());
        }

        let moved: HashSet<NodeId> = nodes.iter().copied().collect();
        let mut dependencies = Vec::new();
        for (position, &node) in nodes.iter().enumerate() {
            for pred in self.workspace.workflow.predecessor_edges(node)? {
                if moved.contains(&pred.source)
                    || !self.workspace.workflow.value(pred.source)?.is_build_dependency()
                {
                    continue;
                }
                if pred.source == target {
                    return Err(ValidationError::InvalidMoveTarget(target).into());
                }
                if self.workspace.workflow.is_reachable(target, pred.source)? {
                    return Err(ValidationError::Cycle {
                        from: pred.source,
                        to: node,
                    }
                    .into());
                }
                dependencies.push((position, pred));
            }
        }
        dependencies.sort_by_key(|(_, pred)| pred.position);

        self.transaction("move nodes", nodes.clone(), move |editor| {
            let fragment = editor.workspace.workflow.extract(&nodes)?;
            let clones = editor.workspace.workflow.instantiate(&fragment)?;

            // captured while the dependencies are still attached
            let reorder = editor.reversible_sort();
            editor.record(Script::new(), reorder.revert)?;

            let detached: Vec<_> = dependencies.iter().map(|(_, pred)| *pred).collect();
            let mut detach = Script::new();
            let removed = detached.clone();
            detach.push(move |workspace: &mut Workspace<V>| {
                for pred in &removed {
                    workspace.workflow.remove_edge(pred.source, pred.edge.id)?;
                }
                Ok(())
            });
            let mut reattach_detached = Script::new();
            reattach_detached.push(move |workspace: &mut Workspace<V>| {
                for pred in &detached {
                    workspace
                        .workflow
                        .insert_edge(pred.source, pred.position, pred.edge)?;
                }
                Ok(())
            });
            editor.record(detach, reattach_detached)?;

            for &node in &nodes {
                editor.delete_node(node, true, None)?;
            }
            editor.record(reorder.apply, Script::new())?;

            let mut follow = Edit::new();
            let mut reattached = Vec::with_capacity(dependencies.len());
            for (position, pred) in &dependencies {
                let edge = editor
                    .workspace
                    .workflow
                    .new_edge(clones[*position], pred.edge.label);
                reattached.push((pred.source, edge));
            }
            let added = reattached.clone();
            follow.apply.push(move |workspace: &mut Workspace<V>| {
                for (source, edge) in &added {
                    workspace.workflow.add_edge(*source, *edge)?;
                }
                Ok(())
            });
            follow.revert.push(move |workspace: &mut Workspace<V>| {
                for (source, edge) in &reattached {
                    workspace.workflow.remove_edge(*source, edge.id)?;
                }
                Ok(())
            });

            let entry = fragment.sources().first().map(|index| &fragment.nodes[*index]);
            let index = editor.insert_index(entry, Some(target), mode, branch)?;
            let source = fragment.sources().first().map(|index| clones[*index]);
            let sink = fragment.sinks().first().map(|index| clones[*index]);
            editor.insert_elements_at(index, &clones, source, sink, &[target], mode, branch, follow)?;
            log::debug!("Moved {} nodes next to {}", clones.len(), target);
            Ok((clones.clone(), clones))
        })
    }
}
