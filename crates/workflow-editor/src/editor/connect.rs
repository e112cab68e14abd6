//! Connecting and disconnecting nodes

use std::collections::HashSet;

use workflow_graph::{EdgeLabel, NodeId};

use super::{
    argument_sources, find_next_index, last_index_of_component, sorted_argument_indices, Edit,
    WorkflowEditor, Workspace,
};
use crate::error::{Result, ValidationError};
use crate::operator::NodeCapabilities;
use crate::view::GraphView;

impl<V: GraphView + 'static> WorkflowEditor<V> {
    /// Connect every source to `target`.
    ///
    /// New edges take the free argument slots of `target` in ascending order.
    /// Rejected with a [`ValidationError`] on self-loops, duplicate edges,
    /// cycles, or when `target` runs out of argument slots; build
    /// dependencies never count against the slot limit.
    pub fn connect(&mut self, sources: &[NodeId], target: NodeId) -> Result<()> {
        let sources = dedup(sources);
        self.check_connect(&sources, target)?;
        self.transaction("connect", sources.clone(), move |editor| {
            editor.connect_internal(&sources, target)?;
            Ok(((), vec![target]))
        })
    }

    /// Connect without validation, skipping sources already wired to `target`
    pub(super) fn connect_unchecked(&mut self, sources: &[NodeId], target: NodeId) -> Result<()> {
        let mut pending = Vec::new();
        for source in dedup(sources) {
            if !self.workspace.workflow.has_edge(source, target)? {
                pending.push(source);
            }
        }
        if pending.is_empty() {
            return Ok(());
        }
        self.connect_internal(&pending, target)
    }

    fn check_connect(&self, sources: &[NodeId], target: NodeId) -> Result<()> {
        let workflow = &self.workspace.workflow;
        self.index_of(target)?;
        let max = workflow.value(target)?.argument_range().max;
        let mut count = argument_sources(workflow, target)?.len();
        for &source in sources {
            self.index_of(source)?;
            if source == target {
                return Err(ValidationError::SelfLoop(source).into());
            }
            if workflow.has_edge(source, target)? {
                return Err(ValidationError::DuplicateEdge {
                    from: source,
                    to: target,
                }
                .into());
            }
            let build_dependency = workflow.value(source)?.is_build_dependency();
            if count >= max && !build_dependency {
                return Err(ValidationError::ArgumentRangeOverflow { target, max }.into());
            }
            count += 1;
            if workflow.is_reachable(target, source)? {
                return Err(ValidationError::Cycle {
                    from: source,
                    to: target,
                }
                .into());
            }
        }
        Ok(())
    }

    fn connect_internal(&mut self, sources: &[NodeId], target: NodeId) -> Result<()> {
        let indices = sorted_argument_indices(&self.workspace.workflow, target)?;
        let target_index = self.index_of(target)?;

        let mut edges = Vec::with_capacity(sources.len());
        let mut sinks = Vec::new();
        let (mut index, mut offset) = (0, 0);
        for &source in sources {
            if self.workspace.workflow.successors(source)?.is_empty() {
                sinks.push(source);
            }
            find_next_index(&mut index, &mut offset, &indices);
            let edge = self
                .workspace
                .workflow
                .new_edge(target, EdgeLabel::new(index));
            edges.push((source, edge));
            index += 1;
        }
        log::debug!("Connecting {} sources to {}", sources.len(), target);

        let reorder = if sinks.is_empty() {
            Self::simple_sort()
        } else {
            self.reversible_sort()
        };

        let mut edit = Edit::new();
        let added = edges.clone();
        edit.apply.push(move |workspace: &mut Workspace<V>| {
            for (source, edge) in &added {
                workspace.workflow.add_edge(*source, *edge)?;
            }
            Ok(())
        });
        if !sinks.is_empty() {
            edit.apply.push(move |workspace: &mut Workspace<V>| {
                workspace.workflow.insert_range(target_index, &sinks)
            });
        }
        edit.apply.append(reorder.apply);

        edit.revert.push(move |workspace: &mut Workspace<V>| {
            for (source, edge) in &edges {
                workspace.workflow.remove_edge(*source, edge.id)?;
            }
            Ok(())
        });
        edit.revert.append(reorder.revert);
        self.record_edit(edit)
    }

    /// Remove the edges from each source to `target`.
    ///
    /// Sources with no edge to `target` are skipped. Argument slots above a
    /// removed edge shift down so the target's arguments stay contiguous.
    pub fn disconnect(&mut self, sources: &[NodeId], target: NodeId) -> Result<()> {
        let sources = dedup(sources);
        self.index_of(target)?;
        self.transaction("disconnect", vec![target], move |editor| {
            editor.disconnect_internal(&sources, target)?;
            Ok(((), sources))
        })
    }

    fn disconnect_internal(&mut self, sources: &[NodeId], target: NodeId) -> Result<()> {
        let workflow = &self.workspace.workflow;
        let predecessors = workflow.predecessor_edges(target)?;
        let detached: Vec<_> = sources
            .iter()
            .filter_map(|source| predecessors.iter().find(|pred| pred.source == *source))
            .copied()
            .collect();
        if detached.is_empty() {
            return Ok(());
        }

        // slots above a removed edge shift down once per removal below them
        let mut removed = Vec::with_capacity(detached.len());
        let mut sinks = Vec::new();
        for pred in &detached {
            if workflow.successors(pred.source)?.len() == 1 {
                sinks.push(pred.source);
            }
            let siblings: Vec<_> = predecessors
                .iter()
                .filter(|sibling| sibling.edge.label > pred.edge.label)
                .filter(|sibling| !detached.iter().any(|other| other.edge.id == sibling.edge.id))
                .map(|sibling| sibling.edge.id)
                .collect();
            removed.push((*pred, siblings));
        }

        let component = workflow.component_of(target)?;
        let sink_index = last_index_of_component(workflow, &component) + 1;
        let reorder = if sinks.is_empty() {
            Self::simple_sort()
        } else {
            self.reversible_sort()
        };
        log::debug!("Disconnecting {} sources from {}", removed.len(), target);

        let mut edit = Edit::new();
        let applied = removed.clone();
        edit.apply.push(move |workspace: &mut Workspace<V>| {
            for (pred, siblings) in &applied {
                workspace.workflow.remove_edge(pred.source, pred.edge.id)?;
                for sibling in siblings {
                    workspace.workflow.update_label(*sibling, |label| {
                        label.index = label.index.saturating_sub(1)
                    })?;
                }
            }
            Ok(())
        });
        if !sinks.is_empty() {
            edit.apply.push(move |workspace: &mut Workspace<V>| {
                workspace.workflow.insert_range(sink_index, &sinks)
            });
        }
        edit.apply.append(reorder.apply);

        edit.revert.push(move |workspace: &mut Workspace<V>| {
            for (pred, siblings) in removed.iter().rev() {
                workspace
                    .workflow
                    .insert_edge(pred.source, pred.position, pred.edge)?;
                for sibling in siblings {
                    workspace
                        .workflow
                        .update_label(*sibling, |label| label.index += 1)?;
                }
            }
            Ok(())
        });
        edit.revert.append(reorder.revert);
        self.record_edit(edit)
    }

    /// Whether a drag of `sources` onto `target` would be accepted.
    ///
    /// With `branch` the drag reorders, with `shift` it disconnects,
    /// otherwise it connects.
    pub fn validate_connection(
        &self,
        branch: bool,
        shift: bool,
        sources: &[NodeId],
        target: NodeId,
    ) -> bool {
        if branch {
            self.can_reorder(sources, target)
        } else if shift {
            self.can_disconnect(sources, target)
        } else {
            self.can_connect(sources, target)
        }
    }

    pub fn can_connect(&self, sources: &[NodeId], target: NodeId) -> bool {
        self.check_connect(&dedup(sources), target).is_ok()
    }

    /// Whether every source has an edge to `target`
    pub fn can_disconnect(&self, sources: &[NodeId], target: NodeId) -> bool {
        let workflow = &self.workspace.workflow;
        workflow.contains(target)
            && sources.iter().all(|&source| {
                workflow.contains(source) && workflow.has_edge(source, target).unwrap_or(false)
            })
    }
}

/// Sources without repeats, in first-seen order
fn dedup(nodes: &[NodeId]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    nodes
        .iter()
        .copied()
        .filter(|node| seen.insert(*node))
        .collect()
}
