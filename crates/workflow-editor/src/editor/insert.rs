//! Node creation, fragment insertion and payload replacement

use workflow_graph::{EdgeLabel, GraphDescriptor, GraphStore, NodeId};

use super::{
    add_workflow_input, argument_sources, find_next_index, remove_workflow_input,
    sorted_argument_indices, Edit, InsertMode, WorkflowEditor, Workspace,
};
use crate::error::{Result, ValidationError};
use crate::operator::{NodeCapabilities, Operator};
use crate::view::GraphView;

impl<V: GraphView + 'static> WorkflowEditor<V> {
    /// Insert a new node relative to `targets`.
    ///
    /// In successor mode the node consumes the outputs of every target; without
    /// `branch` it also inherits the existing outgoing edges of the first
    /// target. In predecessor mode the node feeds every target; without
    /// `branch` it takes over the existing arguments of the first target.
    /// Returns the new node, which becomes the selection.
    pub fn insert_node(
        &mut self,
        payload: Operator,
        targets: &[NodeId],
        mode: InsertMode,
        branch: bool,
    ) -> Result<NodeId> {
        let targets = targets.to_vec();
        self.transaction("insert node", targets.clone(), move |editor| {
            let node = editor.create_node(payload, &targets, mode, branch, true, None)?;
            Ok((node, vec![node]))
        })
    }

    pub(super) fn create_node(
        &mut self,
        mut payload: Operator,
        targets: &[NodeId],
        mut mode: InsertMode,
        branch: bool,
        validate: bool,
        index: Option<usize>,
    ) -> Result<NodeId> {
        for &target in targets {
            if !self.workspace.workflow.contains(target) {
                return Err(workflow_graph::GraphError::NotInGraph(target).into());
            }
        }

        if validate && payload.is_input_marker() {
            let count = self
                .workspace
                .workflow
                .nodes()
                .iter()
                .filter_map(|node| self.workspace.workflow.value(*node).ok())
                .filter(|value| value.input_index().is_some())
                .count();
            payload.set_input_index(count);
        }
        if !targets.is_empty() && payload.is_annotation() {
            mode = InsertMode::Predecessor;
        }

        let index = match index {
            Some(index) => index,
            None => self.insert_index(Some(&payload), self.cursor(), mode, branch)?,
        };

        if validate {
            self.configure_group(&mut payload, targets, mode)?;
            self.validate_insert_chain(targets, mode, branch)?;
        }

        let annotated_target = targets.iter().any(|target| {
            self.workspace
                .workflow
                .value(*target)
                .map_or(false, |value| value.is_annotation())
        });
        let validate_insert = validate
            && !(mode == InsertMode::Predecessor
                && payload.is_build_dependency()
                && !annotated_target);

        let single_cursor_target = targets.len() == 1 && Some(targets[0]) == self.cursor();
        let reorder = if mode == InsertMode::Predecessor || targets.is_empty() || single_cursor_target
        {
            Self::simple_sort()
        } else {
            self.reversible_sort()
        };

        log::debug!(
            "Inserting {} at {} as {:?} of {} targets",
            payload.name(),
            index,
            mode,
            targets.len()
        );
        let node = self.workspace.workflow.allocate(payload);
        let connection = self.insert_commands(node, node, targets, mode, branch, validate_insert)?;

        let mut edit = Edit::new();
        edit.apply.push(move |workspace: &mut Workspace<V>| {
            workspace.workflow.insert(index, node)?;
            add_workflow_input(&mut workspace.workflow, node)
        });
        edit.apply.append(connection.apply);
        edit.apply.append(reorder.apply);

        edit.revert.append(connection.revert);
        edit.revert.push(move |workspace: &mut Workspace<V>| {
            workspace.workflow.remove(node)?;
            remove_workflow_input(&mut workspace.workflow, node)
        });
        edit.revert.append(reorder.revert);

        self.record_edit(edit)?;
        Ok(node)
    }

    /// Give an empty group one input per expected argument, plus a pass-through
    /// output when there is exactly one.
    fn configure_group(
        &self,
        payload: &mut Operator,
        targets: &[NodeId],
        mode: InsertMode,
    ) -> Result<()> {
        let Operator::Group(group) = payload else {
            return Ok(());
        };
        if !group.workflow.is_empty() {
            return Ok(());
        }

        let workflow = &self.workspace.workflow;
        let mut input_count = 0;
        for &target in targets {
            match mode {
                InsertMode::Successor => {
                    if !workflow.value(target)?.is_build_dependency() {
                        input_count += 1;
                    }
                }
                InsertMode::Predecessor => {
                    for pred in workflow.predecessor_edges(target)? {
                        if !workflow.value(pred.source)?.is_build_dependency() {
                            input_count += 1;
                        }
                    }
                }
            }
        }

        let mut nested = GraphDescriptor::default();
        for index in 0..input_count {
            nested.nodes.push(Operator::WorkflowInput { index });
        }
        if input_count == 1 {
            nested.nodes.push(Operator::WorkflowOutput);
            nested.edges.push(workflow_graph::EdgeDescriptor {
                from: 0,
                to: 1,
                label: EdgeLabel::new(0),
            });
        }
        group.workflow = nested;
        Ok(())
    }

    /// Non-branching insertion may not target several nodes of one chain
    fn validate_insert_chain(
        &self,
        targets: &[NodeId],
        mode: InsertMode,
        branch: bool,
    ) -> Result<()> {
        if branch || targets.len() < 2 {
            return Ok(());
        }
        let workflow = &self.workspace.workflow;
        let first = targets[0];
        for &other in &targets[1..] {
            let chained = match mode {
                InsertMode::Successor => workflow.is_reachable(first, other)?,
                InsertMode::Predecessor => workflow.is_reachable(other, first)?,
            };
            if chained {
                return Err(ValidationError::InvalidInsertChain.into());
            }
        }
        Ok(())
    }

    /// Edge edits wiring a fragment, entered at `source` and left at `sink`,
    /// to the insertion targets.
    pub(super) fn insert_commands(
        &mut self,
        source: NodeId,
        sink: NodeId,
        targets: &[NodeId],
        mode: InsertMode,
        branch: bool,
        validate: bool,
    ) -> Result<Edit<V>> {
        match mode {
            InsertMode::Predecessor => {
                self.insert_predecessor_commands(source, sink, targets, branch, validate)
            }
            InsertMode::Successor => {
                self.insert_successor_commands(source, sink, targets, branch, validate)
            }
        }
    }

    fn insert_predecessor_commands(
        &mut self,
        source: NodeId,
        sink: NodeId,
        targets: &[NodeId],
        branch: bool,
        validate: bool,
    ) -> Result<Edit<V>> {
        let (source_max, source_build) = {
            let value = self.workspace.workflow.value(source)?;
            (value.argument_range().max, value.is_build_dependency())
        };

        let mut edit = Edit::new();
        for (i, &target) in targets.iter().enumerate() {
            let target_max = self.workspace.workflow.value(target)?.argument_range().max;
            if validate && target_max == 0 {
                continue;
            }

            let workflow = &self.workspace.workflow;
            let predecessors = workflow.predecessor_edges(target)?;
            if i > 0 || branch || source_max == 0 {
                if validate
                    && !source_build
                    && argument_sources(workflow, target)?.len() >= target_max
                {
                    return Err(ValidationError::ArgumentRangeOverflow {
                        target,
                        max: target_max,
                    }
                    .into());
                }
                let indices = sorted_argument_indices(workflow, target)?;
                let (mut index, mut offset) = (0, 0);
                find_next_index(&mut index, &mut offset, &indices);
                let edge = self
                    .workspace
                    .workflow
                    .new_edge(target, EdgeLabel::new(index));
                edit.apply.push(move |workspace: &mut Workspace<V>| {
                    workspace.workflow.add_edge(sink, edge)
                });
                edit.revert.push(move |workspace: &mut Workspace<V>| {
                    workspace.workflow.remove_edge(sink, edge.id).map(|_| ())
                });
                continue;
            }

            // take over the arguments of the first target
            let mut rerouted = Vec::new();
            let mut remaining = Vec::new();
            for pred in predecessors {
                if workflow.value(pred.source)?.is_build_dependency() {
                    remaining.push(pred);
                } else {
                    rerouted.push(pred);
                }
            }
            if validate && rerouted.len() > source_max {
                return Err(ValidationError::ArgumentRangeOverflow {
                    target: source,
                    max: source_max,
                }
                .into());
            }
            rerouted.sort_by_key(|pred| pred.edge.label);
            remaining.sort_by_key(|pred| pred.edge.label);

            // the new edge takes the lowest rerouted slot, the build
            // dependencies left on the target are compacted around it
            let taken = match rerouted.first() {
                Some(pred) => pred.edge.label.index,
                None => {
                    let indices = sorted_argument_indices(workflow, target)?;
                    let (mut index, mut offset) = (0, 0);
                    find_next_index(&mut index, &mut offset, &indices);
                    index
                }
            };
            let mut slots: Vec<(usize, Option<usize>)> = remaining
                .iter()
                .enumerate()
                .map(|(position, pred)| (pred.edge.label.index, Some(position)))
                .collect();
            slots.push((taken, None));
            slots.sort();

            let mut target_label = 0;
            for (rank, (_, slot)) in slots.iter().enumerate() {
                match slot {
                    None => target_label = rank,
                    Some(position) => {
                        let pred = remaining[*position];
                        let previous = pred.edge.label.index;
                        if previous != rank {
                            let edge = pred.edge.id;
                            edit.apply.push(move |workspace: &mut Workspace<V>| {
                                workspace
                                    .workflow
                                    .update_label(edge, |label| label.index = rank)
                            });
                            edit.revert.push(move |workspace: &mut Workspace<V>| {
                                workspace
                                    .workflow
                                    .update_label(edge, |label| label.index = previous)
                            });
                        }
                    }
                }
            }

            for (rank, pred) in rerouted.into_iter().enumerate() {
                let replacement = self
                    .workspace
                    .workflow
                    .new_edge(source, EdgeLabel::new(rank));
                edit.apply.push(move |workspace: &mut Workspace<V>| {
                    workspace
                        .workflow
                        .set_edge(pred.source, pred.position, replacement)
                        .map(|_| ())
                });
                edit.revert.push(move |workspace: &mut Workspace<V>| {
                    workspace
                        .workflow
                        .set_edge(pred.source, pred.position, pred.edge)
                        .map(|_| ())
                });
            }

            let edge = self
                .workspace
                .workflow
                .new_edge(target, EdgeLabel::new(target_label));
            edit.apply.push(move |workspace: &mut Workspace<V>| {
                workspace.workflow.add_edge(sink, edge)
            });
            edit.revert.push(move |workspace: &mut Workspace<V>| {
                workspace.workflow.remove_edge(sink, edge.id).map(|_| ())
            });
        }
        Ok(edit)
    }

    fn insert_successor_commands(
        &mut self,
        source: NodeId,
        sink: NodeId,
        targets: &[NodeId],
        branch: bool,
        validate: bool,
    ) -> Result<Edit<V>> {
        let workflow = &self.workspace.workflow;
        let source_max = workflow.value(source)?.argument_range().max;
        let mut arguments = 0;
        for &target in targets {
            if !workflow.value(target)?.is_build_dependency() {
                arguments += 1;
            }
        }

        let mut edit = Edit::new();
        if validate && source_max == 0 && arguments > 0 {
            return Ok(edit);
        }
        if validate && arguments > source_max {
            return Err(ValidationError::ArgumentRangeOverflow {
                target: source,
                max: source_max,
            }
            .into());
        }

        for (index, &target) in targets.iter().enumerate() {
            let edge = self
                .workspace
                .workflow
                .new_edge(source, EdgeLabel::new(index));
            let inherited = self.workspace.workflow.successors(target)?.to_vec();
            if index == 0 && !branch && !inherited.is_empty() {
                let moved = inherited.clone();
                edit.apply.push(move |workspace: &mut Workspace<V>| {
                    for successor in &moved {
                        workspace.workflow.remove_edge(target, successor.id)?;
                        workspace.workflow.add_edge(sink, *successor)?;
                    }
                    workspace.workflow.add_edge(target, edge)
                });
                edit.revert.push(move |workspace: &mut Workspace<V>| {
                    for successor in &inherited {
                        workspace.workflow.remove_edge(sink, successor.id)?;
                        workspace.workflow.add_edge(target, *successor)?;
                    }
                    workspace.workflow.remove_edge(target, edge.id).map(|_| ())
                });
            } else {
                edit.apply.push(move |workspace: &mut Workspace<V>| {
                    workspace.workflow.add_edge(target, edge)
                });
                edit.revert.push(move |workspace: &mut Workspace<V>| {
                    workspace.workflow.remove_edge(target, edge.id).map(|_| ())
                });
            }
        }
        Ok(edit)
    }

    /// Insert a subgraph next to the current selection.
    ///
    /// The fragment's first source and first sink are wired to the selected
    /// nodes as a single node would be. Returns the inserted nodes in
    /// fragment order; the fragment's first sink becomes the selection.
    pub fn insert_elements(
        &mut self,
        fragment: &GraphDescriptor<Operator>,
        mode: InsertMode,
        branch: bool,
    ) -> Result<Vec<NodeId>> {
        if fragment.is_empty() {
            return Ok(Vec::new());
        }
        fragment.validate()?;

        let targets = self.selection();
        let entry = fragment.sources().first().map(|index| &fragment.nodes[*index]);
        let index = self.insert_index(entry, self.cursor(), mode, branch)?;
        self.transaction("insert elements", targets.clone(), move |editor| {
            let nodes = editor.workspace.workflow.instantiate(fragment)?;
            let source = fragment.sources().first().map(|index| nodes[*index]);
            let sink = fragment.sinks().first().map(|index| nodes[*index]);
            editor.insert_elements_at(index, &nodes, source, sink, &targets, mode, branch, Edit::new())?;
            Ok((nodes, sink.into_iter().collect()))
        })
    }

    /// Insert detached nodes at `index` and wire them to `targets`.
    ///
    /// `extra` runs after the fragment is wired and is reverted before it is
    /// unwired.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn insert_elements_at(
        &mut self,
        index: usize,
        nodes: &[NodeId],
        source: Option<NodeId>,
        sink: Option<NodeId>,
        targets: &[NodeId],
        mode: InsertMode,
        branch: bool,
        extra: Edit<V>,
    ) -> Result<()> {
        let connection = match (source, sink) {
            (Some(source), Some(sink)) if !targets.is_empty() => {
                self.insert_commands(source, sink, targets, mode, branch, true)?
            }
            _ => Edit::new(),
        };
        let reorder = Self::simple_sort();

        let mut edit = Edit::new();
        let inserted = nodes.to_vec();
        edit.apply.push(move |workspace: &mut Workspace<V>| {
            workspace.workflow.insert_range(index, &inserted)?;
            for node in &inserted {
                add_workflow_input(&mut workspace.workflow, *node)?;
            }
            Ok(())
        });
        edit.apply.append(connection.apply);
        edit.apply.append(extra.apply);
        edit.apply.append(reorder.apply);

        let removed = nodes.to_vec();
        edit.revert.append(extra.revert);
        edit.revert.append(connection.revert);
        edit.revert.push(move |workspace: &mut Workspace<V>| {
            for node in removed.iter().rev() {
                remove_workflow_input(&mut workspace.workflow, *node)?;
            }
            workspace.workflow.remove_range(&removed).map(|_| ())
        });
        edit.revert.append(reorder.revert);

        self.record_edit(edit)
    }

    /// Encode the selected nodes and the edges among them
    pub fn copy_selection(&self, store: &impl GraphStore<Operator>) -> Result<Vec<u8>> {
        let selection = self.sort_selection(&self.selection())?;
        let descriptor = self.workspace.workflow.extract(&selection)?;
        log::debug!("Copied {} nodes", descriptor.nodes.len());
        Ok(store.serialize(&descriptor)?)
    }

    /// Decode a fragment and insert it next to the current selection
    pub fn paste(
        &mut self,
        store: &impl GraphStore<Operator>,
        blob: &[u8],
        mode: InsertMode,
        branch: bool,
    ) -> Result<Vec<NodeId>> {
        let fragment = store.deserialize(blob)?;
        self.insert_elements(&fragment, mode, branch)
    }

    /// Swap the payload of `node`, keeping its position and wiring
    pub fn replace_node(&mut self, node: NodeId, payload: Operator) -> Result<NodeId> {
        self.transaction("replace node", vec![node], move |editor| {
            let replacement = editor.replace_internal(node, payload)?;
            Ok((replacement, vec![replacement]))
        })
    }

    pub(super) fn replace_internal(&mut self, node: NodeId, payload: Operator) -> Result<NodeId> {
        let index = self.index_of(node)?;
        let replacement =
            self.create_node(payload, &[node], InsertMode::Successor, false, false, Some(index))?;
        self.delete_node(node, true, Some(index))?;
        Ok(replacement)
    }

    /// Switch nodes off. Disabled nodes keep their wiring but stop counting
    /// as arguments.
    pub fn disable_nodes(&mut self, nodes: &[NodeId]) -> Result<Vec<NodeId>> {
        self.update_nodes("disable nodes", nodes, |value| {
            (!value.is_disabled()).then(|| value.clone().disable())
        })
    }

    /// Switch disabled nodes back on
    pub fn enable_nodes(&mut self, nodes: &[NodeId]) -> Result<Vec<NodeId>> {
        self.update_nodes("enable nodes", nodes, |value| match value {
            Operator::Disabled { operator } => Some(operator.as_ref().clone()),
            _ => None,
        })
    }

    fn update_nodes(
        &mut self,
        operation: &str,
        nodes: &[NodeId],
        update: impl Fn(&Operator) -> Option<Operator>,
    ) -> Result<Vec<NodeId>> {
        let nodes = self.sort_selection(nodes)?;
        self.transaction(operation, nodes.clone(), move |editor| {
            let mut selection = Vec::with_capacity(nodes.len());
            for node in nodes {
                let payload = update(editor.workspace.workflow.value(node)?);
                match payload {
                    Some(payload) => selection.push(editor.replace_internal(node, payload)?),
                    None => selection.push(node),
                }
            }
            Ok((selection.clone(), selection))
        })
    }
}
