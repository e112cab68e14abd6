//! Grouping nodes into nested workflows and expanding groups in place

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use workflow_graph::{
    Edge, EdgeDescriptor, EdgeId, EdgeLabel, GraphDescriptor, NodeId, PredecessorEdge,
    WorkflowGraph,
};

use super::{last_index_of_component, Edit, InsertMode, Script, WorkflowEditor, Workspace};
use crate::error::{Result, ValidationError};
use crate::operator::{GroupOperator, NodeCapabilities, Operator};
use crate::view::GraphView;

/// Everything needed to replace a selection with a group node
struct GroupPlan {
    payload: Operator,
    /// External predecessors, one per group input
    predecessors: Vec<NodeId>,
    /// Build dependency edges into the selection, by source position
    dependencies: Vec<PredecessorEdge>,
    /// External successors with the lowest argument slot the selection fed
    successors: Vec<(NodeId, usize)>,
    /// Selected sink kept alive until the group takes over its wiring
    replacement: Option<NodeId>,
    insert_before: Option<NodeId>,
}

/// Edge edit made while wiring a new group
#[derive(Debug, Clone, Copy)]
enum GroupLink {
    Relabeled { edge: EdgeId, previous: EdgeLabel },
    Added { source: NodeId, edge: EdgeId },
    Shifted { edge: EdgeId },
}

/// A group's nested workflow split into terminals and body
struct Expansion {
    body: GraphDescriptor<Operator>,
    /// Body position of each nested node; `None` for terminals
    body_index: Vec<Option<usize>>,
    /// Input markers in argument order
    inputs: Vec<usize>,
    main_sink: Option<usize>,
    edges: Vec<EdgeDescriptor>,
}

impl Expansion {
    fn new(nested: &GraphDescriptor<Operator>) -> Self {
        let mut body = GraphDescriptor::default();
        let mut body_index = Vec::with_capacity(nested.nodes.len());
        let mut inputs = Vec::new();
        let mut main_sink = None;
        for (index, value) in nested.nodes.iter().enumerate() {
            if value.is_input_marker() {
                inputs.push(index);
                body_index.push(None);
            } else if value.is_output_marker() {
                main_sink.get_or_insert(index);
                body_index.push(None);
            } else {
                body_index.push(Some(body.nodes.len()));
                body.nodes.push(value.clone());
            }
        }
        inputs.sort_by_key(|index| nested.nodes[*index].input_index());

        for edge in &nested.edges {
            let from = body_index.get(edge.from).copied().flatten();
            let to = body_index.get(edge.to).copied().flatten();
            if let (Some(from), Some(to)) = (from, to) {
                body.edges.push(EdgeDescriptor {
                    from,
                    to,
                    label: edge.label,
                });
            }
        }

        Self {
            body,
            body_index,
            inputs,
            main_sink,
            edges: nested.edges.clone(),
        }
    }

    fn body_node(&self, index: usize, clones: &[NodeId]) -> Option<NodeId> {
        self.body_index
            .get(index)
            .copied()
            .flatten()
            .and_then(|index| clones.get(index).copied())
    }
}

/// An edge added while expanding a group.
///
/// Shifting edges open their slot by moving every sibling at or above it
/// up by one.
#[derive(Debug, Clone, Copy)]
struct Wire {
    source: NodeId,
    edge: Edge,
    shift: bool,
}

impl<V: GraphView + 'static> WorkflowEditor<V> {
    /// Replace the selected nodes with a single group node.
    ///
    /// Each external predecessor feeds the group through its own workflow
    /// input, ordered by layout position; build dependencies included. A
    /// single selected sink gets a workflow output, and the group inherits
    /// its outgoing edges. Returns the group node, which becomes the
    /// selection.
    pub fn group_nodes(&mut self, nodes: &[NodeId]) -> Result<NodeId> {
        let selection = self.sort_selection(nodes)?;
        if selection.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }
        self.check_group(&selection)?;
        let plan = self.plan_group(&selection)?;
        self.transaction("group nodes", selection.clone(), move |editor| {
            let group = editor.group_internal(&selection, plan)?;
            Ok((group, vec![group]))
        })
    }

    /// Whether the nodes form a selection [`Self::group_nodes`] accepts
    pub fn can_group(&self, nodes: &[NodeId]) -> bool {
        match self.sort_selection(nodes) {
            Ok(selection) => !selection.is_empty() && self.check_group(&selection).is_ok(),
            Err(_) => false,
        }
    }

    /// Every selected node reachable from a selected source must be
    /// reachable through selected nodes alone, and only a single selected
    /// sink may feed nodes outside the selection.
    fn check_group(&self, selection: &[NodeId]) -> Result<()> {
        let workflow = &self.workspace.workflow;
        let selected: HashSet<NodeId> = selection.iter().copied().collect();
        for &source in selection {
            if workflow
                .predecessors(source)?
                .iter()
                .any(|pred| selected.contains(pred))
            {
                continue;
            }

            let mut connected = HashSet::from([source]);
            let mut stack = vec![source];
            while let Some(node) = stack.pop() {
                for edge in workflow.successors(node)? {
                    if selected.contains(&edge.target) && connected.insert(edge.target) {
                        stack.push(edge.target);
                    }
                }
            }
            for node in workflow.depth_first_search(source)? {
                if selected.contains(&node) && !connected.contains(&node) {
                    return Err(ValidationError::BrokenBranch(node).into());
                }
            }
        }

        let mut sinks = Vec::new();
        let mut feeding = Vec::new();
        for &node in selection {
            let successors = workflow.successors(node)?;
            if !successors.iter().any(|edge| selected.contains(&edge.target)) {
                sinks.push(node);
            }
            if successors.iter().any(|edge| !selected.contains(&edge.target)) {
                feeding.push(node);
            }
        }
        match (&sinks[..], feeding.first()) {
            (_, None) => Ok(()),
            ([sink], Some(_)) => match feeding.iter().find(|node| *node != sink) {
                Some(&node) => Err(ValidationError::AmbiguousGroupOutput(node).into()),
                None => Ok(()),
            },
            (_, Some(&node)) => Err(ValidationError::AmbiguousGroupOutput(node).into()),
        }
    }

    fn plan_group(&self, selection: &[NodeId]) -> Result<GroupPlan> {
        let workflow = &self.workspace.workflow;
        let selected: HashSet<NodeId> = selection.iter().copied().collect();
        let positions: HashMap<NodeId, usize> = selection
            .iter()
            .enumerate()
            .map(|(index, node)| (*node, index))
            .collect();

        let mut predecessors = Vec::new();
        let mut input_edges = HashMap::new();
        let mut dependencies = Vec::new();
        for &node in workflow.nodes() {
            if selected.contains(&node) {
                continue;
            }
            if workflow.value(node)?.is_build_dependency() {
                dependencies.extend(
                    workflow
                        .successors(node)?
                        .iter()
                        .enumerate()
                        .filter(|(_, edge)| selected.contains(&edge.target))
                        .map(|(position, edge)| PredecessorEdge {
                            source: node,
                            edge: *edge,
                            position,
                        }),
                );
            }
            let edges: Vec<(usize, EdgeLabel)> = workflow
                .successors(node)?
                .iter()
                .filter_map(|edge| positions.get(&edge.target).map(|to| (*to, edge.label)))
                .collect();
            if !edges.is_empty() {
                predecessors.push(node);
                input_edges.insert(node, edges);
            }
        }
        let layout = &self.workspace.layout;
        predecessors.sort_by_key(|node| {
            let (layer, layer_index) = layout.position(*node).unwrap_or((0, usize::MAX));
            (Reverse(layer), layer_index)
        });

        let mut nested = workflow.extract(selection)?;
        for (index, pred) in predecessors.iter().enumerate() {
            let input = nested.nodes.len();
            nested.nodes.push(Operator::WorkflowInput { index });
            for &(to, label) in input_edges.get(pred).into_iter().flatten() {
                nested.edges.push(EdgeDescriptor {
                    from: input,
                    to,
                    label,
                });
            }
        }

        let mut successors: Vec<(NodeId, usize)> = Vec::new();
        for &node in selection {
            for edge in workflow.successors(node)? {
                if selected.contains(&edge.target) {
                    continue;
                }
                match successors.iter_mut().find(|(target, _)| *target == edge.target) {
                    Some((_, slot)) => *slot = (*slot).min(edge.label.index),
                    None => successors.push((edge.target, edge.label.index)),
                }
            }
        }

        let mut replacement = None;
        if let [sink] = nested.sinks()[..] {
            if !nested.nodes[sink].is_output_marker() {
                let output = nested.nodes.len();
                nested.nodes.push(Operator::WorkflowOutput);
                nested.edges.push(EdgeDescriptor {
                    from: sink,
                    to: output,
                    label: EdgeLabel::new(0),
                });
                if let Some(&node) = selection.get(sink) {
                    if !workflow.successors(node)?.is_empty() {
                        replacement = Some(node);
                    }
                }
            }
        }

        let mut sorted = WorkflowGraph::from_descriptor(&nested)?;
        sorted.sort_topologically()?;
        let nested = sorted.to_descriptor()?;

        let insert_before = match successors.first() {
            Some((target, _)) => Some(*target),
            None => {
                let mut last: Option<usize> = None;
                for component in workflow.connected_components()? {
                    if component.iter().any(|node| selected.contains(node)) {
                        let index = last_index_of_component(workflow, &component);
                        last = Some(last.map_or(index, |last| last.max(index)));
                    }
                }
                last.and_then(|index| workflow.node_at(index + 1))
                    .filter(|node| !selected.contains(node))
            }
        };

        log::debug!(
            "Grouping {} nodes with {} inputs and {} successors",
            selection.len(),
            predecessors.len(),
            successors.len()
        );
        Ok(GroupPlan {
            payload: Operator::Group(GroupOperator::new(
                self.config.default_group_name.clone(),
                nested,
            )),
            predecessors,
            dependencies,
            successors,
            replacement,
            insert_before,
        })
    }

    fn group_internal(&mut self, selection: &[NodeId], plan: GroupPlan) -> Result<NodeId> {
        let reorder = self.reversible_sort();
        self.record(Script::new(), reorder.revert)?;
        if !plan.dependencies.is_empty() {
            self.record(detach(plan.dependencies.clone()), reattach(plan.dependencies))?;
        }
        for &node in selection {
            if Some(node) != plan.replacement {
                self.delete_node(node, false, None)?;
            }
        }

        let workflow = &self.workspace.workflow;
        let index = plan
            .insert_before
            .and_then(|node| workflow.index_of(node))
            .unwrap_or(workflow.len());
        let (targets, mode) = match plan.replacement {
            Some(node) => (vec![node], InsertMode::Predecessor),
            None => (Vec::new(), InsertMode::Successor),
        };
        let group = self.create_node(plan.payload, &targets, mode, false, false, Some(index))?;

        let sink = plan.replacement.unwrap_or(group);
        self.record_edit(link_group(group, sink, plan.predecessors, plan.successors))?;
        if let Some(node) = plan.replacement {
            self.delete_node(node, true, None)?;
        }
        self.record(reorder.apply, Script::new())?;
        Ok(group)
    }

    /// Expand a group node into its nested workflow.
    ///
    /// The group's predecessors feed the nodes its inputs fed, in input
    /// order, and the nodes feeding its output take over the group's
    /// successors in the group's argument slots. Returns the expanded nodes,
    /// which become the selection.
    pub fn ungroup(&mut self, node: NodeId) -> Result<Vec<NodeId>> {
        self.index_of(node)?;
        let workflow = &self.workspace.workflow;
        let Some(group) = workflow.value(node)?.as_group() else {
            return Err(ValidationError::NotAGroup(node).into());
        };
        let expansion = Expansion::new(&group.workflow);
        let mut predecessors = workflow.predecessor_edges(node)?;
        predecessors.sort_by_key(|pred| pred.edge.label.index);
        let successors = workflow.successors(node)?.to_vec();
        log::debug!(
            "Ungrouping {} into {} nodes",
            node,
            expansion.body.nodes.len()
        );

        self.transaction("ungroup", vec![node], move |editor| {
            let reorder = editor.reversible_sort();
            editor.record(Script::new(), reorder.revert)?;
            let index = editor.index_of(node)?;
            editor.delete_node(node, false, Some(index))?;

            let clones = editor.workspace.workflow.instantiate(&expansion.body)?;
            let wires = editor.expansion_wires(&expansion, &clones, &predecessors, &successors)?;
            editor.insert_elements_at(
                index,
                &clones,
                None,
                None,
                &[],
                InsertMode::Successor,
                false,
                wire_edit(wires),
            )?;
            editor.record(reorder.apply, Script::new())?;
            Ok((clones.clone(), clones))
        })
    }

    /// Edges connecting an expanded body to the group's former neighbours
    fn expansion_wires(
        &mut self,
        expansion: &Expansion,
        clones: &[NodeId],
        predecessors: &[PredecessorEdge],
        successors: &[Edge],
    ) -> Result<Vec<Wire>> {
        let sources: HashMap<usize, NodeId> = expansion
            .inputs
            .iter()
            .zip(predecessors)
            .map(|(input, pred)| (*input, pred.source))
            .collect();

        let mut wires = Vec::new();
        for edge in &expansion.edges {
            let (Some(&source), Some(target)) = (
                sources.get(&edge.from),
                expansion.body_node(edge.to, clones),
            ) else {
                continue;
            };
            wires.push(Wire {
                source,
                edge: self.workspace.workflow.new_edge(target, edge.label),
                shift: false,
            });
        }

        let Some(main_sink) = expansion.main_sink else {
            return Ok(wires);
        };
        let mut feeding: Vec<&EdgeDescriptor> = expansion
            .edges
            .iter()
            .filter(|edge| edge.to == main_sink)
            .collect();
        feeding.sort_by_key(|edge| edge.label.index);
        let feeding: Vec<NodeId> = feeding
            .iter()
            .filter_map(|edge| {
                expansion
                    .body_node(edge.from, clones)
                    .or_else(|| sources.get(&edge.from).copied())
            })
            .collect();

        for successor in successors {
            let mut slot = successor.label.index;
            for &source in &feeding {
                let wired = wires
                    .iter()
                    .any(|wire| wire.source == source && wire.edge.target == successor.target);
                if wired || self.workspace.workflow.has_edge(source, successor.target)? {
                    continue;
                }
                wires.push(Wire {
                    source,
                    edge: self
                        .workspace
                        .workflow
                        .new_edge(successor.target, EdgeLabel::new(slot)),
                    shift: true,
                });
                slot += 1;
            }
        }
        Ok(wires)
    }
}

/// Connect the group's predecessors in input order and its sink to the
/// external successors the selection fed.
fn link_group<V: 'static>(
    group: NodeId,
    sink: NodeId,
    predecessors: Vec<NodeId>,
    successors: Vec<(NodeId, usize)>,
) -> Edit<V> {
    let links = Rc::new(RefCell::new(Vec::new()));
    let mut edit = Edit::new();

    let applied = Rc::clone(&links);
    edit.apply.push(move |workspace: &mut Workspace<V>| {
        let workflow = &mut workspace.workflow;
        let mut links = applied.borrow_mut();
        links.clear();
        for (index, &pred) in predecessors.iter().enumerate() {
            let existing = workflow
                .successors(pred)?
                .iter()
                .find(|edge| edge.target == group)
                .copied();
            match existing {
                Some(edge) if edge.label.index != index => {
                    links.push(GroupLink::Relabeled {
                        edge: edge.id,
                        previous: edge.label,
                    });
                    workflow.update_label(edge.id, |label| label.index = index)?;
                }
                Some(_) => {}
                None => {
                    let edge = workflow.connect(pred, group, EdgeLabel::new(index))?;
                    links.push(GroupLink::Added {
                        source: pred,
                        edge: edge.id,
                    });
                }
            }
        }
        for &(target, slot) in &successors {
            if workflow.has_edge(sink, target)? {
                continue;
            }
            for sibling in workflow.predecessor_edges(target)? {
                if sibling.edge.label.index >= slot {
                    workflow.update_label(sibling.edge.id, |label| label.index += 1)?;
                    links.push(GroupLink::Shifted {
                        edge: sibling.edge.id,
                    });
                }
            }
            let edge = workflow.connect(sink, target, EdgeLabel::new(slot))?;
            links.push(GroupLink::Added {
                source: sink,
                edge: edge.id,
            });
        }
        Ok(())
    });

    edit.revert.push(move |workspace: &mut Workspace<V>| {
        for link in links.borrow().iter().rev() {
            match *link {
                GroupLink::Relabeled { edge, previous } => {
                    workspace
                        .workflow
                        .update_label(edge, |label| *label = previous)?;
                }
                GroupLink::Added { source, edge } => {
                    workspace.workflow.remove_edge(source, edge)?;
                }
                GroupLink::Shifted { edge } => {
                    workspace.workflow.update_label(edge, |label| {
                        label.index = label.index.saturating_sub(1)
                    })?;
                }
            }
        }
        Ok(())
    });
    edit
}

/// Build dependency edges are detached before the selection is deleted and
/// reach the group through its inputs instead.
fn detach<V: 'static>(dependencies: Vec<PredecessorEdge>) -> Script<V> {
    let mut script = Script::new();
    script.push(move |workspace: &mut Workspace<V>| {
        for pred in &dependencies {
            workspace.workflow.remove_edge(pred.source, pred.edge.id)?;
        }
        Ok(())
    });
    script
}

fn reattach<V: 'static>(dependencies: Vec<PredecessorEdge>) -> Script<V> {
    let mut script = Script::new();
    script.push(move |workspace: &mut Workspace<V>| {
        for pred in &dependencies {
            workspace
                .workflow
                .insert_edge(pred.source, pred.position, pred.edge)?;
        }
        Ok(())
    });
    script
}

fn wire_edit<V: 'static>(wires: Vec<Wire>) -> Edit<V> {
    let mut edit = Edit::new();
    let applied = wires.clone();
    edit.apply.push(move |workspace: &mut Workspace<V>| {
        for wire in &applied {
            if wire.shift {
                for sibling in workspace.workflow.predecessor_edges(wire.edge.target)? {
                    if sibling.edge.label >= wire.edge.label {
                        workspace
                            .workflow
                            .update_label(sibling.edge.id, |label| label.index += 1)?;
                    }
                }
            }
            workspace.workflow.add_edge(wire.source, wire.edge)?;
        }
        Ok(())
    });
    edit.revert.push(move |workspace: &mut Workspace<V>| {
        for wire in wires.iter().rev() {
            workspace.workflow.remove_edge(wire.source, wire.edge.id)?;
            if wire.shift {
                for sibling in workspace.workflow.predecessor_edges(wire.edge.target)? {
                    if sibling.edge.label > wire.edge.label {
                        workspace.workflow.update_label(sibling.edge.id, |label| {
                            label.index = label.index.saturating_sub(1)
                        })?;
                    }
                }
            }
        }
        Ok(())
    });
    edit
}
