//! Undoable structural editing of workflows
//!
//! Every public operation is built from graph primitives wrapped as
//! commands. Commands capture node and edge identities rather than
//! positions, so undoing restores the exact previous structure at any
//! history depth. An operation that is not nested inside another one
//! records a layout refresh and selection update on both ends of its
//! composite command, so the view is refreshed once per logical edit.
//!
//! A rejected edit is rolled back with [`CommandExecutor::undo_discard`]
//! and leaves no trace in the history.

mod connect;
mod delete;
mod group;
mod insert;
mod reorder;

use std::collections::HashSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use workflow_graph::{GraphError, GraphStore, NodeId, WorkflowGraph};

use crate::command::{Action, CommandExecutor};
use crate::config::EditorConfig;
use crate::error::Result;
use crate::layout::{LayeredGraph, LayoutEngine};
use crate::operator::{NodeCapabilities, Operator};
use crate::view::{GraphView, MemoryView};

type GraphResult<T> = workflow_graph::Result<T>;

/// Where a new node goes relative to its targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// The new node consumes the targets' outputs
    Successor,
    /// The new node feeds the targets
    Predecessor,
}

/// State mutated by recorded commands
pub(crate) struct Workspace<V> {
    workflow: WorkflowGraph<Operator>,
    layout: LayeredGraph,
    view: V,
    engine: LayoutEngine,
}

impl<V: GraphView> Workspace<V> {
    fn refresh_layout(&mut self) -> GraphResult<()> {
        self.layout = self.engine.compute(&self.workflow)?;
        self.view.update_layout(&self.layout);
        Ok(())
    }

    /// Select the given nodes, ignoring any that left the workflow
    fn select(&mut self, nodes: &[NodeId]) {
        let members: Vec<NodeId> = nodes
            .iter()
            .copied()
            .filter(|node| self.workflow.contains(*node))
            .collect();
        self.view.update_selection(&members);
    }
}

/// A sequence of workspace edits run in registration order
pub(crate) struct Script<V> {
    steps: Vec<Action<Workspace<V>>>,
}

impl<V> Clone for Script<V> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
        }
    }
}

impl<V: 'static> Script<V> {
    pub(crate) fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub(crate) fn push(
        &mut self,
        step: impl Fn(&mut Workspace<V>) -> GraphResult<()> + 'static,
    ) {
        self.steps.push(Rc::new(step));
    }

    pub(crate) fn append(&mut self, other: Script<V>) {
        self.steps.extend(other.steps);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn run(&self, workspace: &mut Workspace<V>) -> GraphResult<()> {
        for step in &self.steps {
            step(workspace)?;
        }
        Ok(())
    }
}

/// A forward script together with the script that reverts it
pub(crate) struct Edit<V> {
    pub(crate) apply: Script<V>,
    pub(crate) revert: Script<V>,
}

impl<V: 'static> Edit<V> {
    pub(crate) fn new() -> Self {
        Self {
            apply: Script::new(),
            revert: Script::new(),
        }
    }
}

fn sort_workflow<V>(workspace: &mut Workspace<V>) -> GraphResult<()> {
    workspace.workflow.sort_topologically()
}

/// Interactive editor over a workflow graph.
///
/// Owns the workflow, its current layout, the view collaborator and the
/// undo history of the editing session.
pub struct WorkflowEditor<V = MemoryView> {
    workspace: Workspace<V>,
    executor: CommandExecutor<Workspace<V>>,
    config: EditorConfig,
}

impl WorkflowEditor<MemoryView> {
    /// Edit a workflow through an in-memory view with default configuration
    pub fn with_workflow(workflow: WorkflowGraph<Operator>) -> Result<Self> {
        Self::new(workflow, MemoryView::new(), EditorConfig::default())
    }
}

impl<V: GraphView + 'static> WorkflowEditor<V> {
    /// Start an editing session and compute the initial layout
    pub fn new(workflow: WorkflowGraph<Operator>, view: V, config: EditorConfig) -> Result<Self> {
        let mut workspace = Workspace {
            workflow,
            layout: LayeredGraph::default(),
            view,
            engine: LayoutEngine::new(config.layout.clone()),
        };
        workspace.refresh_layout()?;
        log::debug!(
            "Editing workflow with {} nodes",
            workspace.workflow.len()
        );
        Ok(Self {
            workspace,
            executor: CommandExecutor::with_limit(config.history_limit),
            config,
        })
    }

    /// Start an editing session from a stored workflow
    pub fn from_snapshot(
        store: &impl GraphStore<Operator>,
        blob: &[u8],
        view: V,
        config: EditorConfig,
    ) -> Result<Self> {
        let descriptor = store.deserialize(blob)?;
        let workflow = WorkflowGraph::from_descriptor(&descriptor)?;
        Self::new(workflow, view, config)
    }

    /// Encode the whole workflow with the given store
    pub fn export_workflow(&self, store: &impl GraphStore<Operator>) -> Result<Vec<u8>> {
        let descriptor = self.workspace.workflow.to_descriptor()?;
        Ok(store.serialize(&descriptor)?)
    }

    pub fn workflow(&self) -> &WorkflowGraph<Operator> {
        &self.workspace.workflow
    }

    /// Layout computed after the last edit
    pub fn layout(&self) -> &LayeredGraph {
        &self.workspace.layout
    }

    pub fn view(&self) -> &V {
        &self.workspace.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.workspace.view
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Revert the last edit. Returns `false` if there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        Ok(self.executor.undo(&mut self.workspace)?)
    }

    /// Re-apply the last undone edit. Returns `false` if there was none.
    pub fn redo(&mut self) -> Result<bool> {
        Ok(self.executor.redo(&mut self.workspace)?)
    }

    pub fn can_undo(&self) -> bool {
        self.executor.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.executor.can_redo()
    }

    pub fn clear_history(&mut self) -> Result<()> {
        Ok(self.executor.clear()?)
    }

    /// Run `apply` now and record it with its inverse
    fn record(&mut self, apply: Script<V>, revert: Script<V>) -> Result<()> {
        self.executor.execute(
            &mut self.workspace,
            move |workspace: &mut Workspace<V>| apply.run(workspace),
            move |workspace: &mut Workspace<V>| revert.run(workspace),
        )?;
        Ok(())
    }

    fn record_edit(&mut self, edit: Edit<V>) -> Result<()> {
        self.record(edit.apply, edit.revert)
    }

    /// Run an edit inside a composite command.
    ///
    /// `body` returns the operation result and the selection to show once it
    /// is done; `restore` is the selection shown again on undo. Only the
    /// outermost operation records layout refreshes, and only the outermost
    /// one rolls back when `body` fails.
    fn transaction<R>(
        &mut self,
        operation: &str,
        restore: Vec<NodeId>,
        body: impl FnOnce(&mut Self) -> Result<(R, Vec<NodeId>)>,
    ) -> Result<R> {
        let outermost = !self.executor.in_composite();
        self.executor.begin_composite();

        let opened = if outermost {
            let mut refresh = Script::new();
            refresh.push(move |workspace: &mut Workspace<V>| {
                workspace.refresh_layout()?;
                workspace.select(&restore);
                Ok(())
            });
            self.record(Script::new(), refresh)
        } else {
            Ok(())
        };
        let recorded = opened.is_ok();
        let mut result = opened.and_then(|_| body(self));

        if outermost {
            if let Ok((_, selection)) = &result {
                let selection = selection.clone();
                let mut refresh = Script::new();
                refresh.push(move |workspace: &mut Workspace<V>| {
                    workspace.refresh_layout()?;
                    workspace.select(&selection);
                    Ok(())
                });
                if let Err(err) = self.record(refresh, Script::new()) {
                    result = Err(err);
                }
            }
        }

        self.executor.end_composite()?;
        match result {
            Ok((value, _)) => {
                if outermost {
                    log::debug!("{} committed", operation);
                }
                Ok(value)
            }
            Err(err) => {
                if outermost && recorded {
                    log::warn!("{} rejected, rolling back: {}", operation, err);
                    self.executor.undo_discard(&mut self.workspace)?;
                }
                Err(err)
            }
        }
    }

    /// Sort on apply and on revert
    fn simple_sort() -> Edit<V> {
        let mut edit = Edit::new();
        edit.apply.push(sort_workflow);
        edit.revert.push(sort_workflow);
        edit
    }

    /// Sort on apply; on revert, restore the current relative order of the
    /// sinks before sorting so the previous node order comes back.
    fn reversible_sort(&self) -> Edit<V> {
        let sinks = self.workspace.workflow.sinks();
        let mut edit = Edit::new();
        edit.apply.push(sort_workflow);
        edit.revert.push(move |workspace: &mut Workspace<V>| {
            workspace.workflow.insert_range(0, &sinks)?;
            workspace.workflow.sort_topologically()
        });
        edit
    }

    fn cursor(&self) -> Option<NodeId> {
        self.workspace
            .view
            .cursor_node()
            .filter(|node| self.workspace.workflow.contains(*node))
    }

    fn selection(&self) -> Vec<NodeId> {
        self.workspace
            .view
            .selected_nodes()
            .into_iter()
            .filter(|node| self.workspace.workflow.contains(*node))
            .collect()
    }

    fn index_of(&self, node: NodeId) -> GraphResult<usize> {
        self.workspace
            .workflow
            .index_of(node)
            .ok_or(GraphError::NotInGraph(node))
    }

    /// Member nodes of `nodes` without duplicates, in canonical order
    fn sort_selection(&self, nodes: &[NodeId]) -> GraphResult<Vec<NodeId>> {
        let selected: HashSet<NodeId> = nodes.iter().copied().collect();
        for &node in &selected {
            if !self.workspace.workflow.contains(node) {
                return Err(GraphError::NotInGraph(node));
            }
        }
        Ok(self
            .workspace
            .workflow
            .nodes()
            .iter()
            .copied()
            .filter(|node| selected.contains(node))
            .collect())
    }

    /// Order position for a new node.
    ///
    /// Without a selection, or when the payload accepts no arguments or a
    /// forward branch is requested, the node goes next to the whole component
    /// of `target`; otherwise right before or after `target` itself.
    fn insert_index(
        &self,
        payload: Option<&Operator>,
        target: Option<NodeId>,
        mode: InsertMode,
        branch: bool,
    ) -> GraphResult<usize> {
        let workflow = &self.workspace.workflow;
        let allow_connection = payload.map_or(false, |payload| payload.argument_range().max > 0);
        let forward_branch = branch && mode == InsertMode::Successor;
        let insert_component = forward_branch
            || self.workspace.view.selected_nodes().is_empty()
            || !allow_connection;
        if let (true, Some(target)) = (insert_component, target) {
            if forward_branch && allow_connection {
                return Ok(self.index_of(target)? + 1);
            }
            let component = workflow.component_of(target)?;
            return Ok(match mode {
                InsertMode::Successor => last_index_of_component(workflow, &component) + 1,
                InsertMode::Predecessor => {
                    first_index_of_component(workflow, &component).unwrap_or(0)
                }
            });
        }
        self.relative_index(target, mode)
    }

    /// Position right before or right after `target`; the end if there is none
    fn relative_index(&self, target: Option<NodeId>, mode: InsertMode) -> GraphResult<usize> {
        match target {
            None => Ok(self.workspace.workflow.len()),
            Some(target) => {
                let offset = match mode {
                    InsertMode::Successor => 1,
                    InsertMode::Predecessor => 0,
                };
                Ok(self.index_of(target)? + offset)
            }
        }
    }
}

fn first_index_of_component(
    workflow: &WorkflowGraph<Operator>,
    component: &[NodeId],
) -> Option<usize> {
    let component: HashSet<NodeId> = component.iter().copied().collect();
    workflow
        .nodes()
        .iter()
        .position(|node| component.contains(node))
}

fn last_index_of_component(workflow: &WorkflowGraph<Operator>, component: &[NodeId]) -> usize {
    let component: HashSet<NodeId> = component.iter().copied().collect();
    workflow
        .nodes()
        .iter()
        .rposition(|node| component.contains(node))
        .unwrap_or(0)
}

/// Shift existing input markers up to make room for a newly added one
fn add_workflow_input(workflow: &mut WorkflowGraph<Operator>, node: NodeId) -> GraphResult<()> {
    let Some(index) = workflow.value(node)?.input_index() else {
        return Ok(());
    };
    for member in workflow.nodes().to_vec() {
        if member == node {
            continue;
        }
        let value = workflow.value_mut(member)?;
        if let Some(other) = value.input_index() {
            if other >= index {
                value.set_input_index(other + 1);
            }
        }
    }
    Ok(())
}

/// Close the gap left by a removed input marker
fn remove_workflow_input(workflow: &mut WorkflowGraph<Operator>, node: NodeId) -> GraphResult<()> {
    let Some(index) = workflow.value(node)?.input_index() else {
        return Ok(());
    };
    for member in workflow.nodes().to_vec() {
        let value = workflow.value_mut(member)?;
        if let Some(other) = value.input_index() {
            if other > index {
                value.set_input_index(other - 1);
            }
        }
    }
    Ok(())
}

/// Nodes currently feeding `target` as active arguments.
///
/// Walks the topological order propagating activation: build dependencies
/// never count, and a disabled node only counts when something active
/// feeds it.
fn argument_sources(workflow: &WorkflowGraph<Operator>, target: NodeId) -> GraphResult<Vec<NodeId>> {
    let mut activation = HashSet::new();
    let mut sources = Vec::new();
    for node in workflow.topological_sort()? {
        let value = workflow.value(node)?;
        if value.is_build_dependency() {
            continue;
        }
        if !activation.contains(&node) {
            if value.is_disabled() {
                continue;
            }
            activation.insert(node);
        }
        for edge in workflow.successors(node)? {
            if edge.target == target {
                sources.push(node);
            }
            activation.insert(edge.target);
        }
    }
    Ok(sources)
}

/// Advance `index` to the next argument slot not taken in the sorted
/// `indices`, starting the merge scan at `offset`.
fn find_next_index(index: &mut usize, offset: &mut usize, indices: &[usize]) {
    while *offset < indices.len() {
        if indices[*offset] > *index {
            break;
        }
        *offset += 1;
        *index += 1;
    }
}

/// Sorted argument indices of the edges feeding `target`
fn sorted_argument_indices(
    workflow: &WorkflowGraph<Operator>,
    target: NodeId,
) -> GraphResult<Vec<usize>> {
    let mut indices: Vec<usize> = workflow
        .predecessor_edges(target)?
        .iter()
        .map(|pred| pred.edge.label.index)
        .collect();
    indices.sort_unstable();
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use workflow_graph::{CompressedJsonStore, GraphBuilder, JsonStore};

    use super::*;
    use crate::error::{EditorError, ValidationError};

    type Edges = Vec<(String, String, usize)>;

    fn element(name: &str) -> Operator {
        Operator::element(name, 0, 4)
    }

    fn build(nodes: &[&str], edges: &[(&str, &str, usize)]) -> (WorkflowEditor, HashMap<String, NodeId>) {
        build_with(nodes.iter().map(|name| (*name, element(name))).collect(), edges)
    }

    fn build_with(
        nodes: Vec<(&str, Operator)>,
        edges: &[(&str, &str, usize)],
    ) -> (WorkflowEditor, HashMap<String, NodeId>) {
        let mut builder = GraphBuilder::new();
        for (name, value) in nodes {
            builder = builder.add_node(name, value);
        }
        for (source, target, index) in edges {
            builder = builder.add_edge(*source, *target, *index);
        }
        let (graph, ids) = builder.build().unwrap();
        (WorkflowEditor::with_workflow(graph).unwrap(), ids)
    }

    fn name(editor: &WorkflowEditor, node: NodeId) -> String {
        editor.workflow().value(node).unwrap().name().to_string()
    }

    /// Member edges by node name, sorted
    fn named_edges(editor: &WorkflowEditor) -> Edges {
        let mut edges: Edges = editor
            .workflow()
            .edges()
            .into_iter()
            .map(|(source, edge)| {
                (
                    name(editor, source),
                    name(editor, edge.target),
                    edge.label.index,
                )
            })
            .collect();
        edges.sort();
        edges
    }

    fn edge(source: &str, target: &str, index: usize) -> (String, String, usize) {
        (source.to_string(), target.to_string(), index)
    }

    /// Node order and labelled edges by identity
    fn snapshot(editor: &WorkflowEditor) -> (Vec<NodeId>, Vec<(NodeId, NodeId, usize)>) {
        let mut edges: Vec<_> = editor
            .workflow()
            .edges()
            .into_iter()
            .map(|(source, edge)| (source, edge.target, edge.label.index))
            .collect();
        edges.sort();
        (editor.workflow().nodes().to_vec(), edges)
    }

    fn assert_consistent(editor: &WorkflowEditor) {
        let workflow = editor.workflow();
        assert!(workflow.is_acyclic());
        for &node in workflow.nodes() {
            let mut labels: Vec<usize> = workflow
                .predecessor_edges(node)
                .unwrap()
                .iter()
                .map(|pred| pred.edge.label.index)
                .collect();
            labels.sort_unstable();
            assert_eq!(labels, (0..labels.len()).collect::<Vec<_>>(), "labels of {}", node);
        }
    }

    fn position(editor: &WorkflowEditor, node: NodeId) -> usize {
        editor.workflow().index_of(node).unwrap()
    }

    fn assert_rejected(result: Result<impl std::fmt::Debug>, expected: ValidationError) {
        match result {
            Err(EditorError::Validation(err)) => assert_eq!(err, expected),
            other => panic!("expected {:?}, got {:?}", expected, other),
        }
    }

    #[test]
    fn test_delete_bypasses_chain_node() {
        let (mut editor, ids) = build(&["a", "b", "c"], &[("a", "b", 0), ("b", "c", 0)]);
        let before = snapshot(&editor);

        editor.delete_nodes(&[ids["b"]], true).unwrap();
        assert!(!editor.workflow().contains(ids["b"]));
        assert_eq!(named_edges(&editor), vec![edge("a", "c", 0)]);
        assert_consistent(&editor);

        assert!(editor.undo().unwrap());
        assert_eq!(snapshot(&editor), before);
    }

    #[test]
    fn test_delete_bypasses_fan_in_to_single_successor() {
        let (mut editor, ids) = build(
            &["a", "b", "c", "d"],
            &[("a", "c", 0), ("b", "c", 1), ("c", "d", 0)],
        );
        editor.delete_nodes(&[ids["c"]], true).unwrap();
        assert_eq!(
            named_edges(&editor),
            vec![edge("a", "d", 0), edge("b", "d", 1)]
        );
        assert_consistent(&editor);
    }

    #[test]
    fn test_delete_shifts_remaining_arguments() {
        let (mut editor, ids) = build(&["a", "b", "c"], &[("a", "c", 0), ("b", "c", 1)]);
        let before = snapshot(&editor);

        editor.delete_nodes(&[ids["a"]], true).unwrap();
        assert_eq!(named_edges(&editor), vec![edge("b", "c", 0)]);

        editor.undo().unwrap();
        assert_eq!(snapshot(&editor), before);
    }

    #[test]
    fn test_connect_assigns_next_free_slot() {
        let (mut editor, ids) = build(&["a", "b", "t"], &[]);
        editor.connect(&[ids["a"], ids["b"]], ids["t"]).unwrap();
        assert_eq!(
            named_edges(&editor),
            vec![edge("a", "t", 0), edge("b", "t", 1)]
        );
        assert_consistent(&editor);
    }

    #[test]
    fn test_connect_overflow_rejected() {
        let (mut editor, ids) = build_with(
            vec![
                ("x", element("x")),
                ("y", element("y")),
                ("z", element("z")),
                ("t", Operator::element("t", 0, 2)),
            ],
            &[],
        );
        editor.connect(&[ids["x"], ids["y"]], ids["t"]).unwrap();
        let before = snapshot(&editor);

        assert_rejected(
            editor.connect(&[ids["z"]], ids["t"]),
            ValidationError::ArgumentRangeOverflow {
                target: ids["t"],
                max: 2,
            },
        );
        assert_eq!(snapshot(&editor), before);

        // the rejected edit left no history entry
        editor.undo().unwrap();
        assert!(named_edges(&editor).is_empty());
        assert!(!editor.can_undo());
    }

    #[test]
    fn test_build_dependency_exempt_from_argument_limit() {
        let dependency = Operator::Element(
            crate::operator::OperatorDescriptor::new("dep", crate::operator::ArgumentRange::none())
                .as_build_dependency(),
        );
        let (mut editor, ids) = build_with(
            vec![
                ("x", element("x")),
                ("dep", dependency),
                ("t", Operator::element("t", 0, 1)),
            ],
            &[("x", "t", 0)],
        );
        editor.connect(&[ids["dep"]], ids["t"]).unwrap();
        assert!(editor.workflow().has_edge(ids["dep"], ids["t"]).unwrap());
    }

    #[test]
    fn test_connect_rejects_invalid_edges() {
        let (mut editor, ids) = build(&["a", "b"], &[("a", "b", 0)]);
        assert_rejected(
            editor.connect(&[ids["a"]], ids["a"]),
            ValidationError::SelfLoop(ids["a"]),
        );
        assert_rejected(
            editor.connect(&[ids["a"]], ids["b"]),
            ValidationError::DuplicateEdge {
                from: ids["a"],
                to: ids["b"],
            },
        );
        assert_rejected(
            editor.connect(&[ids["b"]], ids["a"]),
            ValidationError::Cycle {
                from: ids["b"],
                to: ids["a"],
            },
        );
        assert!(editor.workflow().is_acyclic());
    }

    #[test]
    fn test_disconnect_compacts_labels() {
        let (mut editor, ids) = build(&["a", "b", "c"], &[("a", "c", 0), ("b", "c", 1)]);
        let before = snapshot(&editor);

        editor.disconnect(&[ids["a"]], ids["c"]).unwrap();
        assert_eq!(named_edges(&editor), vec![edge("b", "c", 0)]);
        assert_consistent(&editor);

        editor.undo().unwrap();
        assert_eq!(snapshot(&editor), before);
        editor.redo().unwrap();
        assert_eq!(named_edges(&editor), vec![edge("b", "c", 0)]);
    }

    #[test]
    fn test_validate_connection_modes() {
        let (mut editor, ids) = build(&["a", "b"], &[]);
        assert!(editor.validate_connection(false, false, &[ids["a"]], ids["b"]));
        assert!(!editor.validate_connection(false, true, &[ids["a"]], ids["b"]));

        editor.connect(&[ids["a"]], ids["b"]).unwrap();
        assert!(editor.validate_connection(false, true, &[ids["a"]], ids["b"]));
        assert!(!editor.validate_connection(false, false, &[ids["b"]], ids["a"]));
        assert!(!editor.validate_connection(true, false, &[ids["a"]], ids["a"]));
    }

    #[test]
    fn test_insert_successor_inherits_outputs() {
        let (mut editor, ids) = build(&["a", "b"], &[("a", "b", 0)]);
        let node = editor
            .insert_node(element("x"), &[ids["a"]], InsertMode::Successor, false)
            .unwrap();
        assert_eq!(
            named_edges(&editor),
            vec![edge("a", "x", 0), edge("x", "b", 0)]
        );
        assert_eq!(editor.view().selected_nodes(), vec![node]);
        assert!(position(&editor, ids["a"]) < position(&editor, node));
        assert!(position(&editor, node) < position(&editor, ids["b"]));
    }

    #[test]
    fn test_insert_predecessor_takes_over_arguments() {
        let (mut editor, ids) = build(&["a", "b"], &[("a", "b", 0)]);
        let before = snapshot(&editor);
        editor
            .insert_node(element("x"), &[ids["b"]], InsertMode::Predecessor, false)
            .unwrap();
        assert_eq!(
            named_edges(&editor),
            vec![edge("a", "x", 0), edge("x", "b", 0)]
        );
        assert_consistent(&editor);

        editor.undo().unwrap();
        assert_eq!(snapshot(&editor), before);
    }

    #[test]
    fn test_insert_chain_rejected() {
        let (mut editor, ids) = build(&["a", "b"], &[("a", "b", 0)]);
        let before = snapshot(&editor);
        assert_rejected(
            editor.insert_node(
                element("x"),
                &[ids["a"], ids["b"]],
                InsertMode::Successor,
                false,
            ),
            ValidationError::InvalidInsertChain,
        );
        assert_eq!(snapshot(&editor), before);
        assert!(!editor.can_undo());
    }

    #[test]
    fn test_input_markers_renumbered() {
        let (mut editor, ids) = build_with(
            vec![
                ("in0", Operator::WorkflowInput { index: 0 }),
                ("in1", Operator::WorkflowInput { index: 1 }),
            ],
            &[],
        );
        let added = editor
            .insert_node(
                Operator::WorkflowInput { index: 7 },
                &[],
                InsertMode::Successor,
                false,
            )
            .unwrap();
        let index = |editor: &WorkflowEditor, node: NodeId| {
            editor.workflow().value(node).unwrap().input_index()
        };
        assert_eq!(index(&editor, added), Some(2));

        editor.delete_nodes(&[ids["in0"]], true).unwrap();
        assert_eq!(index(&editor, ids["in1"]), Some(0));
        assert_eq!(index(&editor, added), Some(1));

        editor.undo().unwrap();
        assert_eq!(index(&editor, ids["in0"]), Some(0));
        assert_eq!(index(&editor, ids["in1"]), Some(1));
        assert_eq!(index(&editor, added), Some(2));
    }

    #[test]
    fn test_replace_keeps_wiring() {
        let (mut editor, ids) = build(&["a", "b", "c"], &[("a", "b", 0), ("b", "c", 0)]);
        let before = snapshot(&editor);
        let node = editor.replace_node(ids["b"], element("z")).unwrap();
        assert!(!editor.workflow().contains(ids["b"]));
        assert_eq!(
            named_edges(&editor),
            vec![edge("a", "z", 0), edge("z", "c", 0)]
        );
        assert_eq!(position(&editor, node), 1);

        editor.undo().unwrap();
        assert_eq!(snapshot(&editor), before);
    }

    #[test]
    fn test_disable_and_enable() {
        let (mut editor, ids) = build(&["a", "b", "c"], &[("a", "b", 0), ("b", "c", 0)]);
        let disabled = editor.disable_nodes(&[ids["b"]]).unwrap();
        assert_eq!(disabled.len(), 1);
        assert!(editor.workflow().value(disabled[0]).unwrap().is_disabled());
        assert_eq!(
            named_edges(&editor),
            vec![edge("a", "b", 0), edge("b", "c", 0)]
        );

        let enabled = editor.enable_nodes(&disabled).unwrap();
        assert!(!editor.workflow().value(enabled[0]).unwrap().is_disabled());
        assert_eq!(
            named_edges(&editor),
            vec![edge("a", "b", 0), edge("b", "c", 0)]
        );
    }

    #[test]
    fn test_copy_and_paste() {
        let (mut editor, ids) = build(&["a", "b", "c"], &[("a", "b", 0), ("b", "c", 0)]);
        editor.view_mut().select(&[ids["a"], ids["b"]]);
        let blob = editor.copy_selection(&JsonStore).unwrap();

        editor.view_mut().select(&[]);
        let pasted = editor
            .paste(&JsonStore, &blob, InsertMode::Successor, false)
            .unwrap();
        assert_eq!(pasted.len(), 2);
        assert_eq!(editor.workflow().len(), 5);
        assert_eq!(
            named_edges(&editor),
            vec![edge("a", "b", 0), edge("a", "b", 0), edge("b", "c", 0)]
        );
        assert_consistent(&editor);
    }

    #[test]
    fn test_move_next_to_target() {
        let (mut editor, ids) = build(&["a", "b", "c", "x"], &[("a", "b", 0), ("b", "c", 0)]);
        let before = snapshot(&editor);
        let moved = editor
            .move_nodes(&[ids["b"]], ids["x"], InsertMode::Successor, false)
            .unwrap();
        assert_eq!(moved.len(), 1);
        assert!(!editor.workflow().contains(ids["b"]));
        assert_eq!(
            named_edges(&editor),
            vec![edge("a", "c", 0), edge("x", "b", 0)]
        );

        editor.undo().unwrap();
        assert_eq!(snapshot(&editor), before);
    }

    #[test]
    fn test_move_onto_itself_rejected() {
        let (mut editor, ids) = build(&["a", "b"], &[("a", "b", 0)]);
        assert_rejected(
            editor.move_nodes(&[ids["a"]], ids["a"], InsertMode::Successor, false),
            ValidationError::InvalidMoveTarget(ids["a"]),
        );
    }

    #[test]
    fn test_reorder_swaps_argument_slots() {
        let (mut editor, ids) = build(&["a", "b", "c"], &[("a", "c", 0), ("b", "c", 1)]);
        let before = snapshot(&editor);
        editor.reorder(&[ids["b"]], ids["a"]).unwrap();
        assert_eq!(
            named_edges(&editor),
            vec![edge("a", "c", 1), edge("b", "c", 0)]
        );
        assert!(position(&editor, ids["b"]) < position(&editor, ids["a"]));

        editor.undo().unwrap();
        assert_eq!(snapshot(&editor), before);
    }

    #[test]
    fn test_reorder_branch_within_component() {
        let (mut editor, ids) = build(&["a", "b", "c"], &[("a", "b", 0), ("a", "c", 0)]);
        assert!(position(&editor, ids["b"]) < position(&editor, ids["c"]));
        let before = snapshot(&editor);

        editor.reorder(&[ids["c"]], ids["b"]).unwrap();
        assert!(position(&editor, ids["c"]) < position(&editor, ids["b"]));
        let targets: Vec<NodeId> = editor
            .workflow()
            .successors(ids["a"])
            .unwrap()
            .iter()
            .map(|edge| edge.target)
            .collect();
        assert_eq!(targets, vec![ids["c"], ids["b"]]);

        editor.undo().unwrap();
        assert_eq!(snapshot(&editor), before);
    }

    #[test]
    fn test_reorder_component_before_target() {
        let (mut editor, ids) = build(&["x1", "x2", "y1", "y2"], &[("x1", "x2", 0), ("y1", "y2", 0)]);
        let before = snapshot(&editor);

        let reordered = editor.reorder(&[ids["y1"]], ids["x1"]).unwrap();
        assert_eq!(reordered.len(), 1);
        assert_ne!(reordered[0], ids["y1"]);
        assert!(!editor.workflow().contains(ids["y1"]));
        let names: Vec<String> = editor
            .workflow()
            .nodes()
            .iter()
            .map(|node| name(&editor, *node))
            .collect();
        assert_eq!(names, vec!["y1", "y2", "x1", "x2"]);

        editor.undo().unwrap();
        assert_eq!(snapshot(&editor), before);
    }

    #[test]
    fn test_reorder_overlapping_branches_rejected() {
        let (editor, ids) = build(&["a", "b", "c"], &[("a", "b", 0), ("b", "c", 0)]);
        assert!(!editor.can_reorder(&[ids["a"]], ids["b"]));
        assert!(!editor.can_reorder(&[ids["a"]], ids["a"]));
    }

    #[test]
    fn test_group_and_ungroup_chain() {
        let (mut editor, ids) = build(
            &["a", "b", "c", "d"],
            &[("a", "b", 0), ("b", "c", 0), ("c", "d", 0)],
        );
        let original = named_edges(&editor);
        let before = snapshot(&editor);

        let group = editor.group_nodes(&[ids["b"], ids["c"]]).unwrap();
        assert_eq!(editor.workflow().len(), 3);
        let nested = editor
            .workflow()
            .value(group)
            .unwrap()
            .as_group()
            .unwrap()
            .workflow
            .clone();
        assert_eq!(nested.nodes.len(), 4);
        assert_eq!(
            named_edges(&editor),
            vec![edge("Group", "d", 0), edge("a", "Group", 0)]
        );
        assert_eq!(editor.view().selected_nodes(), vec![group]);
        assert_consistent(&editor);

        let expanded = editor.ungroup(group).unwrap();
        assert_eq!(expanded.len(), 2);
        assert_eq!(named_edges(&editor), original);
        assert_consistent(&editor);

        editor.undo().unwrap();
        editor.undo().unwrap();
        assert_eq!(snapshot(&editor), before);
    }

    #[test]
    fn test_group_fan_in_round_trip() {
        let (mut editor, ids) = build(
            &["a", "b", "c", "d"],
            &[("a", "c", 0), ("b", "c", 1), ("c", "d", 0)],
        );
        let original = named_edges(&editor);

        let group = editor.group_nodes(&[ids["c"]]).unwrap();
        let value = editor.workflow().value(group).unwrap();
        assert_eq!(value.argument_range().max, 2);
        assert_eq!(editor.workflow().predecessors(group).unwrap().len(), 2);
        assert_consistent(&editor);

        editor.ungroup(group).unwrap();
        assert_eq!(named_edges(&editor), original);
    }

    #[test]
    fn test_group_keeps_successor_slot() {
        let (mut editor, ids) = build(
            &["a", "b", "x", "t"],
            &[("a", "b", 0), ("x", "t", 0), ("b", "t", 1)],
        );
        let group = editor.group_nodes(&[ids["a"], ids["b"]]).unwrap();
        assert_eq!(
            named_edges(&editor),
            vec![edge("Group", "t", 1), edge("x", "t", 0)]
        );

        editor.ungroup(group).unwrap();
        assert_eq!(
            named_edges(&editor),
            vec![edge("a", "b", 0), edge("b", "t", 1), edge("x", "t", 0)]
        );
    }

    #[test]
    fn test_group_redo_matches_first_run() {
        let (mut editor, ids) = build(
            &["a", "b", "c", "d"],
            &[("a", "b", 0), ("b", "c", 0), ("c", "d", 0)],
        );
        editor.group_nodes(&[ids["b"], ids["c"]]).unwrap();
        let grouped = named_edges(&editor);
        let order = editor.workflow().nodes().to_vec();

        editor.undo().unwrap();
        editor.redo().unwrap();
        assert_eq!(named_edges(&editor), grouped);
        assert_eq!(editor.workflow().nodes(), order.as_slice());
    }

    #[test]
    fn test_group_broken_branch_rejected() {
        let (mut editor, ids) = build(&["a", "b", "c"], &[("a", "b", 0), ("b", "c", 0)]);
        assert!(!editor.can_group(&[ids["a"], ids["c"]]));
        assert_rejected(
            editor.group_nodes(&[ids["a"], ids["c"]]),
            ValidationError::BrokenBranch(ids["c"]),
        );
        assert_rejected(editor.group_nodes(&[]), ValidationError::EmptySelection);
        assert!(editor.can_group(&[ids["a"], ids["b"]]));
    }

    #[test]
    fn test_ungroup_requires_group() {
        let (mut editor, ids) = build(&["a"], &[]);
        assert_rejected(editor.ungroup(ids["a"]), ValidationError::NotAGroup(ids["a"]));
    }

    #[test]
    fn test_undo_sequence_restores_every_step() {
        let (mut editor, ids) = build(
            &["a", "b", "c", "d"],
            &[("a", "b", 0), ("b", "c", 0)],
        );
        let mut history = vec![snapshot(&editor)];

        editor.connect(&[ids["d"]], ids["c"]).unwrap();
        history.push(snapshot(&editor));
        editor
            .insert_node(element("x"), &[ids["a"]], InsertMode::Successor, false)
            .unwrap();
        history.push(snapshot(&editor));
        editor.delete_nodes(&[ids["b"]], true).unwrap();
        history.push(snapshot(&editor));
        editor.disconnect(&[ids["d"]], ids["c"]).unwrap();
        let last = snapshot(&editor);

        for expected in history.iter().rev() {
            assert!(editor.undo().unwrap());
            assert_eq!(&snapshot(&editor), expected);
        }
        assert!(!editor.undo().unwrap());

        while editor.redo().unwrap() {}
        assert_eq!(snapshot(&editor), last);
    }

    #[test]
    fn test_one_layout_refresh_per_edit() {
        let (mut editor, ids) = build(&["a", "b"], &[]);
        assert_eq!(editor.view().layout_updates(), 1);
        editor.connect(&[ids["a"]], ids["b"]).unwrap();
        assert_eq!(editor.view().layout_updates(), 2);
        editor.undo().unwrap();
        assert_eq!(editor.view().layout_updates(), 3);
        assert_eq!(editor.view().layout(), editor.layout());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (editor, _) = build(&["a", "b", "c"], &[("a", "c", 0), ("b", "c", 1)]);
        let store = CompressedJsonStore::default();
        let blob = editor.export_workflow(&store).unwrap();

        let restored =
            WorkflowEditor::from_snapshot(&store, &blob, MemoryView::new(), EditorConfig::default())
                .unwrap();
        assert_eq!(named_edges(&restored), named_edges(&editor));
        let names = |editor: &WorkflowEditor| -> Vec<String> {
            editor
                .workflow()
                .nodes()
                .iter()
                .map(|node| name(editor, *node))
                .collect()
        };
        assert_eq!(names(&restored), names(&editor));
    }

    #[test]
    fn test_delete_without_replacing_edges() {
        let (mut editor, ids) = build(&["a", "b", "c"], &[("a", "b", 0), ("b", "c", 0)]);
        editor.delete_nodes(&[ids["b"]], false).unwrap();
        assert!(named_edges(&editor).is_empty());
        assert_eq!(editor.workflow().len(), 2);
    }

    #[test]
    fn test_move_with_build_dependency_undo_restores_order() {
        let (mut editor, ids) = build_with(
            vec![
                ("a", element("a")),
                ("note", Operator::annotation("note")),
                ("b", element("b")),
                ("c", element("c")),
                ("x", element("x")),
            ],
            &[("a", "b", 0), ("note", "b", 1), ("b", "c", 0)],
        );
        let before = snapshot(&editor);

        let moved = editor
            .move_nodes(&[ids["b"]], ids["x"], InsertMode::Successor, false)
            .unwrap();
        assert_eq!(moved.len(), 1);
        assert!(editor.workflow().has_edge(ids["note"], moved[0]).unwrap());
        assert!(editor.workflow().has_edge(ids["x"], moved[0]).unwrap());
        assert!(editor.workflow().has_edge(ids["a"], ids["c"]).unwrap());

        editor.undo().unwrap();
        assert_eq!(snapshot(&editor), before);
    }

    #[test]
    fn test_group_rejects_several_outputs() {
        let (mut editor, ids) = build(
            &["x", "b", "c", "t1", "t2"],
            &[("x", "b", 0), ("x", "c", 0), ("b", "t1", 0), ("c", "t2", 0)],
        );
        let before = snapshot(&editor);

        assert!(!editor.can_group(&[ids["b"], ids["c"]]));
        assert!(matches!(
            editor.group_nodes(&[ids["b"], ids["c"]]),
            Err(EditorError::Validation(ValidationError::AmbiguousGroupOutput(_)))
        ));
        assert_eq!(snapshot(&editor), before);
        assert!(!editor.can_undo());
    }

    #[test]
    fn test_group_rejects_output_from_inner_node() {
        let (mut editor, ids) = build(
            &["a", "b", "t", "u"],
            &[("a", "b", 0), ("a", "t", 0), ("b", "u", 0)],
        );
        assert!(!editor.can_group(&[ids["a"], ids["b"]]));
        assert_rejected(
            editor.group_nodes(&[ids["a"], ids["b"]]),
            ValidationError::AmbiguousGroupOutput(ids["a"]),
        );
        assert!(editor.can_group(&[ids["b"]]));
    }

    #[test]
    fn test_group_keeps_build_dependency() {
        let (mut editor, ids) = build_with(
            vec![
                ("a", element("a")),
                ("note", Operator::annotation("note")),
                ("s", element("s")),
                ("t", element("t")),
            ],
            &[("a", "s", 0), ("note", "s", 1), ("s", "t", 0)],
        );
        let original = named_edges(&editor);
        let before = snapshot(&editor);

        let group = editor.group_nodes(&[ids["a"], ids["s"]]).unwrap();
        assert_eq!(
            named_edges(&editor),
            vec![edge("Group", "t", 0), edge("note", "Group", 0)]
        );
        assert_consistent(&editor);

        editor.undo().unwrap();
        assert_eq!(snapshot(&editor), before);
        editor.redo().unwrap();

        editor.ungroup(group).unwrap();
        assert_eq!(named_edges(&editor), original);
        assert_consistent(&editor);
    }

}
