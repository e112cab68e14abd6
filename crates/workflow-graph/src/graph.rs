//! Ordered directed graph with index-labelled successor edges
//!
//! Node payloads live in an arena keyed by [`NodeId`]. The graph's membership
//! is the ordered `order` list; a node removed from the graph stays in the
//! arena together with its own successor list, so a later `insert` restores
//! it exactly. Edges are identified by [`EdgeId`] so that edits can be undone
//! by identity even after positions have shifted.

use std::collections::{HashMap, HashSet};

use crate::error::{GraphError, Result};
use crate::types::{Edge, EdgeId, EdgeLabel, NodeId, PredecessorEdge};

#[derive(Debug, Clone)]
struct NodeEntry<T> {
    value: T,
    successors: Vec<Edge>,
}

/// A directed graph whose node order is significant.
///
/// Insertion order is the canonical tie-break used by every deterministic
/// traversal, so callers keep the order topologically sorted between edits.
#[derive(Debug, Clone)]
pub struct WorkflowGraph<T> {
    order: Vec<NodeId>,
    members: HashSet<NodeId>,
    entries: HashMap<NodeId, NodeEntry<T>>,
    next_node: u64,
    next_edge: u64,
}

impl<T> Default for WorkflowGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkflowGraph<T> {
    /// Create an empty graph
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            members: HashSet::new(),
            entries: HashMap::new(),
            next_node: 0,
            next_edge: 0,
        }
    }

    /// Number of member nodes
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Member nodes in canonical order
    pub fn nodes(&self) -> &[NodeId] {
        &self.order
    }

    /// Node at the given order position
    pub fn node_at(&self, index: usize) -> Option<NodeId> {
        self.order.get(index).copied()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.members.contains(&node)
    }

    /// Whether the node exists in the arena, member or not
    pub fn exists(&self, node: NodeId) -> bool {
        self.entries.contains_key(&node)
    }

    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        if !self.contains(node) {
            return None;
        }
        self.order.iter().position(|id| *id == node)
    }

    pub fn value(&self, node: NodeId) -> Result<&T> {
        self.entry(node).map(|entry| &entry.value)
    }

    pub fn value_mut(&mut self, node: NodeId) -> Result<&mut T> {
        self.entry_mut(node).map(|entry| &mut entry.value)
    }

    /// Outgoing edges of a node in successor order
    pub fn successors(&self, node: NodeId) -> Result<&[Edge]> {
        self.entry(node).map(|entry| entry.successors.as_slice())
    }

    fn entry(&self, node: NodeId) -> Result<&NodeEntry<T>> {
        self.entries.get(&node).ok_or(GraphError::NodeNotFound(node))
    }

    fn entry_mut(&mut self, node: NodeId) -> Result<&mut NodeEntry<T>> {
        self.entries
            .get_mut(&node)
            .ok_or(GraphError::NodeNotFound(node))
    }

    fn ensure_member(&self, node: NodeId) -> Result<()> {
        if !self.exists(node) {
            return Err(GraphError::NodeNotFound(node));
        }
        if !self.contains(node) {
            return Err(GraphError::NotInGraph(node));
        }
        Ok(())
    }

    /// Create a node in the arena without adding it to the graph.
    pub fn allocate(&mut self, value: T) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.entries.insert(
            id,
            NodeEntry {
                value,
                successors: Vec::new(),
            },
        );
        id
    }

    /// Allocate a node and append it to the graph
    pub fn add_value(&mut self, value: T) -> NodeId {
        let id = self.allocate(value);
        self.order.push(id);
        self.members.insert(id);
        id
    }

    /// Append a node and, recursively, any of its successors not yet in the graph.
    pub fn add(&mut self, node: NodeId) -> Result<()> {
        self.entry(node)?;
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if self.contains(current) {
                continue;
            }
            self.order.push(current);
            self.members.insert(current);
            let successors = self.entry(current)?.successors.clone();
            for edge in successors.iter().rev() {
                if !self.contains(edge.target) {
                    stack.push(edge.target);
                }
            }
        }
        Ok(())
    }

    /// Insert a node at the specified order position. See [`Self::insert_range`].
    pub fn insert(&mut self, index: usize, node: NodeId) -> Result<()> {
        self.insert_range(index, &[node])
    }

    /// Insert nodes at the specified order position.
    ///
    /// Nodes already in the graph are moved. Successors of the inserted
    /// nodes that are not yet members are pulled in after them, in
    /// depth-first order.
    pub fn insert_range(&mut self, index: usize, nodes: &[NodeId]) -> Result<()> {
        if index > self.order.len() {
            return Err(GraphError::IndexOutOfRange {
                index,
                len: self.order.len(),
            });
        }

        let mut inserted = Vec::with_capacity(nodes.len());
        let mut inserted_set = HashSet::new();
        for &node in nodes {
            self.entry(node)?;
            if inserted_set.insert(node) {
                inserted.push(node);
            }
        }

        let mut visited = HashSet::new();
        let mut additional = Vec::new();
        for &node in &inserted {
            for successor in self.dfs_from(node, &mut visited)? {
                if !inserted_set.contains(&successor) && !self.contains(successor) {
                    additional.push(successor);
                }
            }
        }
        for node in additional {
            if inserted_set.insert(node) {
                inserted.push(node);
            }
        }

        let mut insertion_index = index;
        let mut position = 0;
        self.order.retain(|node| {
            let remove = inserted_set.contains(node);
            if remove && position < index {
                insertion_index -= 1;
            }
            position += 1;
            !remove
        });
        self.members.extend(inserted.iter().copied());
        self.order
            .splice(insertion_index..insertion_index, inserted.iter().copied());
        Ok(())
    }

    /// Remove a node from the graph.
    ///
    /// Every member edge targeting the node is removed. The node keeps its
    /// own successor list and stays in the arena. Returns `false` if the
    /// node was not a member.
    pub fn remove(&mut self, node: NodeId) -> Result<bool> {
        self.entry(node)?;
        if !self.members.remove(&node) {
            return Ok(false);
        }
        self.order.retain(|id| *id != node);
        for member in &self.order {
            if let Some(entry) = self.entries.get_mut(member) {
                entry.successors.retain(|edge| edge.target != node);
            }
        }
        Ok(true)
    }

    /// Remove several nodes at once, returning how many were members.
    ///
    /// Only edges from the remaining members into the removed set are
    /// stripped; the removed nodes keep the edges among themselves.
    pub fn remove_range(&mut self, nodes: &[NodeId]) -> Result<usize> {
        for &node in nodes {
            self.entry(node)?;
        }
        let removed: HashSet<NodeId> = nodes
            .iter()
            .copied()
            .filter(|node| self.members.remove(node))
            .collect();
        if removed.is_empty() {
            return Ok(0);
        }

        self.order.retain(|id| !removed.contains(id));
        for member in &self.order {
            if let Some(entry) = self.entries.get_mut(member) {
                entry
                    .successors
                    .retain(|edge| !removed.contains(&edge.target));
            }
        }
        Ok(removed.len())
    }

    /// Put detached nodes back at exact order positions.
    ///
    /// Placements are applied by ascending position, so restoring the
    /// positions a set of nodes held before removal reproduces the previous
    /// order. Unlike [`Self::insert_range`], successors are not pulled in.
    pub fn restore(&mut self, placements: &[(usize, NodeId)]) -> Result<()> {
        let mut sorted = placements.to_vec();
        sorted.sort_by_key(|(index, _)| *index);

        let mut len = self.order.len();
        let mut seen = HashSet::new();
        for &(index, node) in &sorted {
            self.entry(node)?;
            if self.contains(node) || !seen.insert(node) {
                return Err(GraphError::AlreadyInGraph(node));
            }
            if index > len {
                return Err(GraphError::IndexOutOfRange { index, len });
            }
            len += 1;
        }

        for (index, node) in sorted {
            self.order.insert(index, node);
            self.members.insert(node);
        }
        Ok(())
    }

    /// Create an edge with a fresh identity. The edge is not attached anywhere.
    pub fn new_edge(&mut self, target: NodeId, label: EdgeLabel) -> Edge {
        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        Edge { id, target, label }
    }

    /// Create and append an edge between two member nodes
    pub fn connect(&mut self, from: NodeId, to: NodeId, label: EdgeLabel) -> Result<Edge> {
        let edge = self.new_edge(to, label);
        self.add_edge(from, edge)?;
        Ok(edge)
    }

    /// Append an existing edge to the successor list of `from`
    pub fn add_edge(&mut self, from: NodeId, edge: Edge) -> Result<()> {
        self.ensure_member(from)?;
        self.ensure_member(edge.target)?;
        self.entry_mut(from)?.successors.push(edge);
        Ok(())
    }

    /// Append an edge without membership checks, for building detached fragments
    pub(crate) fn attach_detached(&mut self, from: NodeId, edge: Edge) -> Result<()> {
        self.entry(edge.target)?;
        self.entry_mut(from)?.successors.push(edge);
        Ok(())
    }

    /// Insert an edge at a position in the successor list of `from`
    pub fn insert_edge(&mut self, from: NodeId, position: usize, edge: Edge) -> Result<()> {
        self.ensure_member(from)?;
        self.ensure_member(edge.target)?;
        let successors = &mut self.entry_mut(from)?.successors;
        if position > successors.len() {
            return Err(GraphError::EdgePositionOutOfRange { node: from, position });
        }
        successors.insert(position, edge);
        Ok(())
    }

    /// Replace the edge at a position in the successor list of `from`,
    /// returning the edge that was there.
    pub fn set_edge(&mut self, from: NodeId, position: usize, edge: Edge) -> Result<Edge> {
        self.ensure_member(from)?;
        self.ensure_member(edge.target)?;
        let successors = &mut self.entry_mut(from)?.successors;
        match successors.get_mut(position) {
            Some(slot) => Ok(std::mem::replace(slot, edge)),
            None => Err(GraphError::EdgePositionOutOfRange { node: from, position }),
        }
    }

    /// Remove an edge by identity from the successor list of `from`.
    ///
    /// Returns `false` if the node holds no such edge.
    pub fn remove_edge(&mut self, from: NodeId, edge: EdgeId) -> Result<bool> {
        let successors = &mut self.entry_mut(from)?.successors;
        match successors.iter().position(|candidate| candidate.id == edge) {
            Some(position) => {
                successors.remove(position);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove every edge from `from` to `target`, member or not.
    pub fn remove_edges_to(&mut self, from: NodeId, target: NodeId) -> Result<Vec<Edge>> {
        let successors = &mut self.entry_mut(from)?.successors;
        let removed = successors
            .iter()
            .filter(|edge| edge.target == target)
            .copied()
            .collect();
        successors.retain(|edge| edge.target != target);
        Ok(removed)
    }

    /// Update the label of an edge wherever it is attached.
    ///
    /// The same edge may sit both on a member and on a detached node; both
    /// copies share the label. Fails if no copy of the edge exists.
    pub fn update_label(&mut self, edge: EdgeId, update: impl Fn(&mut EdgeLabel)) -> Result<()> {
        let mut found = false;
        for entry in self.entries.values_mut() {
            for candidate in entry.successors.iter_mut().filter(|e| e.id == edge) {
                update(&mut candidate.label);
                found = true;
            }
        }
        if found {
            Ok(())
        } else {
            Err(GraphError::UnknownEdge(edge))
        }
    }

    /// Incoming edges of a node, one per predecessor, in canonical order.
    ///
    /// For each member source only its first edge to `node` is reported.
    pub fn predecessor_edges(&self, node: NodeId) -> Result<Vec<PredecessorEdge>> {
        self.entry(node)?;
        let mut result = Vec::new();
        for &source in &self.order {
            let successors = &self.entry(source)?.successors;
            if let Some((position, edge)) = successors
                .iter()
                .enumerate()
                .find(|(_, edge)| edge.target == node)
            {
                result.push(PredecessorEdge {
                    source,
                    edge: *edge,
                    position,
                });
            }
        }
        Ok(result)
    }

    /// Predecessor nodes in canonical order
    pub fn predecessors(&self, node: NodeId) -> Result<Vec<NodeId>> {
        Ok(self
            .predecessor_edges(node)?
            .into_iter()
            .map(|pred| pred.source)
            .collect())
    }

    /// Whether `from` holds an edge to `to`
    pub fn has_edge(&self, from: NodeId, to: NodeId) -> Result<bool> {
        Ok(self.successors(from)?.iter().any(|edge| edge.target == to))
    }

    /// Member edges as `(source, edge)` pairs in canonical order
    pub fn edges(&self) -> Vec<(NodeId, Edge)> {
        self.order
            .iter()
            .filter_map(|node| self.entries.get(node).map(|entry| (*node, entry)))
            .flat_map(|(node, entry)| entry.successors.iter().map(move |edge| (node, *edge)))
            .collect()
    }

    /// Reorder the member list. `order` must be a permutation of the members.
    pub(crate) fn set_order(&mut self, order: Vec<NodeId>) {
        debug_assert_eq!(order.len(), self.order.len());
        self.order = order;
    }
}
