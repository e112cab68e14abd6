//! Traversals over a [`WorkflowGraph`]: depth-first search, reachability,
//! stable topological sort and connected-component decomposition.

use std::collections::{HashMap, HashSet};

use crate::error::{GraphError, Result};
use crate::graph::WorkflowGraph;
use crate::types::{EdgeLabel, NodeId};

#[derive(Debug)]
struct SortMark {
    flag: isize,
    rank: usize,
    component: Option<usize>,
    dependencies: Vec<(EdgeLabel, NodeId)>,
}

/// Disjoint components of sink ranks. A merged component keeps the higher rank.
#[derive(Debug, Default)]
struct RankForest {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl RankForest {
    fn make(&mut self, rank: usize) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.rank.push(rank);
        id
    }

    fn find(&mut self, mut id: usize) -> usize {
        while self.parent[id] != id {
            self.parent[id] = self.parent[self.parent[id]];
            id = self.parent[id];
        }
        id
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return a;
        }
        let (high, low) = if self.rank[a] > self.rank[b] { (a, b) } else { (b, a) };
        self.parent[low] = high;
        high
    }
}

impl<T> WorkflowGraph<T> {
    /// Post-order depth-first search from `start`, skipping nodes already in
    /// `visited`. Successors are explored in successor-list order.
    pub(crate) fn dfs_from(
        &self,
        start: NodeId,
        visited: &mut HashSet<NodeId>,
    ) -> Result<Vec<NodeId>> {
        let mut result = Vec::new();
        if visited.contains(&start) {
            return Ok(result);
        }

        let mut emitted = HashSet::new();
        let mut stack = vec![start];
        while let Some(&current) = stack.last() {
            if visited.insert(current) {
                for edge in self.successors(current)?.iter().rev() {
                    if !visited.contains(&edge.target) {
                        stack.push(edge.target);
                    }
                }
            } else {
                stack.pop();
                if emitted.insert(current) {
                    result.push(current);
                }
            }
        }
        Ok(result)
    }

    /// All nodes reachable from `start`, including `start`, in post-order.
    pub fn depth_first_search(&self, start: NodeId) -> Result<Vec<NodeId>> {
        self.dfs_from(start, &mut HashSet::new())
    }

    /// Whether `to` can be reached from `from` following successor edges.
    pub fn is_reachable(&self, from: NodeId, to: NodeId) -> Result<bool> {
        Ok(self.depth_first_search(from)?.contains(&to))
    }

    /// Member nodes with no incoming edges, in canonical order
    pub fn sources(&self) -> Vec<NodeId> {
        let targets: HashSet<NodeId> = self
            .edges()
            .into_iter()
            .map(|(_, edge)| edge.target)
            .collect();
        self.nodes()
            .iter()
            .copied()
            .filter(|node| !targets.contains(node))
            .collect()
    }

    /// Member nodes with no outgoing edges, in canonical order
    pub fn sinks(&self) -> Vec<NodeId> {
        self.nodes()
            .iter()
            .copied()
            .filter(|node| self.successors(*node).map_or(false, |s| s.is_empty()))
            .collect()
    }

    /// Stable topological order of the member nodes.
    ///
    /// The order depends only on the relative order of the sinks and on the
    /// edge labels: connected components are ordered by their first sink,
    /// and predecessors of a node are laid out by ascending argument index.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>> {
        let count = self.len();
        let mut root_indices = HashMap::new();
        for (index, &node) in self.nodes().iter().enumerate() {
            if self.successors(node)?.is_empty() {
                root_indices.insert(node, index);
            }
        }

        let mut marks: HashMap<NodeId, SortMark> = HashMap::with_capacity(count);
        let mut forest = RankForest::default();
        let mut roots: Vec<NodeId> = Vec::new();
        let mut stack: Vec<(NodeId, usize)> = Vec::new();

        for &start in self.nodes() {
            if marks.contains_key(&start) {
                continue;
            }

            stack.push((start, 0));
            while let Some((current, index)) = stack.pop() {
                if index == 0 {
                    marks.insert(
                        current,
                        SortMark {
                            flag: -1,
                            rank: 0,
                            component: None,
                            dependencies: Vec::new(),
                        },
                    );
                }

                let successors = self.successors(current)?;
                if index >= successors.len() {
                    if successors.is_empty() {
                        let root_index = *root_indices
                            .get(&current)
                            .ok_or(GraphError::NotInGraph(current))?;
                        let rank = count - root_index;
                        let component = forest.make(rank);
                        if let Some(mark) = marks.get_mut(&current) {
                            mark.flag = 0;
                            mark.rank = rank;
                            mark.component = Some(component);
                        }
                        roots.push(current);
                    } else {
                        if let Some(mark) = marks.get_mut(&current) {
                            mark.flag = successors.len() as isize;
                        }
                        for edge in successors {
                            add_dependency(&mut marks, &mut forest, edge.target, edge.label, current)?;
                        }
                    }
                } else {
                    stack.push((current, index + 1));
                    let successor = successors[index].target;
                    match marks.get(&successor) {
                        Some(mark) if mark.flag == -1 => return Err(GraphError::CycleDetected),
                        Some(_) => {}
                        None => stack.push((successor, 0)),
                    }
                }
            }
        }

        let mut keyed_roots = Vec::with_capacity(roots.len());
        for root in roots {
            let mark = &marks[&root];
            let (component, rank) = (mark.component.unwrap_or_default(), mark.rank);
            let component = forest.find(component);
            keyed_roots.push(((forest.rank[component], rank), root));
        }
        keyed_roots.sort_by_key(|(key, _)| *key);

        let mut result = Vec::with_capacity(count);
        let mut pending = Vec::new();
        for (_, root) in keyed_roots {
            pending.push(root);
            while let Some(current) = pending.pop() {
                let Some(mark) = marks.get_mut(&current) else {
                    continue;
                };
                mark.flag -= 1;
                if mark.flag <= 0 {
                    result.push(current);
                    mark.dependencies.sort_by_key(|(label, _)| *label);
                    pending.extend(mark.dependencies.iter().map(|(_, node)| *node));
                }
            }
        }

        result.reverse();
        Ok(result)
    }

    /// Whether the graph has no cycles
    pub fn is_acyclic(&self) -> bool {
        self.topological_sort().is_ok()
    }

    /// Reorder the member list into topological order
    pub fn sort_topologically(&mut self) -> Result<()> {
        let order = self.topological_sort()?;
        self.set_order(order);
        Ok(())
    }

    /// Weakly connected components, each in topological order.
    ///
    /// Scans the topological order keeping an open set of successors not yet
    /// visited; a component closes at a sink once the open set is empty.
    pub fn connected_components(&self) -> Result<Vec<Vec<NodeId>>> {
        let mut components = Vec::new();
        let mut current = Vec::new();
        let mut open = HashSet::new();
        for node in self.topological_sort()? {
            current.push(node);
            open.remove(&node);
            let successors = self.successors(node)?;
            open.extend(successors.iter().map(|edge| edge.target));
            if successors.is_empty() && open.is_empty() {
                components.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            components.push(current);
        }
        Ok(components)
    }

    /// The connected component containing `node`
    pub fn component_of(&self, node: NodeId) -> Result<Vec<NodeId>> {
        Ok(self
            .connected_components()?
            .into_iter()
            .find(|component| component.contains(&node))
            .unwrap_or_default())
    }
}

fn add_dependency(
    marks: &mut HashMap<NodeId, SortMark>,
    forest: &mut RankForest,
    successor: NodeId,
    label: EdgeLabel,
    dependency: NodeId,
) -> Result<()> {
    let successor_mark = marks
        .get_mut(&successor)
        .ok_or(GraphError::NodeNotFound(successor))?;
    successor_mark.dependencies.push((label, dependency));
    let successor_component = successor_mark
        .component
        .ok_or(GraphError::CycleDetected)?;

    let dependency_mark = marks
        .get_mut(&dependency)
        .ok_or(GraphError::NodeNotFound(dependency))?;
    match dependency_mark.component {
        None => dependency_mark.component = Some(successor_component),
        Some(component) => {
            let merged = forest.union(component, successor_component);
            dependency_mark.component = Some(merged);
        }
    }
    Ok(())
}
