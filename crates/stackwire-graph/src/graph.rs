//! Dependency graph management using `petgraph`.
//!
//! Holds one node per logical id and one edge per "must be realized after"
//! relationship, then produces a deterministic topological ordering.
//!
//! Cycles are found first by a depth-first traversal with three-color
//! marking so the error can name the exact cycle. Ordering then runs Kahn's
//! algorithm over a min-ordered ready set, which breaks ties between
//! independent descriptors by ascending logical id.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use stackwire_common::error::{Result, StackwireError};
use stackwire_common::types::{LogicalId, StackId};

/// How an edge entered the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Declared with `depends_on` or `add_dependency`.
    Explicit,
    /// Implied by a `Ref` or `GetAtt` in a property.
    Inferred,
}

/// A dependency graph over borrowed logical ids.
///
/// Edges point from the dependent to its dependency.
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    stack: &'a StackId,
    graph: DiGraphMap<&'a LogicalId, EdgeKind>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

impl<'a> DependencyGraph<'a> {
    /// Creates an empty dependency graph for `stack`.
    #[must_use]
    pub fn new(stack: &'a StackId) -> Self {
        Self {
            stack,
            graph: DiGraphMap::new(),
        }
    }

    /// Adds a descriptor node.
    pub fn add_node(&mut self, id: &'a LogicalId) {
        let _ = self.graph.add_node(id);
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    ///
    /// An explicit edge is never downgraded to an inferred one.
    pub fn add_dependency(&mut self, dependent: &'a LogicalId, dependency: &'a LogicalId, kind: EdgeKind) {
        let kind = match self.graph.edge_weight(dependent, dependency) {
            Some(EdgeKind::Explicit) => EdgeKind::Explicit,
            _ => kind,
        };
        let _ = self.graph.add_edge(dependent, dependency, kind);
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Direct dependencies of `id`, sorted.
    #[must_use]
    pub fn dependencies_of(&self, id: &'a LogicalId) -> Vec<&'a LogicalId> {
        let mut deps: Vec<_> = self
            .graph
            .neighbors_directed(id, Direction::Outgoing)
            .collect();
        deps.sort();
        deps
    }

    /// Returns the first cycle found, listing each member once in traversal
    /// order, or `None` if the graph is acyclic.
    ///
    /// Roots and neighbors are visited in ascending id order so the reported
    /// cycle is stable across runs.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<LogicalId>> {
        let mut marks: HashMap<&LogicalId, Mark> = HashMap::with_capacity(self.len());
        let mut path: Vec<&LogicalId> = Vec::new();
        for root in self.sorted_nodes() {
            if marks.contains_key(root) {
                continue;
            }
            if let Some(cycle) = self.visit(root, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    fn visit(
        &self,
        node: &'a LogicalId,
        marks: &mut HashMap<&'a LogicalId, Mark>,
        path: &mut Vec<&'a LogicalId>,
    ) -> Option<Vec<LogicalId>> {
        let _ = marks.insert(node, Mark::InProgress);
        path.push(node);
        for dep in self.dependencies_of(node) {
            match marks.get(dep) {
                Some(Mark::InProgress) => {
                    let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                    return Some(path[start..].iter().map(|n| (*n).clone()).collect());
                }
                Some(Mark::Done) => {}
                None => {
                    if let Some(cycle) = self.visit(dep, marks, path) {
                        return Some(cycle);
                    }
                }
            }
        }
        let _ = path.pop();
        let _ = marks.insert(node, Mark::Done);
        None
    }

    /// Returns a topological ordering: every dependency precedes its
    /// dependents, and among descriptors that are ready at the same time the
    /// smallest logical id comes first.
    ///
    /// # Errors
    ///
    /// Returns [`StackwireError::DependencyCycle`] naming the full cycle if
    /// the graph is not acyclic.
    pub fn resolve_order(&self) -> Result<Vec<&'a LogicalId>> {
        if let Some(cycle) = self.find_cycle() {
            return Err(StackwireError::DependencyCycle {
                stack: self.stack.clone(),
                cycle,
            });
        }

        let mut pending: HashMap<&LogicalId, usize> = self
            .graph
            .nodes()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Outgoing).count()))
            .collect();
        let mut ready: BinaryHeap<Reverse<&LogicalId>> = pending
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&n, _)| Reverse(n))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(current)) = ready.pop() {
            order.push(current);
            for dependent in self.graph.neighbors_directed(current, Direction::Incoming) {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(dependent));
                    }
                }
            }
        }
        Ok(order)
    }

    fn sorted_nodes(&self) -> Vec<&'a LogicalId> {
        let mut nodes: Vec<_> = self.graph.nodes().collect();
        nodes.sort();
        nodes
    }
}
