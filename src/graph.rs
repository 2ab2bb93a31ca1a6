//! Directed acyclic graphs and partially directed graphs over variable indices.
//!
//! Nodes are the integers `0..num_nodes`, matching the column indices of the [`Dataset`] being
//! learned from. These graphs are small and dense enough that plain index arithmetic beats any
//! general-purpose graph library.
//!
//! [`Dataset`]: crate::Dataset

use crate::error::{Error, Result};
use crate::{Variable, VariableSet};
use std::collections::VecDeque;
use std::iter;

/// A directed acyclic graph.
///
/// Every mutation is checked, so a `Dag` can never hold a self-loop, a duplicate edge, a pair of
/// opposite edges, or a directed cycle.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Dag {
    parents: Vec<VariableSet>,
    children: Vec<VariableSet>,
}

impl Dag {
    /// Creates a graph with `num_nodes` nodes and no edges.
    pub fn new(num_nodes: usize) -> Self {
        Dag {
            parents: vec![VariableSet::empty(); num_nodes],
            children: vec![VariableSet::empty(); num_nodes],
        }
    }

    /// Creates a graph from a list of edges, failing if any of them is invalid or if together
    /// they form a cycle.
    ///
    /// ```
    /// use bnstructure::Dag;
    ///
    /// let dag = Dag::from_edges(3, vec![(0, 2), (1, 2)]).unwrap();
    /// assert_eq!(dag.parents(2).as_slice(), &[0, 1]);
    /// assert!(Dag::from_edges(3, vec![(0, 1), (1, 2), (2, 0)]).is_err());
    /// ```
    pub fn from_edges<I>(num_nodes: usize, edges: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Variable, Variable)>,
    {
        let mut dag = Dag::new(num_nodes);
        for (from, to) in edges {
            dag.add_edge(from, to)?;
        }
        Ok(dag)
    }

    /// Builds a graph from edges already known to be valid and acyclic.
    pub(crate) fn from_acyclic_edges(num_nodes: usize, edges: &[(Variable, Variable)]) -> Self {
        let mut dag = Dag::new(num_nodes);
        for &(from, to) in edges {
            dag.insert(from, to);
        }
        dag
    }

    /// The number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.parents.len()
    }

    /// The number of edges.
    pub fn num_edges(&self) -> usize {
        self.parents.iter().map(VariableSet::len).sum()
    }

    /// The parents of a node.
    pub fn parents(&self, node: Variable) -> &VariableSet {
        &self.parents[node]
    }

    /// The children of a node.
    pub fn children(&self, node: Variable) -> &VariableSet {
        &self.children[node]
    }

    /// The number of parents of a node.
    pub fn in_degree(&self, node: Variable) -> usize {
        self.parents[node].len()
    }

    /// Returns `true` if the edge `from -> to` is present.
    pub fn has_edge(&self, from: Variable, to: Variable) -> bool {
        self.children[from].contains(to)
    }

    /// Returns `true` if there's an edge between the two nodes in either direction.
    pub fn is_adjacent(&self, a: Variable, b: Variable) -> bool {
        self.has_edge(a, b) || self.has_edge(b, a)
    }

    /// Iterates over every edge, sorted by source and then by target.
    pub fn edges(&self) -> impl Iterator<Item = (Variable, Variable)> + '_ {
        self.children
            .iter()
            .enumerate()
            .flat_map(|(from, children)| children.iter().map(move |to| (from, to)))
    }

    fn check_nodes(&self, from: Variable, to: Variable) -> Result<()> {
        let n = self.num_nodes();
        if from >= n || to >= n {
            return Err(Error::InvalidEdge {
                from,
                to,
                reason: "node out of range",
            });
        }
        if from == to {
            return Err(Error::InvalidEdge {
                from,
                to,
                reason: "self-loop",
            });
        }
        Ok(())
    }

    fn insert(&mut self, from: Variable, to: Variable) {
        self.parents[to] = self.parents[to].with(from);
        self.children[from] = self.children[from].with(to);
    }

    fn delete(&mut self, from: Variable, to: Variable) {
        self.parents[to] = self.parents[to].without(from);
        self.children[from] = self.children[from].without(to);
    }

    /// Adds the edge `from -> to`.
    pub fn add_edge(&mut self, from: Variable, to: Variable) -> Result<()> {
        self.check_nodes(from, to)?;
        if self.is_adjacent(from, to) {
            return Err(Error::InvalidEdge {
                from,
                to,
                reason: "nodes are already adjacent",
            });
        }
        if self.has_path(to, from) {
            return Err(Error::Cycle { from, to });
        }
        self.insert(from, to);
        Ok(())
    }

    /// Removes the edge `from -> to`.
    pub fn remove_edge(&mut self, from: Variable, to: Variable) -> Result<()> {
        self.check_nodes(from, to)?;
        if !self.has_edge(from, to) {
            return Err(Error::InvalidEdge {
                from,
                to,
                reason: "no such edge",
            });
        }
        self.delete(from, to);
        Ok(())
    }

    /// Replaces the edge `from -> to` with `to -> from`.
    pub fn reverse_edge(&mut self, from: Variable, to: Variable) -> Result<()> {
        self.check_nodes(from, to)?;
        if !self.has_edge(from, to) {
            return Err(Error::InvalidEdge {
                from,
                to,
                reason: "no such edge",
            });
        }
        if self.has_indirect_path(from, to) {
            return Err(Error::Cycle { from: to, to: from });
        }
        self.delete(from, to);
        self.insert(to, from);
        Ok(())
    }

    /// Returns `true` if a directed path leads from `from` to `to`. Every node has a trivial
    /// path to itself.
    pub fn has_path(&self, from: Variable, to: Variable) -> bool {
        self.reaches(self.children[from].iter().chain(iter::once(from)), to)
    }

    /// Returns `true` if a directed path of length two or more leads from `from` to `to`, which
    /// is exactly the condition under which reversing the edge `from -> to` would close a cycle.
    pub fn has_indirect_path(&self, from: Variable, to: Variable) -> bool {
        self.reaches(self.children[from].iter().filter(|&c| c != to), to)
    }

    fn reaches<I: Iterator<Item = Variable>>(&self, start: I, target: Variable) -> bool {
        let mut seen = vec![false; self.num_nodes()];
        let mut stack: Vec<Variable> = start.collect();
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if !seen[node] {
                seen[node] = true;
                stack.extend(self.children[node].iter().filter(|&c| !seen[c]));
            }
        }
        false
    }

    /// Returns the nodes in an order where every parent precedes its children. Among nodes that
    /// are ready at the same time, the smallest index goes first.
    pub fn topological_order(&self) -> Vec<Variable> {
        let mut pending: Vec<usize> = self.parents.iter().map(VariableSet::len).collect();
        let mut ready: Vec<Variable> = (0..self.num_nodes())
            .rev()
            .filter(|&v| pending[v] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.num_nodes());
        while let Some(node) = ready.pop() {
            order.push(node);
            for child in self.children[node].iter() {
                pending[child] -= 1;
                if pending[child] == 0 {
                    let at = ready.partition_point(|&r| r > child);
                    ready.insert(at, child);
                }
            }
        }
        debug_assert_eq!(order.len(), self.num_nodes());
        order
    }

    /// Every node that has a directed path to some node in `nodes`, including `nodes` themselves.
    pub fn ancestors(&self, nodes: &VariableSet) -> VariableSet {
        let mut seen = vec![false; self.num_nodes()];
        let mut stack: Vec<Variable> = nodes.iter().collect();
        while let Some(node) = stack.pop() {
            if !seen[node] {
                seen[node] = true;
                stack.extend(self.parents[node].iter());
            }
        }
        (0..self.num_nodes()).filter(|&v| seen[v]).collect()
    }

    /// Returns `true` if every path between `x` and `y` is blocked by `given`.
    ///
    /// This is the "reachable" procedure from Koller & Friedman (algorithm 3.1): walk from `x`
    /// along trails that are active given `given`, tracking whether each node was entered from a
    /// child (moving up) or from a parent (moving down).
    ///
    /// ```
    /// use bnstructure::{Dag, VariableSet};
    ///
    /// // 0 -> 2 <- 1: a collider blocks the path until it's observed.
    /// let dag = Dag::from_edges(3, vec![(0, 2), (1, 2)]).unwrap();
    /// assert!(dag.is_d_separated(0, 1, &VariableSet::empty()));
    /// assert!(!dag.is_d_separated(0, 1, &VariableSet::new(&[2])));
    /// ```
    pub fn is_d_separated(&self, x: Variable, y: Variable, given: &VariableSet) -> bool {
        let observed_ancestors = self.ancestors(given);

        // Index 0 means "arrived from a child", index 1 means "arrived from a parent".
        let mut visited = vec![[false; 2]; self.num_nodes()];
        let mut queue = VecDeque::new();
        queue.push_back((x, 0));

        while let Some((node, from_parent)) = queue.pop_front() {
            if visited[node][from_parent] {
                continue;
            }
            visited[node][from_parent] = true;

            let observed = given.contains(node);
            if node == y && !observed {
                return false;
            }

            if from_parent == 0 && !observed {
                queue.extend(self.parents[node].iter().map(|p| (p, 0)));
                queue.extend(self.children[node].iter().map(|c| (c, 1)));
            } else if from_parent == 1 {
                if !observed {
                    queue.extend(self.children[node].iter().map(|c| (c, 1)));
                }
                if observed_ancestors.contains(node) {
                    queue.extend(self.parents[node].iter().map(|p| (p, 0)));
                }
            }
        }
        true
    }

    /// Every collider `a -> c <- b` where `a` and `b` are not adjacent, as `(a, c, b)` with
    /// `a < b`.
    pub fn v_structures(&self) -> Vec<(Variable, Variable, Variable)> {
        let mut found = Vec::new();
        for (collider, parents) in self.parents.iter().enumerate() {
            for pair in parents.subsets(2) {
                let (a, b) = (pair.as_slice()[0], pair.as_slice()[1]);
                if !self.is_adjacent(a, b) {
                    found.push((a, collider, b));
                }
            }
        }
        found
    }

    /// The undirected graph with an edge wherever this graph has one in either direction.
    pub fn skeleton(&self) -> Pdag {
        let mut skeleton = Pdag::new(self.num_nodes());
        for (from, to) in self.edges() {
            skeleton.add_undirected(from, to);
        }
        skeleton
    }

    /// The partially directed graph with every edge of this graph fixed in its direction.
    pub fn to_pdag(&self) -> Pdag {
        let mut pdag = Pdag::new(self.num_nodes());
        for (from, to) in self.edges() {
            pdag.add_directed(from, to);
        }
        pdag
    }
}

impl std::fmt::Debug for Dag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dag")
            .field("num_nodes", &self.num_nodes())
            .field("edges", &self.edges().collect::<Vec<_>>())
            .finish()
    }
}

/// A partially directed graph.
///
/// Each ordered pair of nodes has an arc bit. An edge present in only one direction is directed;
/// an edge present in both directions is undirected, meaning its orientation is not determined.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Pdag {
    num_nodes: usize,
    arcs: Vec<bool>,
}

impl Pdag {
    /// Creates a graph with `num_nodes` nodes and no edges.
    pub fn new(num_nodes: usize) -> Self {
        Pdag {
            num_nodes,
            arcs: vec![false; num_nodes * num_nodes],
        }
    }

    /// Creates the complete undirected graph.
    pub fn complete(num_nodes: usize) -> Self {
        let mut pdag = Pdag::new(num_nodes);
        for a in 0..num_nodes {
            for b in a + 1..num_nodes {
                pdag.add_undirected(a, b);
            }
        }
        pdag
    }

    /// The number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    fn arc(&self, from: Variable, to: Variable) -> bool {
        self.arcs[from * self.num_nodes + to]
    }

    fn set_arc(&mut self, from: Variable, to: Variable, present: bool) {
        self.arcs[from * self.num_nodes + to] = present;
    }

    /// Returns `true` if the nodes are joined by an edge of any kind.
    pub fn is_adjacent(&self, a: Variable, b: Variable) -> bool {
        self.arc(a, b) || self.arc(b, a)
    }

    /// Returns `true` if the edge `from -> to` is present and directed.
    pub fn is_directed(&self, from: Variable, to: Variable) -> bool {
        self.arc(from, to) && !self.arc(to, from)
    }

    /// Returns `true` if the nodes are joined by an undirected edge.
    pub fn is_undirected(&self, a: Variable, b: Variable) -> bool {
        self.arc(a, b) && self.arc(b, a)
    }

    /// Adds an undirected edge, replacing any directed edge between the nodes.
    pub fn add_undirected(&mut self, a: Variable, b: Variable) {
        debug_assert_ne!(a, b);
        self.set_arc(a, b, true);
        self.set_arc(b, a, true);
    }

    /// Adds the directed edge `from -> to`, replacing any edge between the nodes.
    pub fn add_directed(&mut self, from: Variable, to: Variable) {
        debug_assert_ne!(from, to);
        self.set_arc(from, to, true);
        self.set_arc(to, from, false);
    }

    /// Removes whatever edge joins the nodes.
    pub fn remove_edge(&mut self, a: Variable, b: Variable) {
        self.set_arc(a, b, false);
        self.set_arc(b, a, false);
    }

    /// Turns the undirected edge `from - to` into `from -> to`.
    pub fn orient(&mut self, from: Variable, to: Variable) {
        debug_assert!(self.is_undirected(from, to));
        self.set_arc(to, from, false);
    }

    /// Every node joined to `node` by an edge of any kind, in ascending order.
    pub fn neighbors(&self, node: Variable) -> VariableSet {
        (0..self.num_nodes)
            .filter(|&other| self.is_adjacent(node, other))
            .collect()
    }

    /// Every node joined to `node` by an undirected edge, in ascending order.
    pub fn undirected_neighbors(&self, node: Variable) -> VariableSet {
        (0..self.num_nodes)
            .filter(|&other| self.is_undirected(node, other))
            .collect()
    }

    /// Every node with a directed edge into `node`.
    pub fn parents(&self, node: Variable) -> VariableSet {
        (0..self.num_nodes)
            .filter(|&other| self.is_directed(other, node))
            .collect()
    }

    /// Every node with a directed edge out of `node`.
    pub fn children(&self, node: Variable) -> VariableSet {
        (0..self.num_nodes)
            .filter(|&other| self.is_directed(node, other))
            .collect()
    }

    /// Every directed edge, sorted by source and then by target.
    pub fn directed_edges(&self) -> Vec<(Variable, Variable)> {
        let n = self.num_nodes;
        (0..n)
            .flat_map(|a| (0..n).map(move |b| (a, b)))
            .filter(|&(a, b)| self.is_directed(a, b))
            .collect()
    }

    /// Every undirected edge as `(a, b)` with `a < b`, sorted.
    pub fn undirected_edges(&self) -> Vec<(Variable, Variable)> {
        let n = self.num_nodes;
        (0..n)
            .flat_map(|a| (a + 1..n).map(move |b| (a, b)))
            .filter(|&(a, b)| self.is_undirected(a, b))
            .collect()
    }

    /// The number of edges of either kind.
    pub fn num_edges(&self) -> usize {
        self.directed_edges().len() + self.undirected_edges().len()
    }

    /// Returns `true` if a path of directed edges leads from `from` to `to`.
    pub fn has_directed_path(&self, from: Variable, to: Variable) -> bool {
        let mut seen = vec![false; self.num_nodes];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !seen[node] {
                seen[node] = true;
                stack.extend(self.children(node).iter().filter(|&c| !seen[c]));
            }
        }
        false
    }

    /// Converts a fully directed graph into a [`Dag`].
    ///
    /// Fails if any edge is still undirected or if the directed edges form a cycle.
    pub fn to_dag(&self) -> Result<Dag> {
        if let Some(&(from, to)) = self.undirected_edges().first() {
            return Err(Error::InvalidEdge {
                from,
                to,
                reason: "edge is not oriented",
            });
        }
        Dag::from_edges(self.num_nodes, self.directed_edges())
    }
}

impl std::fmt::Debug for Pdag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pdag")
            .field("num_nodes", &self.num_nodes)
            .field("directed", &self.directed_edges())
            .field("undirected", &self.undirected_edges())
            .finish()
    }
}

/// Returns `true` if the edges admit a topological order, by repeatedly removing nodes with no
/// remaining incoming edges.
pub(crate) fn is_acyclic(num_nodes: usize, edges: &[(Variable, Variable)]) -> bool {
    let mut in_degree = vec![0usize; num_nodes];
    for &(_, to) in edges {
        in_degree[to] += 1;
    }
    let mut ready: Vec<Variable> = (0..num_nodes).filter(|&v| in_degree[v] == 0).collect();
    let mut removed = 0;
    while let Some(node) = ready.pop() {
        removed += 1;
        for &(from, to) in edges {
            if from == node {
                in_degree[to] -= 1;
                if in_degree[to] == 0 {
                    ready.push(to);
                }
            }
        }
    }
    removed == num_nodes
}
