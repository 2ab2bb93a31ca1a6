//! Score-based structure search.
//!
//! [`ExhaustiveSearch`] scores every DAG over the variables and is only feasible for a handful
//! of them; the number of DAGs grows super-exponentially (25 DAGs on three nodes, 29,281 on five,
//! over a billion on eight). [`HillClimbSearch`] instead walks from graph to graph one edge edit
//! at a time, which scales to many more variables but stops at the first local optimum.

use crate::error::{Error, Result};
use crate::graph::{is_acyclic, Dag};
use crate::score::Scorer;
use crate::{Variable, VariableSet};
use log::{debug, info};
use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

/// Edge subsets are enumerated as bitmasks over the `n * (n - 1)` possible directed edges, so
/// this is the most that fits in a `u64`.
pub const MAX_ENUMERABLE_VARIABLES: usize = 8;

/// The default cap on how many variables [`ExhaustiveSearch`] will accept.
pub const DEFAULT_MAX_VARIABLES: usize = 5;

/// Iterates over every DAG on `num_nodes` nodes.
///
/// The order is fixed: candidate edges are numbered `(0, 1), (0, 2), …, (1, 0), (1, 2), …`, and
/// edge subsets are visited in increasing order of the bitmask of selected edges. Subsets with a
/// directed cycle are skipped.
///
/// # Panics
///
/// Panics if `num_nodes` exceeds [`MAX_ENUMERABLE_VARIABLES`].
///
/// ```
/// use bnstructure::search::all_dags;
///
/// assert_eq!(all_dags(2).count(), 3);
/// assert_eq!(all_dags(3).count(), 25);
/// assert_eq!(all_dags(4).count(), 543);
/// ```
pub fn all_dags(num_nodes: usize) -> impl Iterator<Item = Dag> {
    assert!(num_nodes <= MAX_ENUMERABLE_VARIABLES);
    let candidates: Vec<(Variable, Variable)> = (0..num_nodes)
        .flat_map(|from| {
            (0..num_nodes)
                .filter(move |&to| to != from)
                .map(move |to| (from, to))
        })
        .collect();

    let mut selected = Vec::with_capacity(candidates.len());
    (0..1u64 << candidates.len()).filter_map(move |mask| {
        selected.clear();
        selected.extend(
            candidates
                .iter()
                .enumerate()
                .filter(|(bit, _)| mask & (1u64 << bit) != 0)
                .map(|(_, &edge)| edge),
        );
        if is_acyclic(num_nodes, &selected) {
            Some(Dag::from_acyclic_edges(num_nodes, &selected))
        } else {
            None
        }
    })
}

/// Scores every DAG over the dataset's variables.
pub struct ExhaustiveSearch<'s, 'a> {
    scorer: &'s Scorer<'a>,
    max_variables: usize,
    max_candidates: Option<usize>,
}

impl<'s, 'a> ExhaustiveSearch<'s, 'a> {
    /// Creates a search that will refuse datasets with more than [`DEFAULT_MAX_VARIABLES`]
    /// variables.
    pub fn new(scorer: &'s Scorer<'a>) -> Self {
        ExhaustiveSearch {
            scorer,
            max_variables: DEFAULT_MAX_VARIABLES,
            max_candidates: None,
        }
    }

    /// Raises or lowers the variable limit. It can't go above [`MAX_ENUMERABLE_VARIABLES`].
    pub fn max_variables(mut self, max_variables: usize) -> Self {
        self.max_variables = max_variables.min(MAX_ENUMERABLE_VARIABLES);
        self
    }

    /// Stops after scoring this many DAGs.
    pub fn max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = Some(max_candidates);
        self
    }

    /// Scores every DAG and returns them best first.
    ///
    /// Equal scores keep the enumeration order of [`all_dags`], so the ranking is deterministic.
    pub fn all_scores(&self) -> Result<Vec<(f64, Dag)>> {
        let count = self.scorer.data().num_variables();
        if count > self.max_variables {
            return Err(Error::TooManyVariables {
                count,
                limit: self.max_variables,
            });
        }

        let limit = self.max_candidates.unwrap_or(usize::MAX);
        let mut scored = Vec::new();
        let mut candidates = all_dags(count);
        while scored.len() < limit {
            let dag = match candidates.next() {
                Some(dag) => dag,
                None => break,
            };
            scored.push((self.scorer.score(&dag)?, dag));
        }
        if candidates.next().is_some() {
            info!("exhaustive search stopped after {} candidates", limit);
        }

        // sort_by is stable, which is what keeps ties in enumeration order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        debug!("scored {} DAGs", scored.len());
        Ok(scored)
    }

    /// Returns the best-scoring DAG.
    pub fn estimate(&self) -> Result<Dag> {
        let count = self.scorer.data().num_variables();
        Ok(self
            .all_scores()?
            .into_iter()
            .next()
            .map_or_else(|| Dag::new(count), |(_, dag)| dag))
    }
}

/// A single-edge edit considered by [`HillClimbSearch`].
///
/// The variant order is the tie-break order between operations on the same edge.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Operation {
    /// Add the edge `from -> to`.
    Add(Variable, Variable),
    /// Remove the edge `from -> to`.
    Remove(Variable, Variable),
    /// Replace the edge `from -> to` with `to -> from`.
    Reverse(Variable, Variable),
}

impl Operation {
    /// The operation that exactly undoes this one.
    pub fn inverse(self) -> Self {
        match self {
            Operation::Add(from, to) => Operation::Remove(from, to),
            Operation::Remove(from, to) => Operation::Add(from, to),
            Operation::Reverse(from, to) => Operation::Reverse(to, from),
        }
    }

    /// The edge this operation acts on, as `(from, to)`.
    pub fn edge(self) -> (Variable, Variable) {
        match self {
            Operation::Add(from, to)
            | Operation::Remove(from, to)
            | Operation::Reverse(from, to) => (from, to),
        }
    }

    /// Applies this operation to a graph, failing if it doesn't apply or would close a cycle.
    pub fn apply(self, dag: &mut Dag) -> Result<()> {
        match self {
            Operation::Add(from, to) => dag.add_edge(from, to),
            Operation::Remove(from, to) => dag.remove_edge(from, to),
            Operation::Reverse(from, to) => dag.reverse_edge(from, to),
        }
    }
}

/// Why a hill-climbing run stopped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Termination {
    /// No legal edit improved the score by more than the configured epsilon.
    LocalOptimum,
    /// The iteration budget ran out first.
    IterationBudget,
}

/// Everything a hill-climbing run produced.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    /// The final graph.
    pub dag: Dag,
    /// The final graph's score.
    pub score: f64,
    /// Every accepted edit, in order, starting from the initial graph.
    pub operations: Vec<Operation>,
    /// Why the search stopped.
    pub termination: Termination,
}

/// Options for [`HillClimbSearch`].
///
/// ```
/// use bnstructure::{Dag, HillClimbConfig};
///
/// let config = HillClimbConfig::default()
///     .start(Dag::from_edges(3, vec![(0, 1)]).unwrap())
///     .tabu_length(10)
///     .max_indegree(2)
///     .black_list(vec![(2, 0)])
///     .max_iterations(1000);
/// # let _ = config;
/// ```
#[derive(Clone, Debug)]
pub struct HillClimbConfig {
    start: Option<Dag>,
    tabu_length: usize,
    max_indegree: Option<usize>,
    white_list: Option<HashSet<(Variable, Variable)>>,
    black_list: HashSet<(Variable, Variable)>,
    max_iterations: Option<usize>,
    epsilon: f64,
    parent_pairs: bool,
}

impl Default for HillClimbConfig {
    fn default() -> Self {
        HillClimbConfig {
            start: None,
            tabu_length: 0,
            max_indegree: None,
            white_list: None,
            black_list: HashSet::new(),
            max_iterations: None,
            epsilon: 1e-4,
            parent_pairs: true,
        }
    }
}

impl HillClimbConfig {
    /// The graph to start from. Without one, the search starts from the empty graph.
    pub fn start(mut self, dag: Dag) -> Self {
        self.start = Some(dag);
        self
    }

    /// How many recent operations may not be undone. Zero disables the tabu list.
    pub fn tabu_length(mut self, tabu_length: usize) -> Self {
        self.tabu_length = tabu_length;
        self
    }

    /// The most parents any node may gain through the search.
    pub fn max_indegree(mut self, max_indegree: usize) -> Self {
        self.max_indegree = Some(max_indegree);
        self
    }

    /// Restricts added and reversed edges to these directed edges.
    pub fn white_list<I: IntoIterator<Item = (Variable, Variable)>>(mut self, edges: I) -> Self {
        self.white_list = Some(edges.into_iter().collect());
        self
    }

    /// Forbids adding or reversing into any of these directed edges.
    pub fn black_list<I: IntoIterator<Item = (Variable, Variable)>>(mut self, edges: I) -> Self {
        self.black_list = edges.into_iter().collect();
        self
    }

    /// Stops after accepting this many edits.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// The smallest score improvement worth taking a step for.
    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Whether to try adding two parents to one node at once when no single edit helps.
    /// Enabled by default.
    pub fn parent_pairs(mut self, parent_pairs: bool) -> Self {
        self.parent_pairs = parent_pairs;
        self
    }

    fn allows(&self, from: Variable, to: Variable) -> bool {
        !self.black_list.contains(&(from, to))
            && self
                .white_list
                .as_ref()
                .map_or(true, |white| white.contains(&(from, to)))
    }

    fn has_room(&self, dag: &Dag, node: Variable) -> bool {
        self.max_indegree
            .map_or(true, |max| dag.in_degree(node) < max)
    }
}

/// Greedy local search over single-edge edits, with an optional tabu list.
///
/// When no single edit improves the score, the search also tries adding two parents to one node
/// at once before declaring a local optimum. That extra move can be disabled with
/// [`HillClimbConfig::parent_pairs`].
pub struct HillClimbSearch<'s, 'a> {
    scorer: &'s Scorer<'a>,
    config: HillClimbConfig,
}

impl<'s, 'a> HillClimbSearch<'s, 'a> {
    /// Creates a search, checking the configuration against the scorer's dataset.
    pub fn new(scorer: &'s Scorer<'a>, config: HillClimbConfig) -> Result<Self> {
        let expected = scorer.data().num_variables();
        if let Some(start) = &config.start {
            if start.num_nodes() != expected {
                return Err(Error::GraphSize {
                    expected,
                    found: start.num_nodes(),
                });
            }
        }

        let listed = config
            .black_list
            .iter()
            .chain(config.white_list.iter().flatten());
        for &(from, to) in listed {
            if from >= expected || to >= expected || from == to {
                return Err(Error::InvalidEdge {
                    from,
                    to,
                    reason: "listed edge is not between two distinct variables",
                });
            }
        }

        Ok(HillClimbSearch { scorer, config })
    }

    /// Runs the search and returns the final graph.
    pub fn estimate(&self) -> Result<Dag> {
        Ok(self.climb()?.dag)
    }

    /// Runs the search and returns the final graph along with the path taken to reach it.
    pub fn climb(&self) -> Result<SearchOutcome> {
        let config = &self.config;
        let mut dag = config
            .start
            .clone()
            .unwrap_or_else(|| Dag::new(self.scorer.data().num_variables()));
        let mut tabu = VecDeque::with_capacity(config.tabu_length);
        let mut operations = Vec::new();

        let termination = loop {
            if config
                .max_iterations
                .map_or(false, |max| operations.len() >= max)
            {
                break Termination::IterationBudget;
            }

            let pair_fits = config
                .max_iterations
                .map_or(true, |max| operations.len() + 2 <= max);
            let (step, delta) = match self.best_operation(&dag, &tabu)? {
                Some((operation, delta)) if delta > config.epsilon => (vec![operation], delta),
                _ if config.parent_pairs && pair_fits => {
                    match self.best_parent_pair(&dag, &tabu)? {
                        Some((pair, delta)) if delta > config.epsilon => (pair.to_vec(), delta),
                        _ => break Termination::LocalOptimum,
                    }
                }
                _ => break Termination::LocalOptimum,
            };

            debug!(
                "step {}: {:?} improves score by {}",
                operations.len() + 1,
                step,
                delta
            );
            for operation in step {
                operation.apply(&mut dag)?;
                operations.push(operation);
                if config.tabu_length > 0 {
                    if tabu.len() == config.tabu_length {
                        tabu.pop_front();
                    }
                    tabu.push_back(operation);
                }
            }
        };

        let score = self.scorer.score(&dag)?;
        info!(
            "hill climbing stopped ({:?}) after {} steps with {} edges, score {}",
            termination,
            operations.len(),
            dag.num_edges(),
            score
        );
        Ok(SearchOutcome {
            dag,
            score,
            operations,
            termination,
        })
    }

    /// Finds the legal edit with the largest score improvement.
    ///
    /// Candidates are generated by source node, then target node, then operation kind, and a
    /// later candidate only wins with a strictly larger delta, so ties go to the first one.
    fn best_operation(
        &self,
        dag: &Dag,
        tabu: &VecDeque<Operation>,
    ) -> Result<Option<(Operation, f64)>> {
        let mut best: Option<(Operation, f64)> = None;
        let n = dag.num_nodes();
        for from in 0..n {
            for to in (0..n).filter(|&to| to != from) {
                for operation in self.legal_operations(dag, from, to) {
                    if is_tabu(tabu, operation) {
                        continue;
                    }
                    let delta = self.delta(dag, operation)?;
                    if best.map_or(true, |(_, best_delta)| delta > best_delta) {
                        best = Some((operation, delta));
                    }
                }
            }
        }
        Ok(best)
    }

    /// Finds the best pair of new parents to add to a single node together.
    ///
    /// A node that is the parity of two others is independent of each one alone, so no single
    /// edge addition improves the score; only adding both parents at once does. Candidates are
    /// ordered by the pair of new parents and then by child, and ties go to the first.
    fn best_parent_pair(
        &self,
        dag: &Dag,
        tabu: &VecDeque<Operation>,
    ) -> Result<Option<([Operation; 2], f64)>> {
        let mut best: Option<([Operation; 2], f64)> = None;
        let n = dag.num_nodes();
        for first in 0..n {
            for second in first + 1..n {
                for to in (0..n).filter(|&to| to != first && to != second) {
                    if self
                        .config
                        .max_indegree
                        .map_or(false, |max| dag.in_degree(to) + 2 > max)
                    {
                        continue;
                    }
                    let pair = [Operation::Add(first, to), Operation::Add(second, to)];
                    let legal = pair.iter().all(|&operation| {
                        let (from, to) = operation.edge();
                        !is_tabu(tabu, operation)
                            && self.legal_operations(dag, from, to).contains(&operation)
                    });
                    if !legal {
                        continue;
                    }

                    let parents = dag.parents(to);
                    let delta = self
                        .scorer
                        .local_score(to, &parents.with(first).with(second))?
                        - self.scorer.local_score(to, parents)?;
                    if best.map_or(true, |(_, best_delta)| delta > best_delta) {
                        best = Some((pair, delta));
                    }
                }
            }
        }
        Ok(best)
    }

    /// The operations on the ordered pair `(from, to)` that keep the graph acyclic and respect
    /// the in-degree bound and edge lists.
    fn legal_operations(&self, dag: &Dag, from: Variable, to: Variable) -> Vec<Operation> {
        let config = &self.config;
        let mut legal = Vec::new();
        if dag.has_edge(from, to) {
            legal.push(Operation::Remove(from, to));
            if config.allows(to, from)
                && config.has_room(dag, from)
                && !dag.has_indirect_path(from, to)
            {
                legal.push(Operation::Reverse(from, to));
            }
        } else if !dag.has_edge(to, from)
            && config.allows(from, to)
            && config.has_room(dag, to)
            && !dag.has_path(to, from)
        {
            legal.push(Operation::Add(from, to));
        }
        legal
    }

    /// The change in total score from applying `operation`, found by rescoring only the nodes
    /// whose parent sets it changes.
    fn delta(&self, dag: &Dag, operation: Operation) -> Result<f64> {
        let change = |node: Variable, parents: VariableSet| -> Result<f64> {
            Ok(self.scorer.local_score(node, &parents)?
                - self.scorer.local_score(node, dag.parents(node))?)
        };
        match operation {
            Operation::Add(from, to) => change(to, dag.parents(to).with(from)),
            Operation::Remove(from, to) => change(to, dag.parents(to).without(from)),
            Operation::Reverse(from, to) => Ok(change(to, dag.parents(to).without(from))?
                + change(from, dag.parents(from).with(to))?),
        }
    }
}

/// An operation is tabu if it would exactly undo a recent one.
fn is_tabu(tabu: &VecDeque<Operation>, operation: Operation) -> bool {
    tabu.iter().any(|&recent| recent.inverse() == operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_undoes_each_operation() {
        let start = Dag::from_edges(3, vec![(0, 1), (1, 2)]).unwrap();
        for &operation in &[
            Operation::Add(0, 2),
            Operation::Remove(1, 2),
            Operation::Reverse(0, 1),
        ] {
            let mut dag = start.clone();
            operation.apply(&mut dag).unwrap();
            assert_ne!(dag, start);
            operation.inverse().apply(&mut dag).unwrap();
            assert_eq!(dag, start);
        }
    }

    #[test]
    fn enumeration_order_is_by_bitmask() {
        let dags: Vec<Vec<_>> = all_dags(2).map(|dag| dag.edges().collect()).collect();
        assert_eq!(dags, vec![vec![], vec![(0, 1)], vec![(1, 0)]]);
        assert_eq!(all_dags(0).count(), 1);
        assert_eq!(all_dags(1).count(), 1);
    }
}
