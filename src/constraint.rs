//! Constraint-based structure learning with the PC algorithm.
//!
//! Learning proceeds in three stages, each usable on its own:
//!
//! 1. [`estimate_skeleton`] starts from the complete undirected graph and deletes every edge
//!    whose endpoints some conditioning set renders independent, recording that set.
//! 2. [`skeleton_to_pdag`] orients the colliders those separating sets reveal, then propagates
//!    orientations with Meek's rules ([`apply_meek_rules`]) until every edge that is directed in
//!    all graphs of the equivalence class has been oriented.
//! 3. [`pdag_to_dag`] picks a consistent orientation for the remaining undirected edges.
//!
//! The tests come from an [`IndependenceOracle`], so the same code runs against data through
//! [`ChiSquareOracle`] or against the exact independencies of a known graph through
//! [`DSeparationOracle`].

use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::graph::{Dag, Pdag};
use crate::independence::ChiSquareTest;
use crate::{Variable, VariableSet};
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::iter;

/// The significance level used when none is configured.
pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Answers conditional independence queries about a fixed set of variables.
pub trait IndependenceOracle {
    /// The number of variables, which are identified by the indices `0..num_variables()`.
    fn num_variables(&self) -> usize;

    /// Returns `true` if `x` and `y` are independent given `given`.
    fn is_independent(&self, x: Variable, y: Variable, given: &VariableSet) -> Result<bool>;
}

/// Decides independence with chi-square tests on data at a fixed significance level.
pub struct ChiSquareOracle<'a> {
    test: ChiSquareTest<'a>,
    significance_level: f64,
}

impl<'a> ChiSquareOracle<'a> {
    /// Creates an oracle; the significance level must lie strictly between 0 and 1.
    pub fn new(data: &'a Dataset, significance_level: f64) -> Result<Self> {
        check_significance_level(significance_level)?;
        Ok(ChiSquareOracle {
            test: ChiSquareTest::new(data),
            significance_level,
        })
    }
}

impl IndependenceOracle for ChiSquareOracle<'_> {
    fn num_variables(&self) -> usize {
        self.test.data().num_variables()
    }

    fn is_independent(&self, x: Variable, y: Variable, given: &VariableSet) -> Result<bool> {
        let result = self.test.test(x, y, given)?;
        if !result.sufficient_data {
            debug!(
                "too few samples to trust the test of {} and {} given {:?}",
                x, y, given
            );
        }
        Ok(result.is_independent(self.significance_level))
    }
}

/// Reports exactly the independencies implied by d-separation in a known graph.
pub struct DSeparationOracle<'g> {
    dag: &'g Dag,
}

impl<'g> DSeparationOracle<'g> {
    /// Creates an oracle for the given graph.
    pub fn new(dag: &'g Dag) -> Self {
        DSeparationOracle { dag }
    }
}

impl IndependenceOracle for DSeparationOracle<'_> {
    fn num_variables(&self) -> usize {
        self.dag.num_nodes()
    }

    fn is_independent(&self, x: Variable, y: Variable, given: &VariableSet) -> Result<bool> {
        let n = self.dag.num_nodes();
        for &node in given.as_slice().iter().chain(&[x, y]) {
            if node >= n {
                return Err(Error::UnknownVariable {
                    variable: node,
                    count: n,
                });
            }
        }
        Ok(self.dag.is_d_separated(x, y, given))
    }
}

pub(crate) fn check_significance_level(significance_level: f64) -> Result<()> {
    if significance_level > 0.0 && significance_level < 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidSignificanceLevel(significance_level))
    }
}

/// The conditioning set that separated each pair of variables during skeleton construction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SeparatingSets(HashMap<(Variable, Variable), VariableSet>);

impl SeparatingSets {
    fn key(a: Variable, b: Variable) -> (Variable, Variable) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Records the separating set of an unordered pair.
    pub fn insert(&mut self, a: Variable, b: Variable, separator: VariableSet) {
        self.0.insert(Self::key(a, b), separator);
    }

    /// The separating set of an unordered pair, if it was found to be independent.
    pub fn get(&self, a: Variable, b: Variable) -> Option<&VariableSet> {
        self.0.get(&Self::key(a, b))
    }

    /// The number of separated pairs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no pair was separated.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How [`estimate_skeleton`] chooses conditioning sets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PcVariant {
    /// Draw conditioning sets from the current adjacencies, which shrink as edges are removed
    /// within a level. Fewer tests, but the result depends on the order edges are visited.
    Original,
    /// Freeze every node's adjacencies at the start of each level, which makes the skeleton
    /// independent of visiting order.
    Stable,
}

/// Which of Meek's orientation rules to apply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OrientationRules {
    /// Rules 1 to 3, which are complete when there is no background knowledge.
    Meek,
    /// Rules 1 to 4, needed only when some orientations were fixed by outside knowledge.
    WithRule4,
}

/// Options for PC.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PcConfig {
    significance_level: f64,
    max_cond_vars: Option<usize>,
    variant: PcVariant,
    rules: OrientationRules,
}

impl Default for PcConfig {
    fn default() -> Self {
        PcConfig {
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            max_cond_vars: None,
            variant: PcVariant::Stable,
            rules: OrientationRules::Meek,
        }
    }
}

impl PcConfig {
    /// Independence is accepted when a test's p-value is at least this.
    pub fn significance_level(mut self, significance_level: f64) -> Self {
        self.significance_level = significance_level;
        self
    }

    /// The largest conditioning set to try.
    pub fn max_cond_vars(mut self, max_cond_vars: usize) -> Self {
        self.max_cond_vars = Some(max_cond_vars);
        self
    }

    /// How conditioning sets are drawn.
    pub fn variant(mut self, variant: PcVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Which orientation rules to propagate with.
    pub fn rules(mut self, rules: OrientationRules) -> Self {
        self.rules = rules;
        self
    }
}

/// Finds the undirected skeleton and the separating sets of every removed edge.
///
/// For conditioning-set sizes 0, 1, 2, … every remaining edge `x - y` is tested against each
/// subset of that size drawn from the other neighbors of `x`, then of `y`. The first subset that
/// renders them independent removes the edge and becomes its separating set. Because sizes only
/// grow, that set is as small as any that would have worked.
pub fn estimate_skeleton<O>(oracle: &O, config: &PcConfig) -> Result<(Pdag, SeparatingSets)>
where
    O: IndependenceOracle + ?Sized,
{
    let n = oracle.num_variables();
    let mut skeleton = Pdag::complete(n);
    let mut separating_sets = SeparatingSets::default();

    for level in 0.. {
        if config.max_cond_vars.map_or(false, |max| level > max) {
            break;
        }

        let frozen: Vec<VariableSet> = match config.variant {
            PcVariant::Stable => (0..n).map(|v| skeleton.neighbors(v)).collect(),
            PcVariant::Original => Vec::new(),
        };

        let mut testable = false;
        for (x, y) in skeleton.undirected_edges() {
            let mut separator = None;
            for &(a, b) in &[(x, y), (y, x)] {
                let candidates = match config.variant {
                    PcVariant::Stable => frozen[a].without(b),
                    PcVariant::Original => skeleton.neighbors(a).without(b),
                };
                if candidates.len() < level {
                    continue;
                }
                testable = true;

                for subset in candidates.subsets(level) {
                    if oracle.is_independent(x, y, &subset)? {
                        separator = Some(subset);
                        break;
                    }
                }
                if separator.is_some() {
                    break;
                }
            }

            if let Some(separator) = separator {
                debug!("removing {} - {} given {:?}", x, y, separator);
                skeleton.remove_edge(x, y);
                separating_sets.insert(x, y, separator);
            }
        }

        if !testable {
            break;
        }
    }

    info!(
        "skeleton has {} edges after removing {}",
        skeleton.num_edges(),
        separating_sets.len()
    );
    Ok((skeleton, separating_sets))
}

/// Orients the colliders implied by the separating sets, then applies Meek's rules.
///
/// For every pair `x`, `z` of non-adjacent nodes with a common neighbor `y` that is not in their
/// separating set, both edges are oriented into `y`. An edge that an earlier collider already
/// oriented the other way is left alone; that only happens when the independence tests
/// contradict each other.
pub fn skeleton_to_pdag(
    skeleton: &Pdag,
    separating_sets: &SeparatingSets,
    rules: OrientationRules,
) -> Pdag {
    let mut pdag = skeleton.clone();
    let empty = VariableSet::empty();

    for y in 0..skeleton.num_nodes() {
        let neighbors = skeleton.neighbors(y);
        for pair in neighbors.subsets(2) {
            let (x, z) = (pair.as_slice()[0], pair.as_slice()[1]);
            if skeleton.is_adjacent(x, z) {
                continue;
            }
            if separating_sets.get(x, z).unwrap_or(&empty).contains(y) {
                continue;
            }

            for &parent in &[x, z] {
                if pdag.is_undirected(parent, y) {
                    pdag.orient(parent, y);
                } else if pdag.is_directed(y, parent) {
                    warn!(
                        "conflicting collider at {}: {} -> {} already oriented",
                        y, y, parent
                    );
                }
            }
        }
    }

    apply_meek_rules(&mut pdag, rules);
    pdag
}

/// Returns `true` if one of the rules compels the undirected edge `a - b` to become `a -> b`.
fn is_compelled(pdag: &Pdag, a: Variable, b: Variable, rules: OrientationRules) -> bool {
    // Rule 1: c -> a - b with c, b non-adjacent. Otherwise b would be a new collider.
    if pdag.parents(a).iter().any(|c| !pdag.is_adjacent(c, b)) {
        return true;
    }

    // Rule 2: a -> c -> b. Otherwise b -> a would close a cycle.
    if pdag.children(a).iter().any(|c| pdag.is_directed(c, b)) {
        return true;
    }

    // Rule 3: a - c -> b and a - d -> b with c, d non-adjacent.
    let into_b: VariableSet = pdag
        .undirected_neighbors(a)
        .iter()
        .filter(|&c| pdag.is_directed(c, b))
        .collect();
    if into_b
        .subsets(2)
        .any(|pair| !pdag.is_adjacent(pair.as_slice()[0], pair.as_slice()[1]))
    {
        return true;
    }

    // Rule 4: c -> d -> b with a adjacent to both c and d, and c, b non-adjacent.
    if rules == OrientationRules::WithRule4 {
        let neighbors = pdag.neighbors(a);
        for d in pdag.parents(b).iter().filter(|&d| neighbors.contains(d)) {
            if pdag
                .parents(d)
                .iter()
                .any(|c| c != b && neighbors.contains(c) && !pdag.is_adjacent(c, b))
            {
                return true;
            }
        }
    }

    false
}

/// Orients undirected edges with Meek's rules until none of them applies, returning how many
/// edges were oriented.
///
/// This works through a queue of undirected edges. Orienting `u -> v` can only make a rule
/// applicable to edges with an endpoint at or next to `u` or `v`, so only those go back on the
/// queue.
pub fn apply_meek_rules(pdag: &mut Pdag, rules: OrientationRules) -> usize {
    let n = pdag.num_nodes();
    let mut queued = vec![false; n * n];
    let mut queue: VecDeque<(Variable, Variable)> = pdag.undirected_edges().into_iter().collect();
    for &(a, b) in &queue {
        queued[a * n + b] = true;
    }

    let mut oriented = 0;
    while let Some((a, b)) = queue.pop_front() {
        queued[a * n + b] = false;
        if !pdag.is_undirected(a, b) {
            continue;
        }

        let (from, to) = if is_compelled(pdag, a, b, rules) {
            (a, b)
        } else if is_compelled(pdag, b, a, rules) {
            (b, a)
        } else {
            continue;
        };

        if pdag.has_directed_path(to, from) {
            warn!(
                "orienting {} -> {} would close a cycle; leaving it undirected",
                from, to
            );
            continue;
        }
        pdag.orient(from, to);
        oriented += 1;

        let touched = pdag.neighbors(from).union(&pdag.neighbors(to));
        for w in touched.iter().chain(iter::once(from)).chain(iter::once(to)) {
            for v in pdag.undirected_neighbors(w).iter() {
                let (lo, hi) = if w < v { (w, v) } else { (v, w) };
                if !queued[lo * n + hi] {
                    queued[lo * n + hi] = true;
                    queue.push_back((lo, hi));
                }
            }
        }
    }
    oriented
}

/// Orienting `from -> to` is safe if it closes no cycle and makes `to` a collider only with
/// parents already adjacent to `from`.
fn can_orient(pdag: &Pdag, from: Variable, to: Variable) -> bool {
    !pdag.has_directed_path(to, from)
        && pdag
            .parents(to)
            .iter()
            .all(|parent| pdag.is_adjacent(parent, from))
}

/// Extends a PDAG to a DAG in its equivalence class.
///
/// Undirected edges are oriented one at a time, each in a direction that creates neither a cycle
/// nor a new collider, and Meek's rules run again after each. If at some point no undirected edge
/// can be oriented that way, the PDAG has no faithful extension. That is logged as a warning and
/// the first undirected edge is oriented in whichever direction avoids a cycle, so this always
/// returns a DAG.
pub fn pdag_to_dag(pdag: &Pdag, rules: OrientationRules) -> Dag {
    let mut pdag = pdag.clone();
    apply_meek_rules(&mut pdag, rules);

    loop {
        let undirected = pdag.undirected_edges();
        let first = match undirected.first() {
            Some(&edge) => edge,
            None => break,
        };

        let safe = undirected
            .iter()
            .flat_map(|&(a, b)| iter::once((a, b)).chain(iter::once((b, a))))
            .find(|&(from, to)| can_orient(&pdag, from, to));
        let (from, to) = match safe {
            Some(edge) => edge,
            None => {
                warn!(
                    "PDAG has no consistent extension; orienting {} - {} arbitrarily",
                    first.0, first.1
                );
                if pdag.has_directed_path(first.1, first.0) {
                    (first.1, first.0)
                } else {
                    first
                }
            }
        };

        pdag.orient(from, to);
        apply_meek_rules(&mut pdag, rules);
    }

    // Every orientation above was checked against cycles, so this can't fail in practice; any
    // edge that did would be dropped rather than abort the extension.
    let mut dag = Dag::new(pdag.num_nodes());
    for (from, to) in pdag.directed_edges() {
        if let Err(err) = dag.add_edge(from, to) {
            warn!("dropping edge {} -> {}: {}", from, to, err);
        }
    }
    dag
}

/// Runs PC on a dataset with chi-square tests.
pub struct ConstraintEstimator<'a> {
    oracle: ChiSquareOracle<'a>,
    config: PcConfig,
}

impl<'a> ConstraintEstimator<'a> {
    /// Creates an estimator, validating the configured significance level.
    pub fn new(data: &'a Dataset, config: PcConfig) -> Result<Self> {
        Ok(ConstraintEstimator {
            oracle: ChiSquareOracle::new(data, config.significance_level)?,
            config,
        })
    }

    /// Finds the skeleton and separating sets.
    pub fn estimate_skeleton(&self) -> Result<(Pdag, SeparatingSets)> {
        estimate_skeleton(&self.oracle, &self.config)
    }

    /// Finds the maximally oriented PDAG.
    pub fn estimate_pdag(&self) -> Result<Pdag> {
        let (skeleton, separating_sets) = self.estimate_skeleton()?;
        Ok(skeleton_to_pdag(
            &skeleton,
            &separating_sets,
            self.config.rules,
        ))
    }

    /// Finds a DAG consistent with the PDAG.
    pub fn estimate(&self) -> Result<Dag> {
        Ok(pdag_to_dag(&self.estimate_pdag()?, self.config.rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdag_from(
        num_nodes: usize,
        directed: &[(usize, usize)],
        undirected: &[(usize, usize)],
    ) -> Pdag {
        let mut pdag = Pdag::new(num_nodes);
        for &(a, b) in directed {
            pdag.add_directed(a, b);
        }
        for &(a, b) in undirected {
            pdag.add_undirected(a, b);
        }
        pdag
    }

    #[test]
    fn rule_1_avoids_new_colliders() {
        let mut pdag = pdag_from(3, &[(0, 1)], &[(1, 2)]);
        assert_eq!(apply_meek_rules(&mut pdag, OrientationRules::Meek), 1);
        assert!(pdag.is_directed(1, 2));
    }

    #[test]
    fn rule_2_avoids_cycles() {
        let mut pdag = pdag_from(3, &[(0, 1), (1, 2)], &[(0, 2)]);
        apply_meek_rules(&mut pdag, OrientationRules::Meek);
        assert!(pdag.is_directed(0, 2));
    }

    #[test]
    fn rule_3_orients_into_collider() {
        // 1 -> 3 <- 2 with 0 - 1, 0 - 2, 0 - 3.
        let mut pdag = pdag_from(4, &[(1, 3), (2, 3)], &[(0, 1), (0, 2), (0, 3)]);
        apply_meek_rules(&mut pdag, OrientationRules::Meek);
        assert!(pdag.is_directed(0, 3));
        assert!(pdag.is_undirected(0, 1));
        assert!(pdag.is_undirected(0, 2));
    }

    #[test]
    fn rule_4_needs_to_be_enabled() {
        // 2 -> 3 -> 1, with 0 adjacent to 1, 2, and 3, and 1, 2 non-adjacent.
        let directed = [(2, 3), (3, 1)];
        let undirected = [(0, 1), (0, 2), (0, 3)];

        let mut pdag = pdag_from(4, &directed, &undirected);
        apply_meek_rules(&mut pdag, OrientationRules::Meek);
        assert!(pdag.is_undirected(0, 1));

        let mut pdag = pdag_from(4, &directed, &undirected);
        apply_meek_rules(&mut pdag, OrientationRules::WithRule4);
        assert!(pdag.is_directed(0, 1));
    }

    #[test]
    fn extension_of_undirected_chain_has_no_collider() {
        let pdag = pdag_from(3, &[], &[(0, 1), (1, 2)]);
        let dag = pdag_to_dag(&pdag, OrientationRules::Meek);
        assert_eq!(dag.num_edges(), 2);
        assert!(dag.v_structures().is_empty());
    }

    #[test]
    fn extension_keeps_existing_colliders() {
        let pdag = pdag_from(4, &[(1, 2), (3, 2)], &[(0, 1), (0, 3)]);
        let dag = pdag_to_dag(&pdag, OrientationRules::Meek);
        assert_eq!(dag.num_edges(), 4);
        assert!(dag.has_edge(1, 2) && dag.has_edge(3, 2));
        assert_eq!(dag.v_structures(), vec![(1, 2, 3)]);
    }

    #[test]
    fn chordless_cycle_still_extends_to_dag() {
        // Every orientation of an undirected four-cycle without chords has a collider.
        let pdag = pdag_from(4, &[], &[(0, 1), (1, 2), (2, 3), (0, 3)]);
        let dag = pdag_to_dag(&pdag, OrientationRules::Meek);
        assert_eq!(dag.num_edges(), 4);
        assert_eq!(dag.v_structures().len(), 1);
    }

    #[test]
    fn rejects_bad_significance_levels() {
        for &alpha in &[0.0, 1.0, -0.5, f64::NAN] {
            assert!(matches!(
                check_significance_level(alpha),
                Err(Error::InvalidSignificanceLevel(_))
            ));
        }
    }
}
