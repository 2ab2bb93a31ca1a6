//! Max-min hill climbing: a constraint-based skeleton followed by score-based orientation.
//!
//! The skeleton comes from running max-min parents and children (MMPC) on every variable. MMPC
//! only ever tests a variable against subsets of its own candidate neighborhood, so it stays
//! cheap even where global PC would condition on large sets. Hill climbing then runs with both
//! orientations of each skeleton edge as its only allowed edges. The search decides which way
//! edges point and may drop some, but never adds an edge the skeleton lacks.

use crate::constraint::{check_significance_level, DEFAULT_SIGNIFICANCE_LEVEL};
use crate::error::Result;
use crate::graph::{Dag, Pdag};
use crate::independence::ChiSquareTest;
use crate::score::Scorer;
use crate::search::{HillClimbConfig, HillClimbSearch, SearchOutcome};
use crate::{Variable, VariableSet};
use log::{debug, info};

/// The tabu length used when none is configured.
pub const DEFAULT_TABU_LENGTH: usize = 10;

/// Options for [`MmhcEstimator`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MmhcConfig {
    significance_level: f64,
    tabu_length: usize,
    max_indegree: Option<usize>,
    max_iterations: Option<usize>,
    max_cond_vars: Option<usize>,
}

impl Default for MmhcConfig {
    fn default() -> Self {
        MmhcConfig {
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            tabu_length: DEFAULT_TABU_LENGTH,
            max_indegree: None,
            max_iterations: None,
            max_cond_vars: None,
        }
    }
}

impl MmhcConfig {
    /// Independence is accepted when a test's p-value is at least this.
    pub fn significance_level(mut self, significance_level: f64) -> Self {
        self.significance_level = significance_level;
        self
    }

    /// How many recent hill-climbing operations may not be undone.
    pub fn tabu_length(mut self, tabu_length: usize) -> Self {
        self.tabu_length = tabu_length;
        self
    }

    /// The most parents any node may have in the result.
    pub fn max_indegree(mut self, max_indegree: usize) -> Self {
        self.max_indegree = Some(max_indegree);
        self
    }

    /// Stops hill climbing after this many edits.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// The largest conditioning set MMPC will test with.
    pub fn max_cond_vars(mut self, max_cond_vars: usize) -> Self {
        self.max_cond_vars = Some(max_cond_vars);
        self
    }
}

/// Learns a structure with max-min hill climbing.
pub struct MmhcEstimator<'s, 'a> {
    scorer: &'s Scorer<'a>,
    test: ChiSquareTest<'a>,
    config: MmhcConfig,
}

impl<'s, 'a> MmhcEstimator<'s, 'a> {
    /// Creates an estimator that tests against the scorer's dataset.
    pub fn new(scorer: &'s Scorer<'a>, config: MmhcConfig) -> Result<Self> {
        check_significance_level(config.significance_level)?;
        Ok(MmhcEstimator {
            scorer,
            test: ChiSquareTest::new(scorer.data()),
            config,
        })
    }

    /// How strongly `x` depends on `target` given `given`: zero if the test accepts
    /// independence, otherwise one minus the p-value.
    fn association(&self, x: Variable, target: Variable, given: &VariableSet) -> Result<f64> {
        let result = self.test.test(x, target, given)?;
        if result.is_independent(self.config.significance_level) {
            Ok(0.0)
        } else {
            Ok(1.0 - result.p_value)
        }
    }

    /// Every subset of `set` small enough to condition on, smallest first.
    fn conditioning_sets(&self, set: &VariableSet) -> Vec<VariableSet> {
        let largest = self
            .config
            .max_cond_vars
            .map_or(set.len(), |max| max.min(set.len()));
        (0..=largest).flat_map(|size| set.subsets(size)).collect()
    }

    /// The weakest association between `x` and `target` over every conditioning subset of
    /// `neighborhood`.
    fn min_association(
        &self,
        x: Variable,
        target: Variable,
        neighborhood: &VariableSet,
    ) -> Result<f64> {
        let mut weakest = f64::INFINITY;
        for given in self.conditioning_sets(neighborhood) {
            weakest = weakest.min(self.association(x, target, &given)?);
            if weakest == 0.0 {
                break;
            }
        }
        Ok(weakest)
    }

    /// Finds the candidate parents and children of `target`.
    ///
    /// The forward phase repeatedly admits whichever remaining variable has the largest minimum
    /// association with `target` over subsets of the variables admitted so far, discarding any
    /// variable that some subset already separates. It stops once nothing remaining has a
    /// nonzero minimum association. The backward phase then drops every admitted variable that
    /// some subset of the others separates from `target`.
    pub fn parents_children(&self, target: Variable) -> Result<VariableSet> {
        let data = self.test.data();
        data.check(target)?;

        let mut remaining: Vec<Variable> = data.variables().filter(|&v| v != target).collect();
        let mut admitted = VariableSet::empty();
        loop {
            let mut best: Option<(Variable, f64)> = None;
            let mut separated = Vec::new();
            for &candidate in &remaining {
                let association = self.min_association(candidate, target, &admitted)?;
                if association == 0.0 {
                    // Conditioning on more variables only adds subsets, so this stays zero.
                    separated.push(candidate);
                } else if best.map_or(true, |(_, strongest)| association > strongest) {
                    best = Some((candidate, association));
                }
            }
            remaining.retain(|v| !separated.contains(v));

            match best {
                Some((chosen, association)) => {
                    debug!(
                        "{}: admitting {} with association {}",
                        data.name(target),
                        data.name(chosen),
                        association
                    );
                    admitted = admitted.with(chosen);
                    remaining.retain(|&v| v != chosen);
                }
                None => break,
            }
        }

        for candidate in admitted.clone().iter() {
            let others = admitted.without(candidate);
            if self.min_association(candidate, target, &others)? == 0.0 {
                debug!(
                    "{}: removing {} in backward phase",
                    data.name(target),
                    data.name(candidate)
                );
                admitted = admitted.without(candidate);
            }
        }
        Ok(admitted)
    }

    /// Builds the undirected skeleton, keeping an edge only if each endpoint is among the
    /// other's candidate parents and children.
    pub fn mmpc(&self) -> Result<Pdag> {
        let n = self.test.data().num_variables();
        let neighborhoods = (0..n)
            .map(|v| self.parents_children(v))
            .collect::<Result<Vec<_>>>()?;

        let mut skeleton = Pdag::new(n);
        for a in 0..n {
            for b in neighborhoods[a].iter().filter(|&b| b > a) {
                if neighborhoods[b].contains(a) {
                    skeleton.add_undirected(a, b);
                } else {
                    debug!("dropping asymmetric neighbors {} and {}", a, b);
                }
            }
        }
        info!("MMPC skeleton has {} edges", skeleton.num_edges());
        Ok(skeleton)
    }

    /// Runs MMPC, then hill climbing restricted to the skeleton, returning the full search
    /// outcome.
    pub fn search(&self) -> Result<SearchOutcome> {
        let skeleton = self.mmpc()?;
        let allowed = skeleton
            .undirected_edges()
            .into_iter()
            .flat_map(|(a, b)| vec![(a, b), (b, a)]);

        let mut config = HillClimbConfig::default()
            .tabu_length(self.config.tabu_length)
            .white_list(allowed);
        if let Some(max_indegree) = self.config.max_indegree {
            config = config.max_indegree(max_indegree);
        }
        if let Some(max_iterations) = self.config.max_iterations {
            config = config.max_iterations(max_iterations);
        }
        HillClimbSearch::new(self.scorer, config)?.climb()
    }

    /// Runs MMHC and returns the learned graph.
    pub fn estimate(&self) -> Result<Dag> {
        Ok(self.search()?.dag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, DatasetBuilder};
    use crate::error::Error;
    use crate::score::ScoreMethod;

    /// `y` copies `x` except in one record of every ten, and `z` is exactly balanced against
    /// both.
    fn sample() -> Dataset {
        let mut builder = DatasetBuilder::new(&["x", "y", "z"]).unwrap();
        for i in 0..200 {
            let x = i % 2;
            let y = if i % 10 == 0 { 1 - x } else { x };
            let z = (i / 2) % 2;
            builder
                .push_record(&[x.to_string(), y.to_string(), z.to_string()])
                .unwrap();
        }
        builder.build()
    }

    #[test]
    fn neighborhoods_exclude_independent_variables() {
        let data = sample();
        let scorer = Scorer::new(&data, ScoreMethod::default()).unwrap();
        let mmhc = MmhcEstimator::new(&scorer, MmhcConfig::default()).unwrap();

        assert_eq!(mmhc.parents_children(0).unwrap().as_slice(), &[1]);
        assert_eq!(mmhc.parents_children(1).unwrap().as_slice(), &[0]);
        assert!(mmhc.parents_children(2).unwrap().is_empty());
        assert_eq!(mmhc.mmpc().unwrap().undirected_edges(), vec![(0, 1)]);
    }

    #[test]
    fn search_stays_within_skeleton() {
        let data = sample();
        let scorer = Scorer::new(&data, ScoreMethod::default()).unwrap();
        let dag = MmhcEstimator::new(&scorer, MmhcConfig::default())
            .unwrap()
            .estimate()
            .unwrap();
        assert_eq!(dag.num_edges(), 1);
        assert!(dag.is_adjacent(0, 1));
    }

    #[test]
    fn rejects_bad_significance_level() {
        let data = sample();
        let scorer = Scorer::new(&data, ScoreMethod::K2).unwrap();
        let config = MmhcConfig::default().significance_level(1.5);
        assert!(matches!(
            MmhcEstimator::new(&scorer, config),
            Err(Error::InvalidSignificanceLevel(_))
        ));
    }
}
