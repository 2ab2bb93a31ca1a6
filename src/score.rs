//! Decomposable scores for candidate network structures.
//!
//! A structure's score is the sum of one local term per node, each depending only on that node's
//! state counts against its parents. That decomposition is what lets the searches in
//! [`crate::search`] evaluate an edge edit by rescoring only the one or two nodes whose parent
//! sets changed.
//!
//! All three scores are log-scale, and higher is better.

use crate::counts::{ContingencyTable, StateCounter};
use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::graph::Dag;
use crate::{Variable, VariableSet};
use statrs::function::gamma::ln_gamma;
use std::cell::RefCell;
use std::collections::HashMap;

/// The equivalent sample size used when BDeu is requested without one.
pub const DEFAULT_EQUIVALENT_SAMPLE_SIZE: f64 = 5.0;

/// Which scoring function a [`Scorer`] computes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScoreMethod {
    /// The Cooper & Herskovits K2 score: the Bayesian-Dirichlet marginal likelihood with one
    /// pseudo-count in every cell.
    K2,

    /// The Bayesian-Dirichlet equivalent uniform score. The prior spreads `equivalent_sample_size`
    /// pseudo-counts evenly across every cell of the node's table, so Markov-equivalent graphs
    /// score the same.
    BDeu {
        /// How many imaginary observations the uniform prior is worth.
        equivalent_sample_size: f64,
    },

    /// The Bayesian Information Criterion: maximum log-likelihood less half the log of the sample
    /// size per free parameter.
    Bic,
}

impl ScoreMethod {
    /// BDeu with the given equivalent sample size, which must be finite and positive.
    pub fn bdeu(equivalent_sample_size: f64) -> Result<Self> {
        let method = ScoreMethod::BDeu {
            equivalent_sample_size,
        };
        method.validate()?;
        Ok(method)
    }

    fn validate(&self) -> Result<()> {
        match *self {
            ScoreMethod::BDeu {
                equivalent_sample_size,
            } if !(equivalent_sample_size.is_finite() && equivalent_sample_size > 0.0) => {
                Err(Error::InvalidSampleSize(equivalent_sample_size))
            }
            _ => Ok(()),
        }
    }

    /// Computes the local score of the family summarized by `table`.
    ///
    /// Parent configurations which never occurred contribute nothing to any of these scores
    /// (their terms cancel exactly), so only observed rows are visited.
    pub fn local_score(&self, table: &ContingencyTable) -> f64 {
        match *self {
            ScoreMethod::K2 => dirichlet(table, 1.0),
            ScoreMethod::BDeu {
                equivalent_sample_size,
            } => {
                let cells = table.cardinality() as f64 * table.num_configurations();
                dirichlet(table, equivalent_sample_size / cells)
            }
            ScoreMethod::Bic => bic(table),
        }
    }
}

impl Default for ScoreMethod {
    fn default() -> Self {
        ScoreMethod::BDeu {
            equivalent_sample_size: DEFAULT_EQUIVALENT_SAMPLE_SIZE,
        }
    }
}

/// Log marginal likelihood under a Dirichlet prior with `pseudo_count` in every cell:
///
/// ```text
/// sum over configurations j of
///     lnΓ(α_j) - lnΓ(α_j + N_j) + sum over states k of [lnΓ(α_jk + N_jk) - lnΓ(α_jk)]
/// ```
///
/// where `α_jk` is the pseudo-count and `α_j = r * α_jk` for a variable with `r` states.
fn dirichlet(table: &ContingencyTable, pseudo_count: f64) -> f64 {
    let row_prior = pseudo_count * table.cardinality() as f64;
    let ln_gamma_row_prior = ln_gamma(row_prior);
    let ln_gamma_cell_prior = ln_gamma(pseudo_count);

    let mut score = 0.0;
    for (_, counts) in table.rows() {
        let mut row_total = 0;
        for &count in counts {
            row_total += count;
            if count > 0 {
                score += ln_gamma(pseudo_count + count as f64) - ln_gamma_cell_prior;
            }
        }
        score += ln_gamma_row_prior - ln_gamma(row_prior + row_total as f64);
    }
    score
}

fn bic(table: &ContingencyTable) -> f64 {
    let mut log_likelihood = 0.0;
    for (_, counts) in table.rows() {
        let row_total: u64 = counts.iter().sum();
        let row_total = row_total as f64;
        for &count in counts {
            if count > 0 {
                let count = count as f64;
                log_likelihood += count * (count / row_total).ln();
            }
        }
    }

    let free_parameters = (table.cardinality() as f64 - 1.0) * table.num_configurations();
    log_likelihood - 0.5 * (table.sample_size() as f64).ln() * free_parameters
}

/// Scores families and whole graphs against one dataset.
///
/// Both contingency tables and local scores are memoized, since searches revisit the same
/// `(variable, parents)` pairs constantly.
pub struct Scorer<'a> {
    counter: StateCounter<'a>,
    method: ScoreMethod,
    cache: RefCell<HashMap<(Variable, VariableSet), f64>>,
}

impl<'a> Scorer<'a> {
    /// Creates a scorer, rejecting an invalid BDeu sample size or a dataset with no records.
    pub fn new(data: &'a Dataset, method: ScoreMethod) -> Result<Self> {
        method.validate()?;
        if data.is_empty() {
            return Err(Error::EmptyDataset);
        }
        Ok(Scorer {
            counter: StateCounter::new(data),
            method,
            cache: RefCell::new(HashMap::new()),
        })
    }

    /// The dataset being scored against.
    pub fn data(&self) -> &'a Dataset {
        self.counter.data()
    }

    /// The scoring function in use.
    pub fn method(&self) -> ScoreMethod {
        self.method
    }

    /// The counter supplying this scorer's contingency tables.
    pub fn counter(&self) -> &StateCounter<'a> {
        &self.counter
    }

    /// The score contribution of `variable` having exactly `parents` as its parents.
    pub fn local_score(&self, variable: Variable, parents: &VariableSet) -> Result<f64> {
        let key = (variable, parents.clone());
        if let Some(&score) = self.cache.borrow().get(&key) {
            return Ok(score);
        }

        let table = self.counter.counts(variable, parents)?;
        let score = self.method.local_score(&table);
        self.cache.borrow_mut().insert(key, score);
        Ok(score)
    }

    /// The score of a whole graph: the sum of every node's local score.
    pub fn score(&self, dag: &Dag) -> Result<f64> {
        let expected = self.data().num_variables();
        if dag.num_nodes() != expected {
            return Err(Error::GraphSize {
                expected,
                found: dag.num_nodes(),
            });
        }
        (0..dag.num_nodes())
            .map(|node| self.local_score(node, dag.parents(node)))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DatasetBuilder;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    /// Two binary variables; `b` copies `a` except in one record.
    fn sample() -> Dataset {
        let mut builder = DatasetBuilder::new(&["a", "b"]).unwrap();
        for record in &[["0", "0"], ["0", "0"], ["1", "1"], ["1", "1"], ["1", "0"]] {
            builder.push_record(record).unwrap();
        }
        builder.build()
    }

    #[test]
    fn k2_matches_hand_computation() {
        let data = sample();
        let scorer = Scorer::new(&data, ScoreMethod::K2).unwrap();

        // b | a=0: counts (2, 0); b | a=1: counts (1, 2). With r = 2:
        // ln(1!/3!) + ln(2!0!) + ln(1!/4!) + ln(1!2!)
        let expected = (1.0f64 / 6.0).ln() + 2f64.ln() + (1.0f64 / 24.0).ln() + 2f64.ln();
        let score = scorer.local_score(1, &VariableSet::new(&[0])).unwrap();
        assert!(close(score, expected), "{} != {}", score, expected);
    }

    #[test]
    fn bdeu_with_no_parents_is_well_defined() {
        let data = sample();
        let scorer = Scorer::new(&data, ScoreMethod::bdeu(2.0).unwrap()).unwrap();

        // a has counts (2, 3) and a single configuration, so each cell gets one pseudo-count:
        // the same as K2.
        let expected = ln_gamma(2.0) - ln_gamma(7.0) + ln_gamma(3.0) + ln_gamma(4.0);
        let score = scorer.local_score(0, &VariableSet::empty()).unwrap();
        assert!(close(score, expected));
    }

    #[test]
    fn bic_matches_hand_computation() {
        let data = sample();
        let scorer = Scorer::new(&data, ScoreMethod::Bic).unwrap();

        let log_likelihood = 2.0 * 1f64.ln() + (1.0f64 / 3.0).ln() + 2.0 * (2.0f64 / 3.0).ln();
        let penalty = 0.5 * 5f64.ln() * 1.0 * 2.0;
        let score = scorer.local_score(1, &VariableSet::new(&[0])).unwrap();
        assert!(close(score, log_likelihood - penalty));
    }

    #[test]
    fn rejects_bad_configuration() {
        let data = sample();
        for &ess in &[0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(ScoreMethod::bdeu(ess), Err(Error::InvalidSampleSize(_))));
            let method = ScoreMethod::BDeu {
                equivalent_sample_size: ess,
            };
            assert!(Scorer::new(&data, method).is_err());
        }

        let scorer = Scorer::new(&data, ScoreMethod::K2).unwrap();
        assert!(matches!(
            scorer.local_score(0, &VariableSet::new(&[0])),
            Err(Error::SelfParent(_))
        ));
        assert!(matches!(
            scorer.score(&Dag::new(3)),
            Err(Error::GraphSize { expected: 2, found: 3 })
        ));

        let empty = DatasetBuilder::new(&["a"]).unwrap().build();
        assert!(matches!(Scorer::new(&empty, ScoreMethod::Bic), Err(Error::EmptyDataset)));
    }

    #[test]
    fn graph_score_is_sum_of_local_scores() {
        let data = sample();
        for &method in &[ScoreMethod::K2, ScoreMethod::default(), ScoreMethod::Bic] {
            let scorer = Scorer::new(&data, method).unwrap();
            let dag = Dag::from_edges(2, vec![(1, 0)]).unwrap();
            let expected = scorer.local_score(0, &VariableSet::new(&[1])).unwrap()
                + scorer.local_score(1, &VariableSet::empty()).unwrap();
            assert!(close(scorer.score(&dag).unwrap(), expected));
        }
    }
}
