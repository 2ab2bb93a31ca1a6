//! Pearson's chi-square test of conditional independence between two categorical variables.

use crate::counts::{Configuration, StateCounter};
use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::{Variable, VariableSet};
use log::trace;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::collections::HashMap;

/// Cells whose expected count falls below this make the chi-square approximation unreliable.
pub const MIN_EXPECTED_COUNT: f64 = 5.0;

/// Cochran's rule of thumb: the approximation is acceptable as long as no more than this fraction
/// of cells falls below [`MIN_EXPECTED_COUNT`].
pub const MAX_SPARSE_FRACTION: f64 = 0.2;

/// The outcome of one conditional independence test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndependenceTest {
    /// Pearson's chi-square statistic, summed over every conditioning configuration.
    pub statistic: f64,

    /// The probability of a statistic at least this large if the variables really were
    /// conditionally independent.
    pub p_value: f64,

    /// `(|X| - 1) * (|Y| - 1) * |configurations of Z|`.
    pub degrees_of_freedom: f64,

    /// `false` if too many cells had small expected counts for the p-value to be trusted. The
    /// p-value is still reported; deciding whether to rely on it is up to the caller.
    pub sufficient_data: bool,
}

impl IndependenceTest {
    /// Returns `true` if the test fails to reject independence at this significance level.
    pub fn is_independent(&self, significance_level: f64) -> bool {
        self.p_value >= significance_level
    }
}

/// Runs chi-square tests against one dataset, sharing memoized contingency tables between
/// tests.
pub struct ChiSquareTest<'a> {
    counter: StateCounter<'a>,
}

impl<'a> ChiSquareTest<'a> {
    /// Creates a tester for the given data.
    pub fn new(data: &'a Dataset) -> Self {
        ChiSquareTest {
            counter: StateCounter::new(data),
        }
    }

    /// The dataset being tested.
    pub fn data(&self) -> &'a Dataset {
        self.counter.data()
    }

    /// Tests whether `x` and `y` are independent given `given`.
    ///
    /// Within each observed configuration of `given`, the observed joint counts of `x` and `y`
    /// are compared against the product of their marginals. Configurations that never occur
    /// contribute nothing to the statistic but still count toward the degrees of freedom.
    ///
    /// ```
    /// use bnstructure::{ChiSquareTest, DatasetBuilder, VariableSet};
    ///
    /// let mut builder = DatasetBuilder::new(&["x", "y"]).unwrap();
    /// for _ in 0..25 {
    ///     builder.push_record(&["a", "a"]).unwrap();
    ///     builder.push_record(&["b", "b"]).unwrap();
    /// }
    /// let data = builder.build();
    ///
    /// let result = ChiSquareTest::new(&data).test(0, 1, &VariableSet::empty()).unwrap();
    /// assert_eq!(result.statistic, 50.0);
    /// assert_eq!(result.degrees_of_freedom, 1.0);
    /// assert!(!result.is_independent(0.05));
    /// ```
    pub fn test(&self, x: Variable, y: Variable, given: &VariableSet) -> Result<IndependenceTest> {
        let data = self.data();
        data.check(x)?;
        data.check(y)?;
        if x == y {
            return Err(Error::SameVariable(data.name(x).to_owned()));
        }
        for tested in [x, y].iter().copied() {
            if given.contains(tested) {
                return Err(Error::ConditioningOverlap(data.name(tested).to_owned()));
            }
        }

        // Count x against y and the conditioning set together, then regroup those rows by the
        // conditioning configuration alone.
        let parents = given.with(y);
        let y_at = given.iter().take_while(|&v| v < y).count();
        let table = self.counter.counts(x, &parents)?;

        let x_states = table.cardinality();
        let y_states = data.cardinality(y);
        let mut strata: HashMap<Configuration, Vec<u64>> = HashMap::new();
        for (configuration, counts) in table.rows() {
            let mut stratum = Configuration::from_slice(configuration);
            let y_state = stratum.remove(y_at) as usize;
            let joint = strata
                .entry(stratum)
                .or_insert_with(|| vec![0; x_states * y_states]);
            for (x_state, &count) in counts.iter().enumerate() {
                joint[y_state * x_states + x_state] += count;
            }
        }

        let mut statistic = 0.0;
        let mut sparse_cells = 0.0;
        let mut x_margin = vec![0u64; x_states];
        let mut y_margin = vec![0u64; y_states];
        for joint in strata.values() {
            x_margin.iter_mut().for_each(|m| *m = 0);
            y_margin.iter_mut().for_each(|m| *m = 0);
            for (cell, &count) in joint.iter().enumerate() {
                x_margin[cell % x_states] += count;
                y_margin[cell / x_states] += count;
            }
            let total = x_margin.iter().sum::<u64>() as f64;

            for (cell, &observed) in joint.iter().enumerate() {
                let expected =
                    x_margin[cell % x_states] as f64 * y_margin[cell / x_states] as f64 / total;
                if expected < MIN_EXPECTED_COUNT {
                    sparse_cells += 1.0;
                }
                if expected > 0.0 {
                    let difference = observed as f64 - expected;
                    statistic += difference * difference / expected;
                }
            }
        }

        let conditioning_configurations = table.num_configurations() / y_states as f64;
        let cells_per_stratum = (x_states * y_states) as f64;
        let total_cells = cells_per_stratum * conditioning_configurations;
        // Every cell of an unobserved configuration has an expected count of zero.
        sparse_cells += cells_per_stratum * (conditioning_configurations - strata.len() as f64);

        let degrees_of_freedom =
            (x_states as f64 - 1.0) * (y_states as f64 - 1.0) * conditioning_configurations;
        let p_value = if degrees_of_freedom > 0.0 {
            ChiSquared::new(degrees_of_freedom)
                .map(|distribution| distribution.sf(statistic))
                .unwrap_or(1.0)
        } else {
            // A variable with a single state can't depend on anything.
            1.0
        };

        let result = IndependenceTest {
            statistic,
            p_value,
            degrees_of_freedom,
            sufficient_data: sparse_cells <= MAX_SPARSE_FRACTION * total_cells,
        };
        trace!(
            "chi-square {} _|_ {} | {:?}: {:?}",
            data.name(x),
            data.name(y),
            given,
            result
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DatasetBuilder;

    #[test]
    fn perfectly_independent_table_has_zero_statistic() {
        let mut builder = DatasetBuilder::new(&["x", "y"]).unwrap();
        for record in &[["0", "0"], ["0", "1"], ["1", "0"], ["1", "1"]] {
            for _ in 0..10 {
                builder.push_record(record).unwrap();
            }
        }
        let data = builder.build();

        let result = ChiSquareTest::new(&data)
            .test(0, 1, &VariableSet::empty())
            .unwrap();
        assert_eq!(result.statistic, 0.0);
        assert!((result.p_value - 1.0).abs() < 1e-12);
        assert!(result.sufficient_data);
        assert!(result.is_independent(0.05));
    }

    #[test]
    fn sparse_tables_are_flagged() {
        let mut builder = DatasetBuilder::new(&["x", "y", "z"]).unwrap();
        builder.declare_states("z", &["0", "1", "2", "3"]).unwrap();
        for record in &[["0", "0", "0"], ["1", "1", "0"], ["0", "1", "1"]] {
            builder.push_record(record).unwrap();
        }
        let data = builder.build();

        let result = ChiSquareTest::new(&data)
            .test(0, 1, &VariableSet::new(&[2]))
            .unwrap();
        assert!(!result.sufficient_data);
        assert_eq!(result.degrees_of_freedom, 4.0);
        assert!(result.p_value > 0.0 && result.p_value <= 1.0);
    }

    #[test]
    fn single_state_variables_are_independent() {
        let mut builder = DatasetBuilder::new(&["x", "y"]).unwrap();
        builder.push_record(&["a", "0"]).unwrap();
        builder.push_record(&["a", "1"]).unwrap();
        let data = builder.build();

        let result = ChiSquareTest::new(&data)
            .test(0, 1, &VariableSet::empty())
            .unwrap();
        assert_eq!(result.degrees_of_freedom, 0.0);
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn rejects_overlapping_arguments() {
        let mut builder = DatasetBuilder::new(&["x", "y", "z"]).unwrap();
        builder.push_record(&["0", "0", "0"]).unwrap();
        let data = builder.build();
        let tester = ChiSquareTest::new(&data);

        assert!(matches!(
            tester.test(0, 0, &VariableSet::empty()),
            Err(Error::SameVariable(_))
        ));
        assert!(matches!(
            tester.test(0, 1, &VariableSet::new(&[1, 2])),
            Err(Error::ConditioningOverlap(_))
        ));
        assert!(matches!(
            tester.test(0, 5, &VariableSet::empty()),
            Err(Error::UnknownVariable { .. })
        ));
    }
}
