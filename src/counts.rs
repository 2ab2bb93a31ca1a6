//! Sufficient statistics: counts of a variable's states for every observed configuration of a
//! parent set.
//!
//! Scoring and independence testing both reduce to these tables, and searches ask for
//! overlapping `(variable, parents)` pairs over and over, so [`StateCounter`] memoizes every
//! table it builds.

use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::{Variable, VariableSet};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The states of a parent set for one group of records, listed in the parent set's sorted order.
pub type Configuration = SmallVec<[u32; 4]>;

/// A sparse contingency table of one variable's states against its parents' configurations.
///
/// As the number of parents grows, the number of possible configurations quickly exceeds the
/// number of records, so only configurations which actually occur get a row. Missing rows
/// should be treated as all zeroes.
#[derive(Clone, Debug, PartialEq)]
pub struct ContingencyTable {
    variable: Variable,
    parents: VariableSet,
    cardinality: usize,
    num_configurations: f64,
    sample_size: u64,
    rows: HashMap<Configuration, Vec<u64>>,
}

impl ContingencyTable {
    fn build(data: &Dataset, variable: Variable, parents: &VariableSet) -> Self {
        let cardinality = data.cardinality(variable);
        let num_configurations = parents
            .iter()
            .map(|parent| data.cardinality(parent) as f64)
            .product();

        let target = data.column(variable);
        let columns: Vec<&[u32]> = parents.iter().map(|parent| data.column(parent)).collect();

        let mut rows: HashMap<Configuration, Vec<u64>> = HashMap::new();
        // Reuse the same buffer for every record to avoid hammering the allocator; it's only
        // cloned when a configuration is seen for the first time.
        let mut configuration = Configuration::with_capacity(columns.len());
        for (record, state) in target.iter().enumerate() {
            configuration.clear();
            configuration.extend(columns.iter().map(|column| column[record]));
            if let Some(row) = rows.get_mut(&configuration) {
                row[*state as usize] += 1;
            } else {
                let mut row = vec![0; cardinality];
                row[*state as usize] = 1;
                rows.insert(configuration.clone(), row);
            }
        }
        rows.shrink_to_fit();

        ContingencyTable {
            variable,
            parents: parents.clone(),
            cardinality,
            num_configurations,
            sample_size: target.len() as u64,
            rows,
        }
    }

    /// The variable whose states are counted.
    pub fn variable(&self) -> Variable {
        self.variable
    }

    /// The parent set whose configurations key the rows.
    pub fn parents(&self) -> &VariableSet {
        &self.parents
    }

    /// The number of states of the counted variable, including states never observed.
    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    /// The number of possible parent configurations, observed or not.
    ///
    /// This is a floating-point value because it's a product of cardinalities that can overflow
    /// any integer type long before it stops being useful in a penalty term.
    pub fn num_configurations(&self) -> f64 {
        self.num_configurations
    }

    /// The total count across every cell.
    pub fn sample_size(&self) -> u64 {
        self.sample_size
    }

    /// The number of parent configurations that were actually observed.
    pub fn num_observed_configurations(&self) -> usize {
        self.rows.len()
    }

    /// Returns the counts for one configuration, or `None` if it never occurred.
    pub fn row(&self, configuration: &[u32]) -> Option<&[u64]> {
        self.rows.get(configuration).map(Vec::as_slice)
    }

    /// Iterates over the observed configurations and their counts, in no particular order.
    pub fn rows(&self) -> impl Iterator<Item = (&[u32], &[u64])> + '_ {
        self.rows
            .iter()
            .map(|(configuration, counts)| (configuration.as_slice(), counts.as_slice()))
    }
}

/// Builds and memoizes [`ContingencyTable`]s for one dataset.
///
/// The cache lives behind a `RefCell`, so a counter can be shared by reference between a scorer
/// and the search driving it, but not across threads.
pub struct StateCounter<'a> {
    data: &'a Dataset,
    cache: RefCell<HashMap<(Variable, VariableSet), Rc<ContingencyTable>>>,
}

impl<'a> StateCounter<'a> {
    /// Creates a counter with an empty cache.
    pub fn new(data: &'a Dataset) -> Self {
        StateCounter {
            data,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// The dataset being counted.
    pub fn data(&self) -> &'a Dataset {
        self.data
    }

    /// Returns the contingency table of `variable` against `parents`.
    ///
    /// ```
    /// use bnstructure::{DatasetBuilder, StateCounter, VariableSet};
    ///
    /// let mut builder = DatasetBuilder::new(&["a", "b"]).unwrap();
    /// builder.push_record(&["0", "x"]).unwrap();
    /// builder.push_record(&["1", "x"]).unwrap();
    /// builder.push_record(&["1", "x"]).unwrap();
    /// builder.declare_states("b", &["x", "y"]).unwrap();
    /// let data = builder.build();
    ///
    /// let counter = StateCounter::new(&data);
    /// let table = counter.counts(0, &VariableSet::new(&[1])).unwrap();
    /// assert_eq!(table.row(&[0]), Some(&[1, 2][..]));
    /// assert_eq!(table.row(&[1]), None);
    /// assert_eq!(table.num_configurations(), 2.0);
    /// ```
    pub fn counts(
        &self,
        variable: Variable,
        parents: &VariableSet,
    ) -> Result<Rc<ContingencyTable>> {
        self.check_family(variable, parents)?;

        let key = (variable, parents.clone());
        if let Some(table) = self.cache.borrow().get(&key) {
            return Ok(Rc::clone(table));
        }

        let table = Rc::new(ContingencyTable::build(self.data, variable, parents));
        self.cache.borrow_mut().insert(key, Rc::clone(&table));
        Ok(table)
    }

    /// The number of distinct tables built so far.
    pub fn cached_tables(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Checks that `variable` and `parents` are columns of the dataset and that the variable isn't
    /// one of its own parents.
    pub fn check_family(&self, variable: Variable, parents: &VariableSet) -> Result<()> {
        self.data.check(variable)?;
        for parent in parents.iter() {
            self.data.check(parent)?;
        }
        if parents.contains(variable) {
            return Err(Error::SelfParent(self.data.name(variable).to_owned()));
        }
        Ok(())
    }
}
