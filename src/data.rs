//! Fully observed categorical datasets.
//!
//! A [`Dataset`] stores one column per variable, where each cell is the index of that record's
//! state in the variable's domain. Domains are fixed once the dataset is built, either because
//! they were declared up front or because they were inferred from the labels that appeared.

use crate::error::{Error, Result};
use crate::{Variable, VariableSet};
use lasso::{Rodeo, Spur};
use std::collections::HashMap;
use std::ops::Range;

/// An immutable table of categorical observations.
#[derive(Clone, Debug)]
pub struct Dataset {
    names: Vec<String>,
    states: Vec<Vec<String>>,
    columns: Vec<Vec<u32>>,
    records: usize,
}

impl Dataset {
    /// The number of variables (columns).
    pub fn num_variables(&self) -> usize {
        self.names.len()
    }

    /// Every variable index, in column order.
    pub fn variables(&self) -> Range<Variable> {
        0..self.names.len()
    }

    /// The number of records (rows).
    pub fn len(&self) -> usize {
        self.records
    }

    /// Returns `true` if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Looks up a variable by name.
    pub fn variable(&self, name: &str) -> Result<Variable> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::UnknownVariableName(name.to_owned()))
    }

    /// Looks up a set of variables by name.
    pub fn variable_set<S: AsRef<str>>(&self, names: &[S]) -> Result<VariableSet> {
        names.iter().map(|name| self.variable(name.as_ref())).collect()
    }

    /// The name of a variable.
    ///
    /// # Panics
    ///
    /// Panics if `variable` is out of range; use [`Dataset::check`] first for untrusted input.
    pub fn name(&self, variable: Variable) -> &str {
        &self.names[variable]
    }

    /// The labels of a variable's states, in state-index order.
    pub fn states(&self, variable: Variable) -> &[String] {
        &self.states[variable]
    }

    /// The number of states in a variable's domain.
    pub fn cardinality(&self, variable: Variable) -> usize {
        self.states[variable].len()
    }

    /// Returns an error unless `variable` names a column of this dataset.
    pub fn check(&self, variable: Variable) -> Result<()> {
        if variable < self.names.len() {
            Ok(())
        } else {
            Err(Error::UnknownVariable {
                variable,
                count: self.names.len(),
            })
        }
    }

    pub(crate) fn column(&self, variable: Variable) -> &[u32] {
        &self.columns[variable]
    }
}

/// Collects records into a [`Dataset`].
///
/// Labels are interned as they arrive so that large datasets with few distinct states stay
/// compact until the domains are settled in [`DatasetBuilder::build`].
///
/// ```
/// use bnstructure::DatasetBuilder;
///
/// let mut builder = DatasetBuilder::new(&["sky", "grass"]).unwrap();
/// builder.declare_states("sky", &["sunny", "cloudy", "rainy"]).unwrap();
/// builder.push_record(&["rainy", "wet"]).unwrap();
/// builder.push_record(&["sunny", "dry"]).unwrap();
/// assert!(builder.push_record(&["foggy", "dry"]).is_err());
///
/// let data = builder.build();
/// assert_eq!(data.len(), 2);
/// assert_eq!(data.cardinality(0), 3);
/// assert_eq!(data.states(1), &["dry", "wet"]);
/// ```
pub struct DatasetBuilder {
    names: Vec<String>,
    labels: Rodeo,
    declared: Vec<Option<Vec<Spur>>>,
    cells: Vec<Vec<Spur>>,
    records: usize,
}

impl DatasetBuilder {
    /// Starts a dataset with the given column names.
    pub fn new<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut seen = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if seen.iter().any(|n: &String| n == name) {
                return Err(Error::DuplicateVariable(name.to_owned()));
            }
            seen.push(name.to_owned());
        }
        Ok(DatasetBuilder {
            declared: vec![None; seen.len()],
            cells: vec![Vec::new(); seen.len()],
            names: seen,
            labels: Rodeo::new(),
            records: 0,
        })
    }

    /// Fixes the domain of a variable, in the given state order.
    ///
    /// Records pushed afterwards must use one of these labels for this variable. Declaring a
    /// state which never occurs is fine; it still counts toward the variable's cardinality.
    pub fn declare_states<S: AsRef<str>>(
        &mut self,
        variable: &str,
        states: &[S],
    ) -> Result<&mut Self> {
        let index = self
            .names
            .iter()
            .position(|n| n == variable)
            .ok_or_else(|| Error::UnknownVariableName(variable.to_owned()))?;
        if states.is_empty() {
            return Err(Error::EmptyDomain(variable.to_owned()));
        }

        let mut domain: Vec<Spur> = Vec::with_capacity(states.len());
        for state in states {
            let key = self.labels.get_or_intern(state.as_ref());
            if !domain.contains(&key) {
                domain.push(key);
            }
        }

        // Earlier records must agree with the new declaration too.
        if let Some(bad) = self.cells[index].iter().find(|key| !domain.contains(key)) {
            return Err(Error::UndeclaredState {
                variable: variable.to_owned(),
                state: self.labels.resolve(bad).to_owned(),
            });
        }

        self.declared[index] = Some(domain);
        Ok(self)
    }

    /// Appends one record, listing a state label for every variable in column order.
    pub fn push_record<S: AsRef<str>>(&mut self, record: &[S]) -> Result<&mut Self> {
        if record.len() != self.names.len() {
            return Err(Error::RecordLength {
                record: self.records,
                expected: self.names.len(),
                found: record.len(),
            });
        }

        // Validate the whole record before touching any column so a rejected record leaves the
        // builder unchanged.
        let mut keys = Vec::with_capacity(record.len());
        for (index, label) in record.iter().enumerate() {
            let label = label.as_ref();
            let key = match &self.declared[index] {
                Some(domain) => match self.labels.get(label) {
                    Some(key) if domain.contains(&key) => key,
                    _ => {
                        return Err(Error::UndeclaredState {
                            variable: self.names[index].clone(),
                            state: label.to_owned(),
                        })
                    }
                },
                None => self.labels.get_or_intern(label),
            };
            keys.push(key);
        }

        for (column, key) in self.cells.iter_mut().zip(keys) {
            column.push(key);
        }
        self.records += 1;
        Ok(self)
    }

    /// The number of records pushed so far.
    pub fn len(&self) -> usize {
        self.records
    }

    /// Returns `true` if no records have been pushed.
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Settles every domain and produces the dataset.
    ///
    /// Variables without a declared domain get the sorted set of labels that occurred for them,
    /// so state indices don't depend on record order.
    pub fn build(self) -> Dataset {
        let DatasetBuilder {
            names,
            labels,
            declared,
            cells,
            records,
        } = self;

        let mut states = Vec::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());
        for (domain, cells) in declared.into_iter().zip(cells) {
            let domain = domain.unwrap_or_else(|| {
                let mut observed = cells.clone();
                observed.sort_unstable_by(|a, b| labels.resolve(a).cmp(labels.resolve(b)));
                observed.dedup();
                observed
            });

            let index: HashMap<Spur, u32> = domain
                .iter()
                .enumerate()
                .map(|(i, key)| (*key, i as u32))
                .collect();
            columns.push(cells.iter().map(|key| index[key]).collect());
            states.push(
                domain
                    .iter()
                    .map(|key| labels.resolve(key).to_owned())
                    .collect(),
            );
        }

        Dataset {
            names,
            states,
            columns,
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inferred_domains_are_sorted() {
        let mut builder = DatasetBuilder::new(&["a", "b"]).unwrap();
        builder.push_record(&["z", "1"]).unwrap();
        builder.push_record(&["x", "0"]).unwrap();
        builder.push_record(&["z", "0"]).unwrap();
        let data = builder.build();

        assert_eq!(data.states(0), &["x", "z"]);
        assert_eq!(data.column(0), &[1, 0, 1]);
        assert_eq!(data.column(1), &[1, 0, 0]);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            DatasetBuilder::new(&["a", "a"]),
            Err(Error::DuplicateVariable(_))
        ));

        let mut builder = DatasetBuilder::new(&["a", "b"]).unwrap();
        assert!(matches!(
            builder.push_record(&["only one"]),
            Err(Error::RecordLength { expected: 2, found: 1, .. })
        ));
        builder.push_record(&["p", "q"]).unwrap();
        assert!(matches!(
            builder.declare_states("a", &["r"]),
            Err(Error::UndeclaredState { .. })
        ));
        assert!(matches!(
            builder.declare_states("c", &["r"]),
            Err(Error::UnknownVariableName(_))
        ));
        assert!(builder.declare_states("a", &["r", "p"]).is_ok());
        assert_eq!(builder.len(), 1);

        let data = builder.build();
        assert_eq!(data.states(0), &["r", "p"]);
        assert!(data.check(2).is_err());
        assert!(matches!(data.variable("nope"), Err(Error::UnknownVariableName(_))));
    }
}
