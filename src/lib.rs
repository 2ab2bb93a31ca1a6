#![warn(missing_docs)]
#![doc(test(no_crate_inject))]
#![doc(test(attr(deny(unused, future_incompatible))))]

//! This crate learns the structure of discrete Bayesian networks from fully observed categorical
//! data, using the three families of algorithms described in:
//!
//! - Koller & Friedman, *Probabilistic Graphical Models*, 2009, chapter 18
//! - Spirtes, Glymour & Scheines, *Causation, Prediction, and Search*, 2000
//! - Tsamardinos, Brown & Aliferis, [The max-min hill-climbing Bayesian network structure
//!   learning algorithm][mmhc], 2006
//!
//! [mmhc]: https://doi.org/10.1007/s10994-006-6889-7
//!
//! Score-based search ([`search`]) ranks candidate DAGs with a decomposable [`score`]. Constraint
//! based construction ([`constraint`]) runs the PC algorithm over conditional [`independence`]
//! tests and orients the result with Meek's rules. The [`hybrid`] estimator combines both.
//!
//! Every estimator reads its data through the memoized contingency tables in [`counts`], which
//! are built from a [`Dataset`].
//!
//! ```
//! use bnstructure::{DatasetBuilder, HillClimbConfig, HillClimbSearch, ScoreMethod, Scorer};
//!
//! let mut builder = DatasetBuilder::new(&["rain", "wet"]).unwrap();
//! for _ in 0..50 {
//!     builder.push_record(&["yes", "yes"]).unwrap();
//!     builder.push_record(&["no", "no"]).unwrap();
//! }
//! let data = builder.build();
//!
//! let scorer = Scorer::new(&data, ScoreMethod::Bic).unwrap();
//! let dag = HillClimbSearch::new(&scorer, HillClimbConfig::default())
//!     .unwrap()
//!     .estimate()
//!     .unwrap();
//! assert_eq!(dag.num_edges(), 1);
//! ```

pub use sorted_iter;

use smallvec::SmallVec;
use sorted_iter::assume::AssumeSortedByItemExt;
use sorted_iter::sorted_iterator::SortedByItem;
use sorted_iter::SortedIterator;
use std::iter;

pub mod constraint;
pub mod counts;
pub mod data;
pub mod error;
pub mod graph;
pub mod hybrid;
pub mod independence;
pub mod score;
pub mod search;

pub use constraint::{
    ChiSquareOracle, ConstraintEstimator, DSeparationOracle, IndependenceOracle,
    OrientationRules, PcConfig, PcVariant, SeparatingSets,
};
pub use counts::{ContingencyTable, StateCounter};
pub use data::{Dataset, DatasetBuilder};
pub use error::{Error, Result};
pub use graph::{Dag, Pdag};
pub use hybrid::{MmhcConfig, MmhcEstimator};
pub use independence::{ChiSquareTest, IndependenceTest};
pub use score::{ScoreMethod, Scorer};
pub use search::{
    ExhaustiveSearch, HillClimbConfig, HillClimbSearch, Operation, SearchOutcome, Termination,
};

/// Identifies a variable by its column index in a [`Dataset`]. Graph nodes use the same indices.
pub type Variable = usize;

/// Parent sets rarely grow past a handful of variables, especially when searches bound the
/// in-degree, so this many fit inline before a set spills to the heap.
const INLINE_VARIABLES: usize = 4;

/// A sorted set of variables, used for parent sets, conditioning sets, and node adjacencies.
///
/// This implementation avoids heap allocations for sets of up to four variables.
#[derive(Clone, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VariableSet(SmallVec<[Variable; INLINE_VARIABLES]>);

impl VariableSet {
    /// Creates a variable set containing the specified variables.
    ///
    /// It's okay if the provided slice contains duplicates.
    pub fn new(ids: &[Variable]) -> Self {
        let mut v = SmallVec::from_slice(ids);
        v.sort_unstable();
        v.dedup();
        VariableSet(v)
    }

    /// Creates a set with no variables in it.
    pub fn empty() -> Self {
        VariableSet(SmallVec::new())
    }

    /// The number of variables in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set has no variables in it.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the variables in ascending order.
    pub fn as_slice(&self) -> &[Variable] {
        &self.0
    }

    /// Returns an iterator over the variables which appear in this set.
    ///
    /// ```
    /// use bnstructure::VariableSet;
    ///
    /// let abc = VariableSet::new(&[2, 3, 1]);
    /// let mut it = abc.iter();
    /// assert_eq!(it.next(), Some(1));
    /// assert_eq!(it.next(), Some(2));
    /// assert_eq!(it.next(), Some(3));
    /// assert_eq!(it.next(), None);
    /// ```
    pub fn iter(&self) -> impl Iterator<Item = Variable> + SortedByItem + Clone + '_ {
        self.0.iter().copied().assume_sorted_by_item()
    }

    /// Returns `true` if `variable` is in this set.
    pub fn contains(&self, variable: Variable) -> bool {
        self.0.binary_search(&variable).is_ok()
    }

    /// Returns the position of `variable` in the set's sorted order, if present.
    ///
    /// Contingency tables list each parent configuration in this order.
    pub fn position(&self, variable: Variable) -> Option<usize> {
        self.0.binary_search(&variable).ok()
    }

    /// Returns `true` if `other` contains every variable that `self` does.
    ///
    /// ```
    /// use bnstructure::VariableSet;
    /// let nil = VariableSet::new(&[]);
    /// let one = VariableSet::new(&[1]);
    ///
    /// assert!(nil.is_subset(&one));
    /// assert!(nil.is_subset(&nil));
    /// assert!(one.is_subset(&one));
    /// assert!(!one.is_subset(&nil));
    /// ```
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.iter().intersection(other.iter()).eq(self.iter())
    }

    /// Returns a copy of this set with `variable` added.
    pub fn with(&self, variable: Variable) -> Self {
        let mut set = self.clone();
        if let Err(at) = set.0.binary_search(&variable) {
            set.0.insert(at, variable);
        }
        set
    }

    /// Returns a copy of this set with `variable` removed.
    pub fn without(&self, variable: Variable) -> Self {
        let mut set = self.clone();
        if let Ok(at) = set.0.binary_search(&variable) {
            set.0.remove(at);
        }
        set
    }

    /// Returns every variable in either set.
    ///
    /// ```
    /// use bnstructure::VariableSet;
    ///
    /// let ab = VariableSet::new(&[1, 2]);
    /// let bc = VariableSet::new(&[2, 3]);
    /// assert_eq!(ab.union(&bc), VariableSet::new(&[1, 2, 3]));
    /// assert_eq!(ab.difference(&bc), VariableSet::new(&[1]));
    /// ```
    pub fn union(&self, other: &Self) -> Self {
        self.iter().union(other.iter()).collect()
    }

    /// Returns the variables in `self` which are not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        self.iter().difference(other.iter()).collect()
    }

    /// Returns an iterator over every subset of this set with exactly `size` variables, in
    /// lexicographic order.
    ///
    /// ```
    /// use bnstructure::VariableSet;
    ///
    /// let abc = VariableSet::new(&[1, 2, 3]);
    /// let pairs: Vec<_> = abc.subsets(2).collect();
    /// assert_eq!(pairs, vec![
    ///     VariableSet::new(&[1, 2]),
    ///     VariableSet::new(&[1, 3]),
    ///     VariableSet::new(&[2, 3]),
    /// ]);
    /// assert_eq!(abc.subsets(0).count(), 1);
    /// assert_eq!(abc.subsets(4).count(), 0);
    /// ```
    pub fn subsets(&self, size: usize) -> impl Iterator<Item = VariableSet> + '_ {
        // Each step advances the rightmost index that still has room to move, then packs the
        // indices after it as tightly as possible.
        fn advance(mut indices: Vec<usize>, len: usize) -> Option<Vec<usize>> {
            let size = indices.len();
            let slot = (0..size).rev().find(|&i| indices[i] < len - size + i)?;
            indices[slot] += 1;
            for i in slot + 1..size {
                indices[i] = indices[i - 1] + 1;
            }
            Some(indices)
        }

        let len = self.len();
        let mut next = if size <= len {
            Some((0..size).collect::<Vec<_>>())
        } else {
            None
        };
        iter::from_fn(move || {
            let indices = next.take()?;
            let subset = VariableSet(indices.iter().map(|&i| self.0[i]).collect());
            next = advance(indices, len);
            Some(subset)
        })
    }
}

impl std::fmt::Debug for VariableSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl iter::FromIterator<Variable> for VariableSet {
    /// Creates a variable set containing the specified variables.
    ///
    /// It's okay if the provided iterator contains duplicates.
    fn from_iter<I: IntoIterator<Item = Variable>>(iter: I) -> Self {
        let mut v: SmallVec<[Variable; INLINE_VARIABLES]> = iter.into_iter().collect();
        v.sort_unstable();
        v.dedup();
        VariableSet(v)
    }
}
