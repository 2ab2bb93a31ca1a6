//! The error type shared by every fallible operation in this crate.

use crate::Variable;

/// Errors reported for malformed input or configuration.
///
/// None of these are raised for conditions the algorithms treat as normal outcomes: exhausting a
/// search budget, an unreliable independence test, or a PDAG with no faithful extension all
/// produce a result instead.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("variable index {variable} is out of range for a dataset with {count} variables")]
    UnknownVariable { variable: Variable, count: usize },

    #[error("no variable named {0:?}")]
    UnknownVariableName(String),

    #[error("variable {0:?} cannot be its own parent")]
    SelfParent(String),

    #[error("cannot test variable {0:?} for independence from itself")]
    SameVariable(String),

    #[error("variable {0:?} is tested and also in the conditioning set")]
    ConditioningOverlap(String),

    #[error("equivalent sample size must be finite and positive, got {0}")]
    InvalidSampleSize(f64),

    #[error("significance level must lie strictly between 0 and 1, got {0}")]
    InvalidSignificanceLevel(f64),

    #[error("dataset has no records")]
    EmptyDataset,

    #[error("variable {0:?} is declared more than once")]
    DuplicateVariable(String),

    #[error("variable {0:?} must have at least one state")]
    EmptyDomain(String),

    #[error("record {record} has {found} fields, expected {expected}")]
    RecordLength {
        record: usize,
        expected: usize,
        found: usize,
    },

    #[error("state {state:?} is not declared for variable {variable:?}")]
    UndeclaredState { variable: String, state: String },

    #[error("adding edge {from} -> {to} would create a cycle")]
    Cycle { from: Variable, to: Variable },

    #[error("invalid edge {from} -> {to}: {reason}")]
    InvalidEdge {
        from: Variable,
        to: Variable,
        reason: &'static str,
    },

    #[error("graph has {found} nodes but the dataset has {expected} variables")]
    GraphSize { expected: usize, found: usize },

    #[error("exhaustive search over {count} variables exceeds the limit of {limit}")]
    TooManyVariables { count: usize, limit: usize },
}

/// Shorthand for results carrying this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
