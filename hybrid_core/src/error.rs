// hybrid_core/src/error.rs

use crate::types::Key;
use thiserror::Error;

/// Failures of the discrete table algebra.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TableError {
    #[error("table over {keys} expects {expected} values, got {actual}")]
    WrongSize {
        keys: String,
        expected: usize,
        actual: usize,
    },
    #[error("discrete key {key} appears with cardinalities {first} and {second}")]
    CardinalityMismatch {
        key: Key,
        first: usize,
        second: usize,
    },
    #[error("value {value} is out of range for discrete key {key} with cardinality {cardinality}")]
    ValueOutOfRange {
        key: Key,
        value: usize,
        cardinality: usize,
    },
}

/// Failures of sequential elimination. These always abort the current update.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EliminationError {
    #[error("invalid ordering: {0}")]
    InvalidOrdering(String),
    #[error("variable {0} has no factors left to eliminate it with")]
    NoFactors(Key),
    #[error("linear system is indeterminant at variable {0}")]
    Indeterminant(Key),
    #[error("variable {key} is used with dimensions {first} and {second}")]
    DimensionMismatch {
        key: Key,
        first: usize,
        second: usize,
    },
    #[error("discrete variable {0} is eliminated while a mixture still depends on continuous variables")]
    DiscreteBeforeContinuous(Key),
    #[error("every hypothesis branch is absent while eliminating {0}")]
    AllBranchesAbsent(Key),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Failures of the nonlinear factor layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FactorError {
    #[error("no linearization point for variable {0}")]
    MissingValue(Key),
    #[error("factor expects {expected} variables, got {actual}")]
    WrongArity { expected: usize, actual: usize },
    #[error("hybrid factor over {keys} expects {expected} components, got {actual}")]
    WrongComponentCount {
        keys: String,
        expected: usize,
        actual: usize,
    },
}

/// Everything the smoother can report. All variants are fatal for the call
/// that produced them.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SmootherError {
    #[error("belief store invariant violated: {0}")]
    Invariant(String),
    #[error("selected hypothesis branch for {key} was pruned")]
    AbsentBranch { key: Key },
    #[error("max_leaves must be at least 1")]
    InvalidMaxLeaves,
    #[error("marginal_threshold must lie in (0.5, 1], got {0}")]
    InvalidMarginalThreshold(f64),
    #[error("elimination failed: {0}")]
    Elimination(#[from] EliminationError),
    #[error(transparent)]
    Table(#[from] TableError),
}
