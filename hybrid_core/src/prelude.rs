// hybrid_core/src/prelude.rs

// --- Core Data Structures ---
pub use crate::types::{l, m, x, DiscreteKey, DiscreteValues, HybridEstimate, Key, VectorValues};

// --- Errors ---
pub use crate::error::{EliminationError, FactorError, SmootherError, TableError};

// --- Factors and Conditionals ---
pub use crate::discrete::{DiscreteConditional, DiscreteTable};
pub use crate::hybrid::{
    HybridBayesNet, HybridConditional, HybridFactor, HybridFactorGraph, HybridGaussianConditional,
    HybridGaussianFactor,
};
pub use crate::linear::{DiagonalNoise, GaussianConditional, JacobianFactor};

// --- Nonlinear Modelling ---
pub use crate::nonlinear::{
    BetweenFactorPose2, GpsFactor, HybridNonlinearFactor, HybridNonlinearFactorGraph, NonlinearFactor, Pose2,
    PriorFactorPose2, Values,
};

// --- The Smoother ---
pub use crate::ordering::Ordering;
pub use crate::smoother::{FrontierStrategy, HybridSmoother, SmootherParams, UpdateSummary};
