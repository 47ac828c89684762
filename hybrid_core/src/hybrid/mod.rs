// hybrid_core/src/hybrid/mod.rs

//! Hybrid factors, conditionals, elimination and pruning.

pub mod bayes_net;
pub mod conditional;
pub mod elimination;
pub mod factor;
pub mod graph;
pub mod prune;

pub use bayes_net::HybridBayesNet;
pub use conditional::{HybridConditional, HybridGaussianConditional};
pub use elimination::eliminate_sequential;
pub use factor::{HybridFactor, HybridGaussianFactor};
pub use graph::HybridFactorGraph;
pub use prune::{prune, PruneOutcome};
