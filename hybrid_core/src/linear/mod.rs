// hybrid_core/src/linear/mod.rs

//! Whitened linear Gaussian factors, conditionals and their Bayes network.

pub mod bayes_net;
pub mod conditional;
pub mod jacobian;
pub mod noise;

pub use bayes_net::GaussianBayesNet;
pub use conditional::{GaussianConditional, SolveFailure};
pub use jacobian::JacobianFactor;
pub use noise::DiagonalNoise;
