// hybrid_core/src/lib.rs

//! Incremental smoothing over hybrid (discrete + continuous) factor graphs.
//!
//! New measurements arrive as [`hybrid::HybridFactorGraph`] batches, usually
//! linearized from a [`nonlinear::HybridNonlinearFactorGraph`]. The
//! [`smoother::HybridSmoother`] eliminates each batch together with the part
//! of the stored posterior it touches, prunes unlikely discrete hypotheses
//! and keeps the result as a hybrid Bayes network.

pub mod discrete;
pub mod error;
pub mod hybrid;
pub mod linear;
pub mod nonlinear;
pub mod ordering;
pub mod prelude;
pub mod smoother;
pub mod types;
