// hybrid_core/src/nonlinear/mod.rs

//! Planar pose factors and the nonlinear hybrid graph that feeds the
//! smoother after linearization.

pub mod factor;
pub mod gps;
pub mod graph;
pub mod hybrid;
pub mod pose2;
pub mod values;

pub use factor::{BetweenFactorPose2, Evaluation, NonlinearFactor, PriorFactorPose2};
pub use gps::GpsFactor;
pub use graph::{HybridNonlinearFactorGraph, NonlinearEntry};
pub use hybrid::HybridNonlinearFactor;
pub use pose2::{rotation, wrap_angle, Pose2};
pub use values::Values;
