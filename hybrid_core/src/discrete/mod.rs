// hybrid_core/src/discrete/mod.rs

//! Discrete factors and conditionals over joint assignments of discrete keys.

pub mod branches;
pub mod conditional;
pub mod table;

pub use branches::{all_assignments, cardinality_product, Assignment, Branches};
pub use conditional::DiscreteConditional;
pub use table::{ArgmaxTable, DiscreteTable, Reduce};
