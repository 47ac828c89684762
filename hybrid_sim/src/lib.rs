// hybrid_sim/src/lib.rs

// This prelude is for convenience for other files WITHIN the hybrid_sim crate.
pub mod prelude;

pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod experiment;
pub mod generate;
