// hybrid_sim/src/prelude.rs

pub use crate::config::{ExperimentConfig, NoiseConfig};
pub use crate::dataset::{parse_line, DatasetReader, Edge, Record};
pub use crate::error::{DatasetError, SimError};
pub use crate::experiment::{write_poses, write_times, write_update_times, Experiment, ExperimentReport};
pub use crate::generate::{generate, GeneratorConfig, SyntheticDataset};
