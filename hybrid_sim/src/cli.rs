// hybrid_sim/src/cli.rs

use crate::config::ExperimentConfig;
use crate::generate::GeneratorConfig;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Incremental hybrid smoothing on pose-graph datasets with ambiguous
/// odometry and uncertain loop closures.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Replay a dataset through the smoother and write the estimated poses.
    Run(RunArgs),
    /// Write a synthetic dataset and its ground truth.
    Generate(GenerateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// The dataset to replay.
    pub dataset: PathBuf,

    /// Experiment TOML layered over the built-in defaults.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Where to write `x y θ` per pose.
    #[arg(short, long, default_value = "hybrid_poses.txt")]
    pub output: PathBuf,

    /// Where to write the accumulated time after every odometry edge.
    #[arg(long, default_value = "hybrid_poses_time.txt")]
    pub timing_output: PathBuf,

    /// Also write the dataset index and duration of every smoother update.
    #[arg(long)]
    pub update_timing_output: Option<PathBuf>,

    #[arg(long)]
    pub max_loop_count: Option<usize>,

    #[arg(long)]
    pub update_frequency: Option<usize>,

    #[arg(long)]
    pub max_nr_hypotheses: Option<usize>,

    #[arg(long)]
    pub relinearization_frequency: Option<usize>,

    /// Print the resolved configuration as TOML and exit.
    #[arg(long, default_value_t = false)]
    pub print_config: bool,
}

impl RunArgs {
    /// Flags given on the command line win over the configuration file.
    pub fn apply_overrides(&self, config: &mut ExperimentConfig) {
        if let Some(v) = self.max_loop_count {
            config.max_loop_count = v;
        }
        if let Some(v) = self.update_frequency {
            config.update_frequency = v;
        }
        if let Some(v) = self.max_nr_hypotheses {
            config.max_nr_hypotheses = v;
        }
        if let Some(v) = self.relinearization_frequency {
            config.relinearization_frequency = v;
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Where to write the dataset.
    pub output: PathBuf,

    /// Where to write the true `x y θ` per pose.
    #[arg(long)]
    pub ground_truth: Option<PathBuf>,

    #[arg(long, default_value_t = 500)]
    pub steps: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 0.2)]
    pub ambiguity_probability: f64,

    #[arg(long, default_value_t = 0.05)]
    pub loop_probability: f64,

    #[arg(long, default_value_t = 0.1)]
    pub outlier_probability: f64,

    /// Emit a GPS fix every N poses.
    #[arg(long)]
    pub gps_interval: Option<usize>,
}

impl From<&GenerateArgs> for GeneratorConfig {
    fn from(args: &GenerateArgs) -> Self {
        Self {
            steps: args.steps,
            seed: args.seed,
            ambiguity_probability: args.ambiguity_probability,
            loop_probability: args.loop_probability,
            outlier_probability: args.outlier_probability,
            gps_interval: args.gps_interval,
            ..GeneratorConfig::default()
        }
    }
}
