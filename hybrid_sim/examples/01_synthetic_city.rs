// hybrid_sim/examples/01_synthetic_city.rs

//! Generates a synthetic city-block dataset, replays it through the hybrid
//! smoother and reports how far the estimate ends up from the ground truth.
//!
//! To run this example:
//! `cargo run --example 01_synthetic_city`

use hybrid_core::nonlinear::wrap_angle;
use hybrid_core::types::x;
use hybrid_sim::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), SimError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info,hybrid_sim=info"))
        .init();

    // --- 1. Make a dataset with ambiguous odometry and a few bad loop closures ---
    let data = generate(&GeneratorConfig {
        steps: 300,
        gps_interval: Some(25),
        ..GeneratorConfig::default()
    })?;

    // --- 2. Replay it ---
    let config = ExperimentConfig::load(Some("assets/experiment.toml".as_ref()))?;
    let mut experiment = Experiment::new(config)?;
    let report = experiment.run(data.records.into_iter().map(Ok))?;

    // --- 3. Compare against the truth ---
    let mut worst_position: f64 = 0.0;
    let mut worst_heading: f64 = 0.0;
    for (i, truth) in data.ground_truth.iter().enumerate() {
        let estimate = report.result.at(x(i as u64))?;
        worst_position = worst_position.max((estimate.translation() - truth.translation()).norm());
        worst_heading = worst_heading.max(wrap_angle(estimate.theta - truth.theta).abs());
    }
    println!(
        "{} poses, {} updates, worst position error {:.3} m, worst heading error {:.4} rad",
        data.ground_truth.len(),
        report.update_times.len(),
        worst_position,
        worst_heading
    );
    Ok(())
}
