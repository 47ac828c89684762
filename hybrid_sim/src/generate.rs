// hybrid_sim/src/generate.rs

//! Synthetic city-block datasets with a known ground truth.

use crate::dataset::{Edge, Record};
use crate::error::SimError;
use hybrid_core::nonlinear::Pose2;
use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::FRAC_PI_2;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// Odometry edges to emit; the trajectory has one more pose.
    pub steps: usize,
    pub seed: u64,
    /// Chance that an odometry edge carries a second, wrong candidate.
    pub ambiguity_probability: f64,
    /// Forward offset of the wrong candidate.
    pub decoy_offset: f64,
    /// Chance of a loop closure after each step.
    pub loop_probability: f64,
    /// Chance that a loop closure is an outlier.
    pub outlier_probability: f64,
    /// Chance of a 90 degree turn at each step.
    pub turn_probability: f64,
    /// Emit a GPS fix every this many poses.
    pub gps_interval: Option<usize>,
    /// Odometry noise `[x, y, θ]`.
    pub odometry_sigmas: [f64; 3],
    pub gps_sigma: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            steps: 500,
            seed: 42,
            ambiguity_probability: 0.2,
            decoy_offset: 0.5,
            loop_probability: 0.05,
            outlier_probability: 0.1,
            turn_probability: 0.1,
            gps_interval: None,
            odometry_sigmas: [0.01, 0.01, 0.002],
            gps_sigma: 0.5,
        }
    }
}

/// Dataset lines plus the true pose of every key.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticDataset {
    pub records: Vec<Record>,
    pub ground_truth: Vec<Pose2>,
}

/// Deterministic for a given configuration, seed included.
pub fn generate(config: &GeneratorConfig) -> Result<SyntheticDataset, SimError> {
    let probabilities = [
        ("ambiguity_probability", config.ambiguity_probability),
        ("loop_probability", config.loop_probability),
        ("outlier_probability", config.outlier_probability),
        ("turn_probability", config.turn_probability),
    ];
    for (name, p) in probabilities {
        if !(0.0..=1.0).contains(&p) {
            return Err(SimError::InvalidConfig(format!("{name} must lie in [0, 1], got {p}")));
        }
    }
    let normal = |sigma: f64| {
        Normal::new(0.0, sigma).map_err(|e| SimError::InvalidConfig(format!("noise sigma {sigma}: {e}")))
    };
    let [sx, sy, st] = config.odometry_sigmas;
    let (nx, ny, nt) = (normal(sx)?, normal(sy)?, normal(st)?);
    let gps_noise = normal(config.gps_sigma)?;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut truth = vec![Pose2::identity()];
    let mut records = Vec::new();

    for i in 0..config.steps {
        // --- Odometry ---
        let turn = if rng.gen_bool(config.turn_probability) {
            if rng.gen_bool(0.5) {
                FRAC_PI_2
            } else {
                -FRAC_PI_2
            }
        } else {
            0.0
        };
        let step = Pose2::new(1.0, 0.0, turn);
        let next = truth[i].compose(&step);
        truth.push(next);

        let measured = Pose2::new(
            step.x + nx.sample(&mut rng),
            step.y + ny.sample(&mut rng),
            step.theta + nt.sample(&mut rng),
        );
        let measurements = if rng.gen_bool(config.ambiguity_probability) {
            let decoy = Pose2::new(measured.x + config.decoy_offset, measured.y, measured.theta);
            if rng.gen_bool(0.5) {
                vec![measured, decoy]
            } else {
                vec![decoy, measured]
            }
        } else {
            vec![measured]
        };
        let key = i as u64 + 1;
        records.push(Record::Edge(Edge {
            from: key - 1,
            to: key,
            measurements,
        }));

        // --- GPS ---
        if config.gps_interval.is_some_and(|n| n > 0 && (i + 1) % n == 0) {
            records.push(Record::Gps {
                key,
                position: Vector2::new(next.x + gps_noise.sample(&mut rng), next.y + gps_noise.sample(&mut rng)),
            });
        }

        // --- Loop closure back to an older pose ---
        if i >= 2 && rng.gen_bool(config.loop_probability) {
            let target = rng.gen_range(0..i);
            let measured = if rng.gen_bool(config.outlier_probability) {
                Pose2::new(
                    rng.gen_range(-20.0..20.0),
                    rng.gen_range(-20.0..20.0),
                    rng.gen_range(-3.0..3.0),
                )
            } else {
                let rel = next.between(&truth[target]);
                Pose2::new(
                    rel.x + nx.sample(&mut rng),
                    rel.y + ny.sample(&mut rng),
                    rel.theta + nt.sample(&mut rng),
                )
            };
            records.push(Record::Edge(Edge {
                from: key,
                to: target as u64,
                measurements: vec![measured],
            }));
        }
    }

    Ok(SyntheticDataset {
        records,
        ground_truth: truth,
    })
}
