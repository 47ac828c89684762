// hybrid_sim/src/experiment.rs

//! Replays a pose-graph dataset through the incremental hybrid smoother.
//!
//! Ambiguous odometry becomes a hybrid factor over one discrete mode per
//! edge, every loop closure becomes a hybrid factor choosing between a loose
//! "outlier" model and the regular pose model. All factors are linearized at
//! the initial guess composed from the first odometry candidate.

use crate::config::ExperimentConfig;
use crate::dataset::{Edge, Record};
use crate::error::SimError;
use hybrid_core::error::FactorError;
use hybrid_core::linear::DiagonalNoise;
use hybrid_core::nonlinear::{
    BetweenFactorPose2, GpsFactor, HybridNonlinearFactor, HybridNonlinearFactorGraph, NonlinearFactor, Pose2,
    PriorFactorPose2, Values,
};
use hybrid_core::smoother::HybridSmoother;
use hybrid_core::types::{l, m, x, DiscreteKey, HybridEstimate};
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    /// Initial guess moved by the final continuous estimate.
    pub result: Values,
    pub estimate: HybridEstimate,
    /// Highest pose index seen.
    pub last_pose: u64,
    /// `−log` posterior of the final estimate.
    pub final_error: Option<f64>,
    /// Dataset index at which each smoother update ran, and how long it took.
    pub update_times: Vec<(usize, Duration)>,
    /// Time since the start of the loop after every odometry edge.
    pub odometry_times: Vec<Duration>,
    /// Dataset records consumed.
    pub processed: usize,
}

pub struct Experiment {
    config: ExperimentConfig,
    smoother: HybridSmoother,
    new_factors: HybridNonlinearFactorGraph,
    initial: Values,
    pose_noise: DiagonalNoise,
    open_loop_noise: DiagonalNoise,
    gps_noise: DiagonalNoise,
    /// Latest initial guess moved by a smoother estimate.
    latest: Values,
    discrete_count: u64,
    loop_count: u64,
    last_pose: u64,
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self {
            smoother: HybridSmoother::with_params(config.smoother),
            new_factors: HybridNonlinearFactorGraph::new(),
            initial: Values::new(),
            latest: Values::new(),
            pose_noise: config.noise.pose(),
            open_loop_noise: config.noise.open_loop(),
            gps_noise: config.noise.gps(),
            discrete_count: 0,
            loop_count: 0,
            last_pose: 0,
            config,
        })
    }

    pub fn smoother(&self) -> &HybridSmoother {
        &self.smoother
    }

    pub fn initial(&self) -> &Values {
        &self.initial
    }

    /// Runs the whole experiment over `records`, stopping early after
    /// `max_loop_count` of them.
    pub fn run<I>(&mut self, records: I) -> Result<ExperimentReport, SimError>
    where
        I: IntoIterator<Item = Result<Record, SimError>>,
    {
        // 1. Anchor the first pose and fold it in on its own.
        let origin = Pose2::identity();
        self.initial.insert(x(0), origin);
        self.new_factors
            .add(PriorFactorPose2::new(x(0), origin, self.config.noise.prior()));
        let mut update_times = vec![(0, self.smoother_update()?)];

        // 2. Stream the dataset, updating every `update_frequency` hybrid factors.
        let mut odometry_times = Vec::new();
        self.latest = self.initial.clone();
        let mut hybrid_factors = 0;
        let mut update_count = 0;
        let mut index = 0;
        let start = Instant::now();
        for record in records {
            if index >= self.config.max_loop_count {
                break;
            }
            let record = record?;
            match &record {
                Record::Edge(edge) if edge.is_odometry() => {
                    hybrid_factors += self.add_odometry(edge)?;
                }
                Record::Edge(edge) => {
                    self.add_loop_closure(edge)?;
                    hybrid_factors += 1;
                }
                Record::Gps { key, position } => {
                    if !self.initial.contains(x(*key)) {
                        return Err(FactorError::MissingValue(x(*key)).into());
                    }
                    self.new_factors
                        .add(GpsFactor::new(x(*key), *position, self.gps_noise.clone()));
                }
            }

            if hybrid_factors >= self.config.update_frequency {
                debug!(factors = self.new_factors.len(), "smoother update");
                update_times.push((index, self.smoother_update()?));
                hybrid_factors = 0;
                update_count += 1;

                if update_count % self.config.relinearization_frequency == 0 {
                    let delta = self.smoother.optimize()?;
                    self.latest = self.initial.retract(&delta.continuous);
                }
            }

            if let Record::Edge(edge) = &record {
                if edge.is_odometry() {
                    odometry_times.push(start.elapsed());
                }
            }
            if index % 100 == 0 {
                info!(index, elapsed_s = start.elapsed().as_secs_f64(), "progress");
            }
            index += 1;
        }

        // 3. Final update and joint estimate.
        update_times.push((index, self.smoother_update()?));
        let estimate = self.smoother.optimize()?;
        self.latest = self.initial.retract(&estimate.continuous);
        let final_error = self.smoother.error(&estimate);
        info!(
            final_error = final_error.unwrap_or(f64::NAN),
            elapsed_s = start.elapsed().as_secs_f64(),
            poses = self.last_pose + 1,
            modes = self.discrete_count,
            loop_closures = self.loop_count,
            "experiment finished"
        );

        Ok(ExperimentReport {
            result: self.latest.clone(),
            estimate,
            last_pose: self.last_pose,
            final_error,
            update_times,
            odometry_times,
            processed: index,
        })
    }

    // --- Private Helper Methods ---

    /// Returns the number of hybrid factors added.
    fn add_odometry(&mut self, edge: &Edge) -> Result<usize, SimError> {
        let (from, to) = (x(edge.from), x(edge.to));
        let added = if edge.measurements.len() > 1 {
            let mode = DiscreteKey::new(m(self.discrete_count), edge.measurements.len());
            let factor = self.hybrid_odometry_factor(mode, edge)?;
            self.new_factors.push(factor);
            self.discrete_count += 1;
            debug!(from = edge.from, to = edge.to, "hybrid odometry");
            1
        } else {
            self.new_factors
                .add(BetweenFactorPose2::new(from, to, edge.measurements[0], self.pose_noise.clone()));
            0
        };

        // The first candidate seeds the initial guess of the next pose.
        let guess = self.initial.at(from)?.compose(&edge.measurements[0]);
        if self.initial.contains(to) {
            warn!(pose = edge.to, "pose already has an initial guess, keeping it");
        } else {
            self.initial.insert(to, guess);
        }
        self.last_pose = self.last_pose.max(edge.to);
        Ok(added)
    }

    fn add_loop_closure(&mut self, edge: &Edge) -> Result<(), SimError> {
        for key in [edge.from, edge.to] {
            if !self.initial.contains(x(key)) {
                return Err(FactorError::MissingValue(x(key)).into());
            }
        }
        let switch = DiscreteKey::new(l(self.loop_count), 2);
        let factor = self.hybrid_loop_closure_factor(switch, edge)?;
        self.new_factors.push(factor);
        self.loop_count += 1;
        debug!(from = edge.from, to = edge.to, "loop closure");
        Ok(())
    }

    /// One pose-noise between factor per candidate measurement.
    fn hybrid_odometry_factor(&self, mode: DiscreteKey, edge: &Edge) -> Result<HybridNonlinearFactor, FactorError> {
        let factors = edge
            .measurements
            .iter()
            .map(|z| {
                Box::new(BetweenFactorPose2::new(x(edge.from), x(edge.to), *z, self.pose_noise.clone()))
                    as Box<dyn NonlinearFactor>
            })
            .collect();
        HybridNonlinearFactor::with_noise_constants(vec![mode], factors)
    }

    /// Mode 0 treats the closure as an outlier, mode 1 trusts it.
    fn hybrid_loop_closure_factor(&self, switch: DiscreteKey, edge: &Edge) -> Result<HybridNonlinearFactor, FactorError> {
        let z = edge.measurements[0];
        let (from, to) = (x(edge.from), x(edge.to));
        let factors: Vec<Box<dyn NonlinearFactor>> = vec![
            Box::new(BetweenFactorPose2::new(from, to, z, self.open_loop_noise.clone())),
            Box::new(BetweenFactorPose2::new(from, to, z, self.pose_noise.clone())),
        ];
        HybridNonlinearFactor::with_noise_constants(vec![switch], factors)
    }

    fn smoother_update(&mut self) -> Result<Duration, SimError> {
        let before = Instant::now();
        let linearized = self.new_factors.linearize(&self.initial)?;
        self.smoother
            .update(&linearized, Some(self.config.max_nr_hypotheses), None)?;
        self.new_factors.clear();
        Ok(before.elapsed())
    }
}

// --- Output ---

/// Writes `x y θ` for poses `0..=last_pose`.
pub fn write_poses(mut out: impl Write, values: &Values, last_pose: u64) -> Result<(), SimError> {
    for i in 0..=last_pose {
        let pose = values.at(x(i))?;
        writeln!(out, "{} {} {}", pose.x, pose.y, pose.theta)?;
    }
    Ok(())
}

/// Writes one duration in seconds per line.
pub fn write_times(mut out: impl Write, times: &[Duration]) -> Result<(), SimError> {
    for t in times {
        writeln!(out, "{}", t.as_secs_f64())?;
    }
    Ok(())
}

/// Writes `index seconds` per smoother update.
pub fn write_update_times(mut out: impl Write, times: &[(usize, Duration)]) -> Result<(), SimError> {
    for (index, t) in times {
        writeln!(out, "{index} {}", t.as_secs_f64())?;
    }
    Ok(())
}
