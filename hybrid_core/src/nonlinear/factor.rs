// hybrid_core/src/nonlinear/factor.rs

use super::pose2::{rotation, wrap_angle, Pose2};
use super::values::Values;
use crate::error::FactorError;
use crate::linear::{DiagonalNoise, JacobianFactor};
use crate::types::Key;
use dyn_clone::DynClone;
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};
use std::fmt::Debug;

/// Residual and one Jacobian per key, both unwhitened.
pub type Evaluation = (DVector<f64>, Vec<DMatrix<f64>>);

// --- NONLINEAR FACTOR TRAIT ---
// A measurement model `e(x) = h(x) ⊖ z` with Gaussian noise on `e`.
pub trait NonlinearFactor: DynClone + Debug + Send + Sync {
    /// The variables this factor constrains, in Jacobian order.
    fn keys(&self) -> &[Key];

    fn noise_model(&self) -> &DiagonalNoise;

    /// Residual at `values` and its derivative with respect to a body-frame
    /// increment of every key.
    fn evaluate(&self, values: &Values) -> Result<Evaluation, FactorError>;

    /// First-order expansion `½‖W(e + H δ)‖²` as a whitened Jacobian factor.
    fn linearize(&self, values: &Values) -> Result<JacobianFactor, FactorError> {
        let (residual, jacobians) = self.evaluate(values)?;
        if jacobians.len() != self.keys().len() {
            return Err(FactorError::WrongArity {
                expected: self.keys().len(),
                actual: jacobians.len(),
            });
        }
        let noise = self.noise_model();
        let terms = self
            .keys()
            .iter()
            .copied()
            .zip(jacobians.iter().map(|h| noise.whiten_matrix(h)))
            .collect();
        Ok(JacobianFactor::new(terms, -noise.whiten(&residual)))
    }

    /// `½‖W e‖²`.
    fn error(&self, values: &Values) -> Result<f64, FactorError> {
        let (residual, _) = self.evaluate(values)?;
        Ok(0.5 * self.noise_model().whiten(&residual).norm_squared())
    }
}

// This macro implements `Clone` for `Box<dyn NonlinearFactor>`.
dyn_clone::clone_trait_object!(NonlinearFactor);

fn block(m: &Matrix2<f64>, rows: std::ops::Range<usize>, out: &mut DMatrix<f64>, col: usize) {
    for (i, r) in rows.enumerate() {
        out[(r, col)] = m[(i, 0)];
        out[(r, col + 1)] = m[(i, 1)];
    }
}

/// Anchors one pose to a known value.
#[derive(Debug, Clone)]
pub struct PriorFactorPose2 {
    keys: [Key; 1],
    prior: Pose2,
    noise: DiagonalNoise,
}

impl PriorFactorPose2 {
    pub fn new(key: Key, prior: Pose2, noise: DiagonalNoise) -> Self {
        assert_eq!(noise.dim(), 3, "a Pose2 prior needs a 3-dimensional noise model");
        Self {
            keys: [key],
            prior,
            noise,
        }
    }
}

impl NonlinearFactor for PriorFactorPose2 {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn noise_model(&self) -> &DiagonalNoise {
        &self.noise
    }

    fn evaluate(&self, values: &Values) -> Result<Evaluation, FactorError> {
        let pose = values.at(self.keys[0])?;
        let local = self.prior.between(pose);
        let residual = DVector::from_vec(vec![local.x, local.y, local.theta]);

        // d(R0ᵀ(t + R δ − t0))/dδ = R(θ − θ0); the angle error moves one-to-one.
        let mut h = DMatrix::zeros(3, 3);
        block(&rotation(pose.theta - self.prior.theta), 0..2, &mut h, 0);
        h[(2, 2)] = 1.0;
        Ok((residual, vec![h]))
    }
}

/// A relative-pose measurement between two poses.
#[derive(Debug, Clone)]
pub struct BetweenFactorPose2 {
    keys: [Key; 2],
    measured: Pose2,
    noise: DiagonalNoise,
}

impl BetweenFactorPose2 {
    pub fn new(from: Key, to: Key, measured: Pose2, noise: DiagonalNoise) -> Self {
        assert_eq!(noise.dim(), 3, "a Pose2 between factor needs a 3-dimensional noise model");
        Self {
            keys: [from, to],
            measured,
            noise,
        }
    }

    pub fn measured(&self) -> &Pose2 {
        &self.measured
    }
}

impl NonlinearFactor for BetweenFactorPose2 {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn noise_model(&self) -> &DiagonalNoise {
        &self.noise
    }

    fn evaluate(&self, values: &Values) -> Result<Evaluation, FactorError> {
        let p1 = values.at(self.keys[0])?;
        let p2 = values.at(self.keys[1])?;
        let rz_t = self.measured.rotation().transpose();

        let t12 = p1.rotation().transpose() * (p2.translation() - p1.translation());
        let et = rz_t * (t12 - self.measured.translation());
        let etheta = wrap_angle(p2.theta - p1.theta - self.measured.theta);
        let residual = DVector::from_vec(vec![et.x, et.y, etheta]);

        // Translation rows: d t12 / d δt1 = −I, d t12 / dω1 = [t12.y, −t12.x],
        // d t12 / d δt2 = R(θ2 − θ1); then rotated into the measurement frame.
        let mut h1 = DMatrix::zeros(3, 3);
        block(&(-rz_t), 0..2, &mut h1, 0);
        let dw = rz_t * Vector2::new(t12.y, -t12.x);
        h1[(0, 2)] = dw.x;
        h1[(1, 2)] = dw.y;
        h1[(2, 2)] = -1.0;

        let mut h2 = DMatrix::zeros(3, 3);
        block(&(rz_t * rotation(p2.theta - p1.theta)), 0..2, &mut h2, 0);
        h2[(2, 2)] = 1.0;
        Ok((residual, vec![h1, h2]))
    }
}
