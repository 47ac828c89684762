// hybrid_core/src/nonlinear/gps.rs

use super::factor::{Evaluation, NonlinearFactor};
use super::values::Values;
use crate::error::FactorError;
use crate::linear::DiagonalNoise;
use crate::types::Key;
use nalgebra::{DMatrix, DVector, Vector2};

/// Planar position fix, optionally taken at a lever arm offset from the body
/// origin: `e = t + R b − m`.
#[derive(Debug, Clone)] // Cloneable for dyn-clone
pub struct GpsFactor {
    keys: [Key; 1],
    measured: Vector2<f64>,
    lever_arm: Vector2<f64>,
    noise: DiagonalNoise,
}

impl GpsFactor {
    pub fn new(key: Key, measured: Vector2<f64>, noise: DiagonalNoise) -> Self {
        Self::with_lever_arm(key, measured, Vector2::zeros(), noise)
    }

    pub fn with_lever_arm(key: Key, measured: Vector2<f64>, lever_arm: Vector2<f64>, noise: DiagonalNoise) -> Self {
        assert_eq!(noise.dim(), 2, "a planar GPS fix needs a 2-dimensional noise model");
        Self {
            keys: [key],
            measured,
            lever_arm,
            noise,
        }
    }

    pub fn measured(&self) -> &Vector2<f64> {
        &self.measured
    }
}

impl NonlinearFactor for GpsFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn noise_model(&self) -> &DiagonalNoise {
        &self.noise
    }

    fn evaluate(&self, values: &Values) -> Result<Evaluation, FactorError> {
        let pose = values.at(self.keys[0])?;
        let r = pose.rotation();
        let b = self.lever_arm;
        let e = pose.translation() + r * b - self.measured;

        // d/dδt = R, d/dω = R [−b.y, b.x]ᵀ
        let dw = r * Vector2::new(-b.y, b.x);
        let h = DMatrix::from_row_slice(2, 3, &[r[(0, 0)], r[(0, 1)], dw.x, r[(1, 0)], r[(1, 1)], dw.y]);
        Ok((DVector::from_vec(vec![e.x, e.y]), vec![h]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonlinear::factor::tests::numerical_jacobians;
    use crate::nonlinear::Pose2;
    use crate::types::x;
    use approx::assert_abs_diff_eq;

    fn at(pose: Pose2) -> Values {
        let mut values = Values::new();
        values.insert(x(4), pose);
        values
    }

    #[test]
    fn residual_is_position_minus_fix() {
        let f = GpsFactor::new(x(4), Vector2::new(1.0, 2.0), DiagonalNoise::isotropic(2, 1.0));
        let (e, _) = f.evaluate(&at(Pose2::new(1.5, 1.0, 0.7))).unwrap();
        assert_abs_diff_eq!(e[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(e[1], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn lever_arm_rotates_with_the_body() {
        let f = GpsFactor::with_lever_arm(
            x(4),
            Vector2::zeros(),
            Vector2::new(1.0, 0.0),
            DiagonalNoise::isotropic(2, 1.0),
        );
        let (e, _) = f
            .evaluate(&at(Pose2::new(0.0, 0.0, std::f64::consts::FRAC_PI_2)))
            .unwrap();
        assert_abs_diff_eq!(e[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let f = GpsFactor::with_lever_arm(
            x(4),
            Vector2::new(3.0, -1.0),
            Vector2::new(0.4, -0.3),
            DiagonalNoise::isotropic(2, 0.2),
        );
        let values = at(Pose2::new(2.0, -0.5, -1.2));
        let (_, analytic) = f.evaluate(&values).unwrap();
        let numeric = numerical_jacobians(&f, &values);
        for (a, n) in analytic[0].iter().zip(numeric[0].iter()) {
            assert_abs_diff_eq!(*a, *n, epsilon = 1e-6);
        }
    }

    #[test]
    fn missing_pose_is_an_error() {
        let f = GpsFactor::new(x(9), Vector2::zeros(), DiagonalNoise::isotropic(2, 1.0));
        assert_eq!(f.error(&Values::new()).unwrap_err(), FactorError::MissingValue(x(9)));
    }
}
