// hybrid_core/src/nonlinear/pose2.rs

use nalgebra::{Matrix2, Vector2, Vector3};
use std::f64::consts::PI;
use std::fmt;

/// Wraps an angle into `(−π, π]`.
pub fn wrap_angle(theta: f64) -> f64 {
    if theta > -PI && theta <= PI {
        return theta;
    }
    let wrapped = (theta + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// 2x2 rotation by `theta`.
pub fn rotation(theta: f64) -> Matrix2<f64> {
    let (s, c) = theta.sin_cos();
    Matrix2::new(c, -s, s, c)
}

/// A planar rigid-body pose.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose2 {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose2 {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self {
            x,
            y,
            theta: wrap_angle(theta),
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn translation(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn rotation(&self) -> Matrix2<f64> {
        rotation(self.theta)
    }

    /// `self * other`: `other` expressed in this pose's frame.
    pub fn compose(&self, other: &Pose2) -> Pose2 {
        let t = self.translation() + self.rotation() * other.translation();
        Pose2::new(t.x, t.y, self.theta + other.theta)
    }

    pub fn inverse(&self) -> Pose2 {
        let t = -(self.rotation().transpose() * self.translation());
        Pose2::new(t.x, t.y, -self.theta)
    }

    /// `self⁻¹ * other`.
    pub fn between(&self, other: &Pose2) -> Pose2 {
        let t = self.rotation().transpose() * (other.translation() - self.translation());
        Pose2::new(t.x, t.y, other.theta - self.theta)
    }

    /// Applies a tangent increment `[dx, dy, dθ]` in the body frame.
    pub fn retract(&self, delta: &Vector3<f64>) -> Pose2 {
        let t = self.translation() + self.rotation() * Vector2::new(delta.x, delta.y);
        Pose2::new(t.x, t.y, self.theta + delta.z)
    }

    pub fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.theta)
    }
}

impl fmt::Display for Pose2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.theta)
    }
}
