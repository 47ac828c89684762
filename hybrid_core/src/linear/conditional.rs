// hybrid_core/src/linear/conditional.rs

use super::jacobian::JacobianFactor;
use crate::types::{Key, VectorValues};
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

/// Why a conditional could not be solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveFailure {
    /// A parent has no value yet.
    MissingParent(Key),
    /// `R` is singular.
    Singular,
}

/// `p(x | parents) ∝ exp(−½‖R x + Σₚ Sₚ xₚ − d‖²)` with `R` upper triangular.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianConditional {
    frontal: Key,
    r: DMatrix<f64>,
    parents: Vec<Key>,
    s: Vec<DMatrix<f64>>,
    d: DVector<f64>,
}

impl GaussianConditional {
    pub fn new(frontal: Key, r: DMatrix<f64>, parents: Vec<(Key, DMatrix<f64>)>, d: DVector<f64>) -> Self {
        assert!(r.is_square(), "R must be square for {frontal}");
        assert_eq!(r.nrows(), d.len(), "R and d disagree for {frontal}");
        let (parents, s): (Vec<Key>, Vec<DMatrix<f64>>) = parents.into_iter().unzip();
        for block in &s {
            assert_eq!(block.nrows(), d.len(), "parent block rows disagree for {frontal}");
        }
        Self {
            frontal,
            r,
            parents,
            s,
            d,
        }
    }

    pub fn frontal(&self) -> Key {
        self.frontal
    }

    pub fn parents(&self) -> &[Key] {
        &self.parents
    }

    pub fn dim(&self) -> usize {
        self.d.len()
    }

    pub fn r(&self) -> &DMatrix<f64> {
        &self.r
    }

    pub fn s(&self) -> &[DMatrix<f64>] {
        &self.s
    }

    pub fn d(&self) -> &DVector<f64> {
        &self.d
    }

    /// Back-substitutes `x = R⁻¹ (d − Σ Sₚ xₚ)` given solved parents.
    pub fn solve(&self, solved: &VectorValues) -> Result<DVector<f64>, SolveFailure> {
        let mut rhs = self.d.clone();
        for (parent, block) in self.parents.iter().zip(&self.s) {
            let value = solved
                .get(parent)
                .ok_or(SolveFailure::MissingParent(*parent))?;
            rhs -= block * value;
        }
        self.r
            .solve_upper_triangular(&rhs)
            .ok_or(SolveFailure::Singular)
    }

    /// `½‖R x + Σ Sₚ xₚ − d‖²`, or `None` if a variable is missing.
    pub fn error(&self, values: &VectorValues) -> Option<f64> {
        let mut r = &self.r * values.get(&self.frontal)? - &self.d;
        for (parent, block) in self.parents.iter().zip(&self.s) {
            r += block * values.get(parent)?;
        }
        Some(0.5 * r.norm_squared())
    }

    /// `−log` of the normalization constant: `½ n ln 2π − ln|det R|`.
    pub fn neg_log_constant(&self) -> f64 {
        let log_det: f64 = self.r.diagonal().iter().map(|v| v.abs().ln()).sum();
        0.5 * self.dim() as f64 * (2.0 * PI).ln() - log_det
    }

    /// `−log p(x | parents)`.
    pub fn neg_log_probability(&self, values: &VectorValues) -> Option<f64> {
        self.error(values).map(|e| e + self.neg_log_constant())
    }

    /// Reinterprets the conditional as a factor (dropping its constant).
    pub fn to_factor(&self) -> JacobianFactor {
        let mut terms = Vec::with_capacity(1 + self.parents.len());
        terms.push((self.frontal, self.r.clone()));
        terms.extend(self.parents.iter().copied().zip(self.s.iter().cloned()));
        JacobianFactor::new(terms, self.d.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::x;
    use approx::assert_abs_diff_eq;

    fn chain() -> GaussianConditional {
        // 2 x0 - 2 x1 = 2  =>  x0 = x1 + 1
        GaussianConditional::new(
            x(0),
            DMatrix::from_element(1, 1, 2.0),
            vec![(x(1), DMatrix::from_element(1, 1, -2.0))],
            DVector::from_element(1, 2.0),
        )
    }

    #[test]
    fn solve_uses_parent_values() {
        let mut solved = VectorValues::new();
        solved.insert(x(1), DVector::from_element(1, 4.0));
        let x0 = chain().solve(&solved).unwrap();
        assert_abs_diff_eq!(x0[0], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn solve_reports_missing_parent() {
        let err = chain().solve(&VectorValues::new()).unwrap_err();
        assert_eq!(err, SolveFailure::MissingParent(x(1)));
    }

    #[test]
    fn neg_log_constant_matches_gaussian_density() {
        // R = 1/sigma, so the density is N(x; mu, sigma^2).
        let sigma: f64 = 0.5;
        let c = GaussianConditional::new(
            x(0),
            DMatrix::from_element(1, 1, 1.0 / sigma),
            vec![],
            DVector::from_element(1, 0.0),
        );
        let expected = 0.5 * (2.0 * PI).ln() + sigma.ln();
        assert_abs_diff_eq!(c.neg_log_constant(), expected, epsilon = 1e-12);
    }

    #[test]
    fn factor_view_has_same_error() {
        let c = chain();
        let mut values = VectorValues::new();
        values.insert(x(0), DVector::from_element(1, 3.0));
        values.insert(x(1), DVector::from_element(1, 1.5));
        assert_abs_diff_eq!(
            c.error(&values).unwrap(),
            c.to_factor().error(&values).unwrap(),
            epsilon = 1e-12
        );
    }
}
