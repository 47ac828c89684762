// hybrid_core/src/linear/noise.rs

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A diagonal Gaussian noise model described by per-component sigmas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagonalNoise {
    sigmas: Vec<f64>,
}

impl DiagonalNoise {
    pub fn from_sigmas(sigmas: Vec<f64>) -> Self {
        assert!(
            sigmas.iter().all(|s| *s > 0.0),
            "noise sigmas must be strictly positive"
        );
        Self { sigmas }
    }

    pub fn isotropic(dim: usize, sigma: f64) -> Self {
        Self::from_sigmas(vec![sigma; dim])
    }

    pub fn dim(&self) -> usize {
        self.sigmas.len()
    }

    pub fn sigmas(&self) -> &[f64] {
        &self.sigmas
    }

    pub fn whiten(&self, v: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(v.len(), v.iter().zip(&self.sigmas).map(|(x, s)| x / s))
    }

    /// Divides row `i` of `h` by `sigmas[i]`.
    pub fn whiten_matrix(&self, h: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = h.clone();
        for (i, s) in self.sigmas.iter().enumerate() {
            out.row_mut(i).scale_mut(1.0 / s);
        }
        out
    }

    /// `−log` of the Gaussian normalization constant: `½ n ln 2π + Σ ln σᵢ`.
    pub fn neg_log_constant(&self) -> f64 {
        0.5 * self.dim() as f64 * (2.0 * PI).ln() + self.sigmas.iter().map(|s| s.ln()).sum::<f64>()
    }
}
