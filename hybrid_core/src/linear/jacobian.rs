// hybrid_core/src/linear/jacobian.rs

use crate::types::{Key, VectorValues};
use nalgebra::{DMatrix, DVector};

/// A whitened linear Gaussian factor `½‖Σₖ Aₖ xₖ − b‖²`.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianFactor {
    keys: Vec<Key>,
    blocks: Vec<DMatrix<f64>>,
    rhs: DVector<f64>,
}

impl JacobianFactor {
    /// Creates a factor from `(key, Aₖ)` terms and the right-hand side `b`.
    /// Every block must have as many rows as `b`, and keys must be distinct.
    pub fn new(terms: Vec<(Key, DMatrix<f64>)>, rhs: DVector<f64>) -> Self {
        let mut keys = Vec::with_capacity(terms.len());
        let mut blocks = Vec::with_capacity(terms.len());
        for (key, block) in terms {
            assert_eq!(block.nrows(), rhs.len(), "block rows must match rhs for {key}");
            assert!(!keys.contains(&key), "duplicate key {key} in JacobianFactor");
            keys.push(key);
            blocks.push(block);
        }
        Self { keys, blocks, rhs }
    }

    /// A unary factor `‖(x − mean) / sigma‖²` on one variable.
    pub fn prior(key: Key, mean: DVector<f64>, sigma: f64) -> Self {
        let n = mean.len();
        Self::new(
            vec![(key, DMatrix::identity(n, n) / sigma)],
            mean / sigma,
        )
    }

    /// A binary factor `‖(x₂ − x₁ − delta) / sigma‖²`.
    pub fn between(from: Key, to: Key, delta: DVector<f64>, sigma: f64) -> Self {
        let n = delta.len();
        let eye = DMatrix::<f64>::identity(n, n) / sigma;
        Self::new(vec![(from, -eye.clone()), (to, eye)], delta / sigma)
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn terms(&self) -> impl Iterator<Item = (Key, &DMatrix<f64>)> {
        self.keys.iter().copied().zip(self.blocks.iter())
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    pub fn rows(&self) -> usize {
        self.rhs.len()
    }

    pub fn block(&self, key: Key) -> Option<&DMatrix<f64>> {
        self.keys
            .iter()
            .position(|k| *k == key)
            .map(|i| &self.blocks[i])
    }

    /// `Σ Aₖ xₖ − b`, or `None` if a variable is missing from `values`.
    pub fn residual(&self, values: &VectorValues) -> Option<DVector<f64>> {
        let mut r = -self.rhs.clone();
        for (key, block) in self.terms() {
            r += block * values.get(&key)?;
        }
        Some(r)
    }

    pub fn error(&self, values: &VectorValues) -> Option<f64> {
        self.residual(values).map(|r| 0.5 * r.norm_squared())
    }
}
