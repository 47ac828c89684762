// hybrid_core/src/linear/bayes_net.rs

use super::conditional::{GaussianConditional, SolveFailure};
use crate::error::{EliminationError, SmootherError};
use crate::types::VectorValues;

/// A purely continuous Bayes network in elimination order (children first).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaussianBayesNet {
    conditionals: Vec<GaussianConditional>,
}

impl GaussianBayesNet {
    pub fn new(conditionals: Vec<GaussianConditional>) -> Self {
        Self { conditionals }
    }

    pub fn push(&mut self, conditional: GaussianConditional) {
        self.conditionals.push(conditional);
    }

    pub fn len(&self) -> usize {
        self.conditionals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditionals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GaussianConditional> {
        self.conditionals.iter()
    }

    /// Back-substitution from the roots (last) to the leaves (first).
    pub fn optimize(&self) -> Result<VectorValues, SmootherError> {
        let mut solution = VectorValues::new();
        for conditional in self.conditionals.iter().rev() {
            let value = conditional.solve(&solution).map_err(|failure| match failure {
                SolveFailure::MissingParent(parent) => SmootherError::Invariant(format!(
                    "parent {} of {} is solved after its child",
                    parent,
                    conditional.frontal()
                )),
                SolveFailure::Singular => {
                    SmootherError::Elimination(EliminationError::Indeterminant(conditional.frontal()))
                }
            })?;
            solution.insert(conditional.frontal(), value);
        }
        Ok(solution)
    }

    /// Sum of `−log p` over all conditionals.
    pub fn neg_log_probability(&self, values: &VectorValues) -> Option<f64> {
        self.conditionals
            .iter()
            .map(|c| c.neg_log_probability(values))
            .sum()
    }
}
