// hybrid_core/src/hybrid/conditional.rs

use super::factor::{HybridFactor, HybridGaussianFactor};
use crate::discrete::{Branches, DiscreteConditional};
use crate::error::SmootherError;
use crate::linear::GaussianConditional;
use crate::types::{DiscreteKey, DiscreteValues, HybridEstimate, Key};
use std::collections::BTreeSet;

/// `p(x | continuous parents, discrete parents)`: one Gaussian conditional per
/// discrete assignment. Every present branch shares the same frontal and
/// continuous parents; a missing branch was pruned.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridGaussianConditional {
    frontal: Key,
    parents: Vec<Key>,
    branches: Branches<GaussianConditional>,
}

impl HybridGaussianConditional {
    pub fn new(frontal: Key, parents: Vec<Key>, branches: Branches<GaussianConditional>) -> Self {
        for branch in branches.values() {
            assert_eq!(branch.frontal(), frontal, "branch frontal disagrees with mixture");
        }
        Self {
            frontal,
            parents,
            branches,
        }
    }

    pub fn frontal(&self) -> Key {
        self.frontal
    }

    pub fn continuous_parents(&self) -> &[Key] {
        &self.parents
    }

    pub fn discrete_keys(&self) -> &[DiscreteKey] {
        self.branches.keys()
    }

    pub fn branches(&self) -> &Branches<GaussianConditional> {
        &self.branches
    }

    /// The branch for `values`; `Err(key)` names an unassigned discrete parent.
    pub fn select(&self, values: &DiscreteValues) -> Result<Option<&GaussianConditional>, Key> {
        self.branches.select(values)
    }

    /// Keeps only the branches whose projection onto `onto` is in `allowed`.
    pub fn retain_projections(&mut self, onto: &[Key], allowed: &BTreeSet<Vec<usize>>) {
        let positions: Vec<usize> = onto
            .iter()
            .filter_map(|key| self.branches.keys().iter().position(|k| k.key == *key))
            .collect();
        self.branches.retain(|a, _| {
            let projected: Vec<usize> = positions.iter().map(|&p| a[p]).collect();
            allowed.contains(&projected)
        });
    }

    /// A mixture factor whose scalars are the branch normalization constants,
    /// so that reopening keeps the relative weight of each hypothesis.
    pub fn to_factor(&self) -> HybridGaussianFactor {
        HybridGaussianFactor::from_branches(
            self.branches
                .clone()
                .map(|_, c| Some((c.to_factor(), c.neg_log_constant()))),
        )
    }
}

/// A conditional of any kind, as stored in the belief store.
#[derive(Debug, Clone, PartialEq)]
pub enum HybridConditional {
    Continuous(GaussianConditional),
    Discrete(DiscreteConditional),
    Mixture(HybridGaussianConditional),
}

impl HybridConditional {
    pub fn frontals(&self) -> Vec<Key> {
        match self {
            HybridConditional::Continuous(c) => vec![c.frontal()],
            HybridConditional::Discrete(c) => c.frontals().to_vec(),
            HybridConditional::Mixture(c) => vec![c.frontal()],
        }
    }

    /// Continuous parents first, then discrete parents.
    pub fn parents(&self) -> Vec<Key> {
        match self {
            HybridConditional::Continuous(c) => c.parents().to_vec(),
            HybridConditional::Discrete(c) => c.parents(),
            HybridConditional::Mixture(c) => {
                let mut parents = c.continuous_parents().to_vec();
                parents.extend(c.discrete_keys().iter().map(|k| k.key));
                parents
            }
        }
    }

    pub fn discrete_keys(&self) -> Vec<DiscreteKey> {
        match self {
            HybridConditional::Continuous(_) => Vec::new(),
            HybridConditional::Discrete(c) => c.discrete_keys().to_vec(),
            HybridConditional::Mixture(c) => c.discrete_keys().to_vec(),
        }
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self, HybridConditional::Discrete(_))
    }

    /// Turns the conditional back into a factor for re-elimination.
    pub fn into_factor(self) -> HybridFactor {
        match self {
            HybridConditional::Continuous(c) => HybridFactor::Continuous(c.to_factor()),
            HybridConditional::Discrete(c) => HybridFactor::Discrete(c.into_table()),
            HybridConditional::Mixture(c) => HybridFactor::Mixture(c.to_factor()),
        }
    }

    /// Slices the conditional at fixed discrete values. A discrete conditional
    /// whose frontals are all fixed disappears (`None`); a mixture left without
    /// discrete parents becomes a plain Gaussian conditional.
    pub fn restrict(self, fixed: &DiscreteValues) -> Result<Option<HybridConditional>, SmootherError> {
        if fixed.is_empty() {
            return Ok(Some(self));
        }
        match self {
            HybridConditional::Continuous(_) => Ok(Some(self)),
            HybridConditional::Discrete(c) => {
                let restricted = c.restrict(fixed);
                Ok((!restricted.frontals().is_empty()).then_some(HybridConditional::Discrete(restricted)))
            }
            HybridConditional::Mixture(c) => {
                let frontal = c.frontal;
                let branches = c.branches.restrict(fixed);
                if branches.is_empty() {
                    return Err(SmootherError::AbsentBranch { key: frontal });
                }
                if branches.keys().is_empty() {
                    let only = branches
                        .into_entries()
                        .next()
                        .map(|(_, g)| g)
                        .ok_or(SmootherError::AbsentBranch { key: frontal })?;
                    Ok(Some(HybridConditional::Continuous(only)))
                } else {
                    Ok(Some(HybridConditional::Mixture(HybridGaussianConditional {
                        frontal,
                        parents: c.parents,
                        branches,
                    })))
                }
            }
        }
    }

    /// `−log p(frontals | parents)` at an estimate; `None` if a needed value
    /// is missing. A pruned branch has probability zero.
    pub fn neg_log_probability(&self, estimate: &HybridEstimate) -> Option<f64> {
        match self {
            HybridConditional::Continuous(c) => c.neg_log_probability(&estimate.continuous),
            HybridConditional::Discrete(c) => c.probability(&estimate.discrete).ok().map(|p| -p.ln()),
            HybridConditional::Mixture(c) => match c.select(&estimate.discrete).ok()? {
                Some(g) => g.neg_log_probability(&estimate.continuous),
                None => Some(f64::INFINITY),
            },
        }
    }
}
