// hybrid_core/src/hybrid/graph.rs

use super::factor::HybridFactor;
use crate::error::SmootherError;
use crate::types::{DiscreteKey, DiscreteValues, HybridEstimate, Key};
use std::collections::{BTreeMap, BTreeSet};

/// An unordered bag of hybrid factors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridFactorGraph {
    factors: Vec<HybridFactor>,
}

impl HybridFactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, factor: impl Into<HybridFactor>) {
        self.factors.push(factor.into());
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HybridFactor> {
        self.factors.iter()
    }

    pub fn keys(&self) -> BTreeSet<Key> {
        self.factors.iter().flat_map(|f| f.keys()).collect()
    }

    pub fn continuous_keys(&self) -> BTreeSet<Key> {
        self.factors.iter().flat_map(|f| f.continuous_keys()).collect()
    }

    pub fn discrete_keys(&self) -> BTreeSet<Key> {
        self.discrete_key_map().into_keys().collect()
    }

    /// Every discrete key with its cardinality (first occurrence wins).
    pub fn discrete_key_map(&self) -> BTreeMap<Key, DiscreteKey> {
        let mut map = BTreeMap::new();
        for dk in self.factors.iter().flat_map(|f| f.discrete_keys()) {
            map.entry(dk.key).or_insert(dk);
        }
        map
    }

    /// Slices every factor at fixed discrete values.
    pub fn restrict(self, fixed: &DiscreteValues) -> Result<Self, SmootherError> {
        let factors = self
            .factors
            .into_iter()
            .map(|f| f.restrict(fixed))
            .collect::<Result<_, _>>()?;
        Ok(Self { factors })
    }

    /// Total `−log` of the factor product at an estimate.
    pub fn error(&self, estimate: &HybridEstimate) -> Option<f64> {
        self.factors.iter().map(|f| f.error(estimate)).sum()
    }
}

impl FromIterator<HybridFactor> for HybridFactorGraph {
    fn from_iter<I: IntoIterator<Item = HybridFactor>>(iter: I) -> Self {
        Self {
            factors: iter.into_iter().collect(),
        }
    }
}

impl Extend<HybridFactor> for HybridFactorGraph {
    fn extend<I: IntoIterator<Item = HybridFactor>>(&mut self, iter: I) {
        self.factors.extend(iter);
    }
}

impl IntoIterator for HybridFactorGraph {
    type Item = HybridFactor;
    type IntoIter = std::vec::IntoIter<HybridFactor>;

    fn into_iter(self) -> Self::IntoIter {
        self.factors.into_iter()
    }
}

impl<'a> IntoIterator for &'a HybridFactorGraph {
    type Item = &'a HybridFactor;
    type IntoIter = std::slice::Iter<'a, HybridFactor>;

    fn into_iter(self) -> Self::IntoIter {
        self.factors.iter()
    }
}
