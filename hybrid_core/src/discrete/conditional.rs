// hybrid_core/src/discrete/conditional.rs

use super::table::{DiscreteTable, Reduce};
use crate::error::TableError;
use crate::types::{DiscreteKey, DiscreteValues, Key};

/// `P(frontals | parents)` stored as a table over frontals and parents, where
/// the entries for every parent assignment sum to one.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteConditional {
    frontals: Vec<Key>,
    table: DiscreteTable,
}

impl DiscreteConditional {
    /// Conditions a joint table on everything except `frontals`.
    pub fn from_joint(joint: &DiscreteTable, frontals: &[Key]) -> Self {
        let (marginal, _) = joint.marginalize(frontals, Reduce::Sum);
        let parent_keys = marginal.key_ids();
        let positions: Vec<usize> = parent_keys
            .iter()
            .filter_map(|pk| joint.keys().iter().position(|k| k.key == *pk))
            .collect();
        let branches = joint.branches().clone().map(|a, v| {
            let parents: Vec<usize> = positions.iter().map(|&p| a[p]).collect();
            let z = marginal.get(&parents);
            (z > 0.0).then(|| v / z)
        });
        Self {
            frontals: frontals.to_vec(),
            table: DiscreteTable::from_branches(branches),
        }
    }

    /// A prior over `key` from (unnormalized) weights.
    pub fn prior(key: DiscreteKey, weights: Vec<f64>) -> Result<Self, TableError> {
        let table = DiscreteTable::new(vec![key], weights)?;
        Ok(Self::from_joint(&table, &[key.key]))
    }

    pub fn frontals(&self) -> &[Key] {
        &self.frontals
    }

    pub fn parents(&self) -> Vec<Key> {
        self.table
            .key_ids()
            .into_iter()
            .filter(|k| !self.frontals.contains(k))
            .collect()
    }

    pub fn discrete_keys(&self) -> &[DiscreteKey] {
        self.table.keys()
    }

    pub fn table(&self) -> &DiscreteTable {
        &self.table
    }

    pub fn into_table(self) -> DiscreteTable {
        self.table
    }

    pub fn probability(&self, values: &DiscreteValues) -> Result<f64, Key> {
        self.table.evaluate(values)
    }

    /// The most probable frontal values given the parents' values.
    /// `None` if every frontal value has zero probability.
    pub fn argmax(&self, parents: &DiscreteValues) -> Option<DiscreteValues> {
        let restricted = self.table.restrict(parents);
        restricted
            .iter()
            .fold(None, |best: Option<(&Vec<usize>, f64)>, (a, v)| match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((a, v)),
            })
            .map(|(a, _)| restricted.branches().to_values(a))
    }

    /// Slices the conditional at fixed values. A fixed frontal stops being a
    /// frontal; the result may have no frontals left.
    pub fn restrict(&self, fixed: &DiscreteValues) -> Self {
        Self {
            frontals: self
                .frontals
                .iter()
                .copied()
                .filter(|k| !fixed.contains_key(k))
                .collect(),
            table: self.table.restrict(fixed),
        }
    }
}
