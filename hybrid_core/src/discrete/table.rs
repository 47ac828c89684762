// hybrid_core/src/discrete/table.rs

use super::branches::{all_assignments, Assignment, Branches};
use crate::error::TableError;
use crate::types::{format_keys, DiscreteKey, DiscreteValues, Key};
use std::collections::BTreeMap;

/// How `marginalize` folds the eliminated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduce {
    Sum,
    Max,
}

/// A non-negative function over joint discrete assignments.
///
/// Only strictly positive entries are stored; everything else is zero. A table
/// is both a discrete factor and the leaf set the pruner ranks.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteTable {
    branches: Branches<f64>,
}

/// For every remaining assignment after a `Max` reduction, the best values of
/// the reduced keys (in `marginalize`'s key order).
pub type ArgmaxTable = BTreeMap<Assignment, Assignment>;

impl DiscreteTable {
    /// Builds a table from dense values in lexicographic assignment order.
    pub fn new(keys: Vec<DiscreteKey>, values: Vec<f64>) -> Result<Self, TableError> {
        let expected = super::branches::cardinality_product(&keys);
        if values.len() != expected {
            return Err(TableError::WrongSize {
                keys: format_keys(&keys.iter().map(|k| k.key).collect::<Vec<_>>()),
                expected,
                actual: values.len(),
            });
        }
        let mut i = 0;
        let branches = Branches::from_fn(keys, |_| {
            let v = values[i];
            i += 1;
            (v > 0.0).then_some(v)
        });
        Ok(Self { branches })
    }

    pub fn uniform(keys: Vec<DiscreteKey>) -> Self {
        Self {
            branches: Branches::from_fn(keys, |_| Some(1.0)),
        }
    }

    /// Wraps sparse branches, dropping non-positive entries.
    pub fn from_branches(mut branches: Branches<f64>) -> Self {
        branches.retain(|_, v| *v > 0.0);
        Self { branches }
    }

    pub fn keys(&self) -> &[DiscreteKey] {
        self.branches.keys()
    }

    pub fn key_ids(&self) -> Vec<Key> {
        self.branches.key_ids()
    }

    pub fn contains_key(&self, key: Key) -> bool {
        self.branches.contains_key(key)
    }

    pub fn branches(&self) -> &Branches<f64> {
        &self.branches
    }

    /// Number of non-zero leaves.
    pub fn nonzero_count(&self) -> usize {
        self.branches.len()
    }

    pub fn sum(&self) -> f64 {
        self.branches.values().sum()
    }

    pub fn get(&self, assignment: &[usize]) -> f64 {
        self.branches.get(assignment).copied().unwrap_or(0.0)
    }

    /// Evaluates the table at an assignment map that covers all of its keys.
    pub fn evaluate(&self, values: &DiscreteValues) -> Result<f64, Key> {
        Ok(self.branches.select(values)?.copied().unwrap_or(0.0))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Assignment, f64)> {
        self.branches.iter().map(|(a, v)| (a, *v))
    }

    pub fn product(&self, other: &DiscreteTable) -> Result<DiscreteTable, TableError> {
        let joined = self.branches.join(&other.branches, |a, b| {
            let v = a * b;
            (v > 0.0).then_some(v)
        })?;
        Ok(Self { branches: joined })
    }

    /// Sums or maximizes `eliminate` out of the table. For `Max` the second
    /// element maps each remaining assignment to the maximizing values of the
    /// eliminated keys; for `Sum` it is empty.
    pub fn marginalize(&self, eliminate: &[Key], op: Reduce) -> (DiscreteTable, ArgmaxTable) {
        let keys = self.branches.keys();
        let keep_pos: Vec<usize> = (0..keys.len())
            .filter(|&i| !eliminate.contains(&keys[i].key))
            .collect();
        let elim_pos: Vec<usize> = (0..keys.len())
            .filter(|&i| eliminate.contains(&keys[i].key))
            .collect();

        let mut reduced: BTreeMap<Assignment, f64> = BTreeMap::new();
        let mut argmax = ArgmaxTable::new();
        for (a, v) in self.branches.iter() {
            let rest: Assignment = keep_pos.iter().map(|&i| a[i]).collect();
            match op {
                Reduce::Sum => *reduced.entry(rest).or_insert(0.0) += v,
                Reduce::Max => {
                    let best = reduced.entry(rest.clone()).or_insert(0.0);
                    if *v > *best {
                        *best = *v;
                        argmax.insert(rest, elim_pos.iter().map(|&i| a[i]).collect());
                    }
                }
            }
        }

        let mut branches = Branches::new(keep_pos.iter().map(|&i| keys[i]).collect());
        for (a, v) in reduced {
            // Positions come from the table's own keys, so the assignment is in range.
            let _ = branches.insert(a, v);
        }
        (Self { branches }, argmax)
    }

    pub fn restrict(&self, fixed: &DiscreteValues) -> DiscreteTable {
        Self {
            branches: self.branches.clone().restrict(fixed),
        }
    }

    /// Scales the table so its entries sum to one (no-op for an all-zero table).
    pub fn normalized(mut self) -> DiscreteTable {
        let total = self.sum();
        if total > 0.0 {
            self.branches = self.branches.map(|_, v| Some(v / total));
        }
        self
    }

    /// Scales the table so its largest entry is one.
    pub fn scaled_to_max(mut self) -> DiscreteTable {
        let max = self.branches.values().copied().fold(0.0, f64::max);
        if max > 0.0 {
            self.branches = self.branches.map(|_, v| Some(v / max));
        }
        self
    }

    /// Marginal distribution of a single key (normalized).
    pub fn marginal_of(&self, key: Key) -> Option<Vec<f64>> {
        let position = self.branches.keys().iter().position(|k| k.key == key)?;
        let mut marginal = vec![0.0; self.branches.keys()[position].cardinality];
        for (a, v) in self.branches.iter() {
            marginal[a[position]] += v;
        }
        let total: f64 = marginal.iter().sum();
        if total > 0.0 {
            marginal.iter_mut().for_each(|p| *p /= total);
        }
        Some(marginal)
    }

    /// Dense values in lexicographic assignment order (testing/diagnostics).
    pub fn to_dense(&self) -> Vec<f64> {
        all_assignments(self.branches.keys())
            .map(|a| self.get(&a))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::m;
    use approx::assert_abs_diff_eq;

    fn binary(i: u64) -> DiscreteKey {
        DiscreteKey::new(m(i), 2)
    }

    #[test]
    fn zero_entries_are_not_stored() {
        let t = DiscreteTable::new(vec![binary(0)], vec![0.0, 0.4]).unwrap();
        assert_eq!(t.nonzero_count(), 1);
        assert_eq!(t.get(&[0]), 0.0);
        assert_eq!(t.get(&[1]), 0.4);
    }

    #[test]
    fn wrong_value_count_is_rejected() {
        let err = DiscreteTable::new(vec![binary(0), binary(1)], vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, TableError::WrongSize { expected: 4, actual: 3, .. }));
    }

    #[test]
    fn product_then_sum_recovers_marginal() {
        let prior = DiscreteTable::new(vec![binary(0)], vec![0.3, 0.7]).unwrap();
        let likelihood =
            DiscreteTable::new(vec![binary(0), binary(1)], vec![0.9, 0.1, 0.2, 0.8]).unwrap();
        let joint = prior.product(&likelihood).unwrap();
        let (marginal, _) = joint.marginalize(&[m(0)], Reduce::Sum);
        assert_eq!(marginal.key_ids(), vec![m(1)]);
        assert_abs_diff_eq!(marginal.get(&[0]), 0.3 * 0.9 + 0.7 * 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(marginal.get(&[1]), 0.3 * 0.1 + 0.7 * 0.8, epsilon = 1e-12);
    }

    #[test]
    fn max_reduction_records_argmax() {
        let t = DiscreteTable::new(vec![binary(0), binary(1)], vec![0.1, 0.5, 0.3, 0.1]).unwrap();
        let (best, argmax) = t.marginalize(&[m(0)], Reduce::Max);
        assert_abs_diff_eq!(best.get(&[0]), 0.3);
        assert_abs_diff_eq!(best.get(&[1]), 0.5);
        assert_eq!(argmax[&vec![0]], vec![1]);
        assert_eq!(argmax[&vec![1]], vec![0]);
    }

    #[test]
    fn marginal_of_single_key_is_normalized() {
        let t = DiscreteTable::new(vec![binary(0), binary(1)], vec![1.0, 1.0, 2.0, 0.0]).unwrap();
        let marginal = t.marginal_of(m(0)).unwrap();
        assert_abs_diff_eq!(marginal[0], 0.5);
        assert_abs_diff_eq!(marginal[1], 0.5);
        assert!(t.marginal_of(m(9)).is_none());
    }
}
