// hybrid_core/src/discrete/branches.rs

//! Sparse storage keyed by joint discrete assignments.
//!
//! An assignment is a `Vec<usize>` holding one value per key, in the order of
//! the container's key list. Assignments that are not stored are *absent*:
//! zero probability for tables, pruned branches for mixtures. Every consumer
//! has to handle the absent case through `Option`.

use crate::error::TableError;
use crate::types::{format_keys, DiscreteKey, DiscreteValues, Key};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type Assignment = Vec<usize>;

/// Number of joint assignments over `keys` (1 for no keys).
pub fn cardinality_product(keys: &[DiscreteKey]) -> usize {
    keys.iter().map(|k| k.cardinality).product()
}

/// Iterates all joint assignments over `keys` in lexicographic order.
pub fn all_assignments(keys: &[DiscreteKey]) -> AssignmentIter {
    AssignmentIter {
        cards: keys.iter().map(|k| k.cardinality).collect(),
        next: if keys.iter().any(|k| k.cardinality == 0) {
            None
        } else {
            Some(vec![0; keys.len()])
        },
    }
}

pub struct AssignmentIter {
    cards: Vec<usize>,
    next: Option<Assignment>,
}

impl Iterator for AssignmentIter {
    type Item = Assignment;

    fn next(&mut self) -> Option<Assignment> {
        let current = self.next.take()?;
        let mut advanced = current.clone();
        for pos in (0..advanced.len()).rev() {
            advanced[pos] += 1;
            if advanced[pos] < self.cards[pos] {
                self.next = Some(advanced);
                return Some(current);
            }
            advanced[pos] = 0;
        }
        // Odometer wrapped around: `current` was the last assignment.
        Some(current)
    }
}

/// Union of two key lists, keeping the order of `a` followed by the new keys of `b`.
pub fn union_keys(a: &[DiscreteKey], b: &[DiscreteKey]) -> Result<Vec<DiscreteKey>, TableError> {
    let mut out = a.to_vec();
    for dk in b {
        match out.iter().find(|k| k.key == dk.key) {
            Some(existing) if existing.cardinality != dk.cardinality => {
                return Err(TableError::CardinalityMismatch {
                    key: dk.key,
                    first: existing.cardinality,
                    second: dk.cardinality,
                })
            }
            Some(_) => {}
            None => out.push(*dk),
        }
    }
    Ok(out)
}

/// Sparse map from joint assignments of `keys` to values.
#[derive(Debug, Clone, PartialEq)]
pub struct Branches<T> {
    keys: Vec<DiscreteKey>,
    entries: BTreeMap<Assignment, T>,
}

impl<T> Branches<T> {
    pub fn new(keys: Vec<DiscreteKey>) -> Self {
        Self {
            keys,
            entries: BTreeMap::new(),
        }
    }

    /// Builds a container by visiting every assignment; `None` leaves it absent.
    pub fn from_fn(keys: Vec<DiscreteKey>, mut f: impl FnMut(&[usize]) -> Option<T>) -> Self {
        let mut entries = BTreeMap::new();
        for assignment in all_assignments(&keys) {
            if let Some(value) = f(&assignment) {
                entries.insert(assignment, value);
            }
        }
        Self { keys, entries }
    }

    pub fn keys(&self) -> &[DiscreteKey] {
        &self.keys
    }

    pub fn key_ids(&self) -> Vec<Key> {
        self.keys.iter().map(|k| k.key).collect()
    }

    pub fn contains_key(&self, key: Key) -> bool {
        self.keys.iter().any(|k| k.key == key)
    }

    /// Number of present (non-absent) branches.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, assignment: Assignment, value: T) -> Result<(), TableError> {
        self.check(&assignment)?;
        self.entries.insert(assignment, value);
        Ok(())
    }

    pub fn get(&self, assignment: &[usize]) -> Option<&T> {
        self.entries.get(assignment)
    }

    /// Looks up the branch selected by a (possibly larger) assignment map.
    /// Returns `Err(key)` for the first key the map does not assign.
    pub fn select(&self, values: &DiscreteValues) -> Result<Option<&T>, Key> {
        let assignment = self.project_values(values)?;
        Ok(self.entries.get(&assignment))
    }

    pub fn project_values(&self, values: &DiscreteValues) -> Result<Assignment, Key> {
        self.keys
            .iter()
            .map(|dk| values.get(&dk.key).copied().ok_or(dk.key))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Assignment, &T)> {
        self.entries.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (Assignment, T)> {
        self.entries.into_iter()
    }

    /// Converts an assignment of this container into a key -> value map.
    pub fn to_values(&self, assignment: &[usize]) -> DiscreteValues {
        self.keys
            .iter()
            .zip(assignment)
            .map(|(dk, v)| (dk.key, *v))
            .collect()
    }

    pub fn map<U>(self, mut f: impl FnMut(&[usize], T) -> Option<U>) -> Branches<U> {
        let entries = self
            .entries
            .into_iter()
            .filter_map(|(a, v)| f(&a, v).map(|u| (a, u)))
            .collect();
        Branches {
            keys: self.keys,
            entries,
        }
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&[usize], &T) -> bool) {
        self.entries.retain(|a, v| keep(a, v));
    }

    /// Slices the container at the fixed values it mentions; the fixed keys
    /// disappear from the key list and inconsistent branches are dropped.
    pub fn restrict(self, fixed: &DiscreteValues) -> Self {
        let kept_positions: Vec<usize> = (0..self.keys.len())
            .filter(|&i| !fixed.contains_key(&self.keys[i].key))
            .collect();
        if kept_positions.len() == self.keys.len() {
            return self;
        }
        let keys = kept_positions.iter().map(|&i| self.keys[i]).collect();
        let all_keys = self.keys;
        let entries = self
            .entries
            .into_iter()
            .filter(|(a, _)| {
                all_keys
                    .iter()
                    .zip(a)
                    .all(|(dk, v)| fixed.get(&dk.key).map_or(true, |f| f == v))
            })
            .map(|(a, v)| (kept_positions.iter().map(|&i| a[i]).collect(), v))
            .collect();
        Self { keys, entries }
    }

    /// The set of distinct sub-assignments over `onto` (which must be a subset
    /// of this container's keys) reached by present branches.
    pub fn projections(&self, onto: &[Key]) -> Option<BTreeSet<Assignment>> {
        let positions = self.positions_of(onto)?;
        Some(
            self.entries
                .keys()
                .map(|a| positions.iter().map(|&p| a[p]).collect())
                .collect(),
        )
    }

    /// Natural join of two containers: every pair of present branches that
    /// agree on the shared keys is combined with `f`.
    pub fn join<'s, 'o, U, V>(
        &'s self,
        other: &'o Branches<U>,
        mut f: impl FnMut(&'s T, &'o U) -> Option<V>,
    ) -> Result<Branches<V>, TableError> {
        let keys = union_keys(&self.keys, &other.keys)?;
        let shared: Vec<(usize, usize)> = other
            .keys
            .iter()
            .enumerate()
            .filter_map(|(j, dk)| self.keys.iter().position(|k| k.key == dk.key).map(|i| (i, j)))
            .collect();
        let fresh: Vec<usize> = (0..other.keys.len())
            .filter(|j| !shared.iter().any(|(_, sj)| sj == j))
            .collect();

        let mut by_shared: HashMap<Assignment, Vec<(&'o Assignment, &'o U)>> = HashMap::new();
        for (b, u) in &other.entries {
            let sub: Assignment = shared.iter().map(|&(_, j)| b[j]).collect();
            by_shared.entry(sub).or_default().push((b, u));
        }

        let mut entries = BTreeMap::new();
        for (a, t) in &self.entries {
            let sub: Assignment = shared.iter().map(|&(i, _)| a[i]).collect();
            let Some(matches) = by_shared.get(&sub) else {
                continue;
            };
            for &(b, u) in matches {
                if let Some(v) = f(t, u) {
                    let mut joined = a.clone();
                    joined.extend(fresh.iter().map(|&j| b[j]));
                    entries.insert(joined, v);
                }
            }
        }
        Ok(Branches { keys, entries })
    }

    fn positions_of(&self, onto: &[Key]) -> Option<Vec<usize>> {
        onto.iter()
            .map(|key| self.keys.iter().position(|k| k.key == *key))
            .collect()
    }

    fn check(&self, assignment: &[usize]) -> Result<(), TableError> {
        if assignment.len() != self.keys.len() {
            return Err(TableError::WrongSize {
                keys: format_keys(&self.key_ids()),
                expected: self.keys.len(),
                actual: assignment.len(),
            });
        }
        for (dk, &v) in self.keys.iter().zip(assignment) {
            if v >= dk.cardinality {
                return Err(TableError::ValueOutOfRange {
                    key: dk.key,
                    value: v,
                    cardinality: dk.cardinality,
                });
            }
        }
        Ok(())
    }
}

impl<T: Clone> Branches<T> {
    /// A container over no keys holding a single branch.
    pub fn single(value: T) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(Vec::new(), value);
        Self {
            keys: Vec::new(),
            entries,
        }
    }
}
