// hybrid_core/src/ordering.rs

use crate::hybrid::HybridFactorGraph;
use crate::types::Key;
use std::collections::{BTreeMap, BTreeSet};

/// A total order over a graph's variables, first-eliminated first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ordering(Vec<Key>);

impl Ordering {
    pub fn new(keys: Vec<Key>) -> Self {
        Self(keys)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Key] {
        &self.0
    }
}

impl From<Vec<Key>> for Ordering {
    fn from(keys: Vec<Key>) -> Self {
        Self(keys)
    }
}

impl<'a> IntoIterator for &'a Ordering {
    type Item = &'a Key;
    type IntoIter = std::slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Greedy minimum-degree ordering with group constraints.
///
/// Keys fall into three groups eliminated in sequence: unconstrained keys,
/// then `last_keys`, then (when `discrete_last` is set) every discrete key.
/// Inside a group the key with the fewest live neighbors goes next, ties
/// broken by the smaller key, so the result is deterministic.
pub fn constrained_ordering(graph: &HybridFactorGraph, last_keys: &[Key], discrete_last: bool) -> Ordering {
    let discrete = graph.discrete_keys();
    let last: BTreeSet<Key> = last_keys.iter().copied().collect();
    let group = |key: &Key| -> u8 {
        if discrete_last && discrete.contains(key) {
            2
        } else if last.contains(key) {
            1
        } else {
            0
        }
    };

    let mut adjacency: BTreeMap<Key, BTreeSet<Key>> = BTreeMap::new();
    for factor in graph.iter() {
        let clique = factor.keys();
        for &a in &clique {
            let neighbors = adjacency.entry(a).or_default();
            neighbors.extend(clique.iter().copied().filter(|b| *b != a));
        }
    }

    let mut order = Vec::with_capacity(adjacency.len());
    while let Some(next) = adjacency
        .iter()
        .min_by_key(|&(key, neighbors)| (group(key), neighbors.len(), *key))
        .map(|(key, _)| *key)
    {
        let neighbors = adjacency.remove(&next).unwrap_or_default();
        // Eliminating `next` connects all of its neighbors.
        for a in &neighbors {
            if let Some(adj) = adjacency.get_mut(a) {
                adj.remove(&next);
                adj.extend(neighbors.iter().copied().filter(|b| b != a));
            }
        }
        order.push(next);
    }
    Ordering(order)
}
