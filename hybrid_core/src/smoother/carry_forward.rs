// hybrid_core/src/smoother/carry_forward.rs

use super::store::{BeliefStore, Removed};
use crate::error::SmootherError;
use crate::hybrid::{HybridConditional, HybridFactorGraph};
use crate::types::{DiscreteValues, Key};
use std::collections::BTreeSet;

/// The elimination graph for one update and the conditionals taken out of
/// the store to build it.
#[derive(Debug)]
pub struct Carried {
    pub graph: HybridFactorGraph,
    pub removed: Vec<Removed>,
}

impl Carried {
    pub fn reopened(&self) -> usize {
        self.removed.len()
    }
}

/// Pulls every stored conditional that touches `new_factors` back out of
/// the store and joins it, as a factor, with the new batch.
///
/// Starting from the keys of the new factors, each defined key has its
/// conditional removed and that conditional's parents are visited in turn,
/// so every key of the resulting graph that had a definition loses it. Fixed
/// keys are never reopened, and reopened conditionals are sliced at the
/// fixed values. A parent that is neither defined nor fixed means the store
/// is corrupt; the call fails and the store is left as it was.
pub fn reopen(
    new_factors: &HybridFactorGraph,
    store: &mut BeliefStore,
    fixed: &DiscreteValues,
) -> Result<Carried, SmootherError> {
    let mut worklist: Vec<Key> = new_factors.keys().into_iter().rev().collect();
    let mut visited: BTreeSet<Key> = BTreeSet::new();
    let mut reopened: BTreeSet<Key> = BTreeSet::new();
    let mut removed = Vec::new();
    let mut graph = new_factors.clone();

    while let Some(key) = worklist.pop() {
        if !visited.insert(key) || fixed.contains_key(&key) {
            continue;
        }
        let entry = match store.remove(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => continue,
            Err(e) => {
                // Leave the store exactly as we found it.
                store.restore(removed)?;
                return Err(e);
            }
        };
        let frontals = entry.conditional.frontals();
        let parents = entry.conditional.parents();
        visited.extend(frontals.iter().copied());
        reopened.extend(frontals);
        let orphan = parents
            .iter()
            .copied()
            .find(|p| !fixed.contains_key(p) && !store.contains(*p) && !reopened.contains(p));
        removed.push(entry);
        if let Some(orphan) = orphan {
            store.restore(removed)?;
            return Err(SmootherError::Invariant(format!(
                "{orphan} is a parent of a stored conditional but has no definition"
            )));
        }
        worklist.extend(parents.into_iter().filter(|k| !visited.contains(k)));
    }

    let restricted: Result<Vec<_>, _> = removed
        .iter()
        .map(|entry| entry.conditional.clone().restrict(fixed))
        .collect();
    let restricted = match restricted {
        Ok(restricted) => restricted,
        Err(e) => {
            store.restore(removed)?;
            return Err(e);
        }
    };
    graph.extend(restricted.into_iter().flatten().map(HybridConditional::into_factor));
    Ok(Carried { graph, removed })
}
