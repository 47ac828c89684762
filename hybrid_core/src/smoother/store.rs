// hybrid_core/src/smoother/store.rs

use crate::error::SmootherError;
use crate::hybrid::{HybridBayesNet, HybridConditional};
use crate::types::{DiscreteValues, Key};
use std::collections::HashMap;

/// One arena cell. A removed conditional leaves a `Vacant` hole until the
/// next compaction so that slot numbers of the others stay valid.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Live(HybridConditional),
    Vacant,
}

/// A conditional taken out of the store, remembering where it lived.
#[derive(Debug, Clone, PartialEq)]
pub struct Removed {
    slot: usize,
    version: u64,
    pub conditional: HybridConditional,
}

/// The accumulated posterior: conditionals in append order (children before
/// parents) with a `frontal key -> slot` index.
#[derive(Debug, Clone, Default)]
pub struct BeliefStore {
    slots: Vec<Slot>,
    index: HashMap<Key, usize>,
    live: usize,
    version: u64,
}

impl BeliefStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live conditionals.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Bumped by every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn contains(&self, key: Key) -> bool {
        self.index.contains_key(&key)
    }

    /// Every key with a defining conditional.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.index.keys()
    }

    /// The conditional defining `key`.
    pub fn get(&self, key: Key) -> Option<&HybridConditional> {
        match self.slots.get(*self.index.get(&key)?)? {
            Slot::Live(conditional) => Some(conditional),
            Slot::Vacant => None,
        }
    }

    /// Live conditionals in store order (roots last).
    pub fn iter(&self) -> impl Iterator<Item = &HybridConditional> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Live(conditional) => Some(conditional),
            Slot::Vacant => None,
        })
    }

    /// Appends a fragment. Fails without touching the store if any frontal is
    /// already defined, in the store or twice in the fragment, or if a parent
    /// is defined neither in the store nor in the fragment and is not `fixed`.
    pub fn append(&mut self, fragment: HybridBayesNet, fixed: &DiscreteValues) -> Result<(), SmootherError> {
        let mut incoming: HashMap<Key, usize> = HashMap::new();
        for (offset, conditional) in fragment.iter().enumerate() {
            for frontal in conditional.frontals() {
                if self.index.contains_key(&frontal) || incoming.insert(frontal, offset).is_some() {
                    return Err(SmootherError::Invariant(format!(
                        "{frontal} would have two defining conditionals"
                    )));
                }
            }
        }
        for conditional in fragment.iter() {
            let orphan = conditional.parents().into_iter().find(|parent| {
                !incoming.contains_key(parent) && !self.index.contains_key(parent) && !fixed.contains_key(parent)
            });
            if let Some(parent) = orphan {
                return Err(SmootherError::Invariant(format!(
                    "parent {parent} of {:?} has no defining conditional",
                    conditional.frontals()
                )));
            }
        }
        let base = self.slots.len();
        self.index
            .extend(incoming.into_iter().map(|(key, offset)| (key, base + offset)));
        self.live += fragment.len();
        self.slots.extend(fragment.into_iter().map(Slot::Live));
        self.version += 1;
        Ok(())
    }

    /// Removes the conditional defining `key`, vacating its slot and
    /// unindexing all of its frontals. `Ok(None)` if nothing defines `key`.
    pub fn remove(&mut self, key: Key) -> Result<Option<Removed>, SmootherError> {
        let Some(&slot) = self.index.get(&key) else {
            return Ok(None);
        };
        let cell = self.slots.get_mut(slot).ok_or_else(|| {
            SmootherError::Invariant(format!("index entry for {key} points past the arena"))
        })?;
        let conditional = match std::mem::replace(cell, Slot::Vacant) {
            Slot::Live(conditional) => conditional,
            Slot::Vacant => {
                return Err(SmootherError::Invariant(format!(
                    "index entry for {key} points at a vacant slot"
                )))
            }
        };
        for frontal in conditional.frontals() {
            self.index.remove(&frontal);
        }
        self.live -= 1;
        self.version += 1;
        Ok(Some(Removed {
            slot,
            version: self.version,
            conditional,
        }))
    }

    /// Puts removed conditionals back into their slots. Must be given the
    /// removals of the current transaction, before any compaction.
    pub fn restore(&mut self, removed: Vec<Removed>) -> Result<(), SmootherError> {
        for entry in removed.into_iter().rev() {
            let cell = self.slots.get_mut(entry.slot).ok_or_else(|| {
                SmootherError::Invariant(format!(
                    "slot {} removed at version {} no longer exists",
                    entry.slot, entry.version
                ))
            })?;
            if let Slot::Live(_) = cell {
                return Err(SmootherError::Invariant(format!(
                    "slot {} was reused before its conditional was restored",
                    entry.slot
                )));
            }
            for frontal in entry.conditional.frontals() {
                self.index.insert(frontal, entry.slot);
            }
            *cell = Slot::Live(entry.conditional);
            self.live += 1;
        }
        self.version += 1;
        Ok(())
    }

    /// Drops vacant slots once they outnumber live ones.
    pub fn compact_if_sparse(&mut self) {
        let vacant = self.slots.len() - self.live;
        if vacant <= self.live {
            return;
        }
        self.slots.retain(|slot| matches!(slot, Slot::Live(_)));
        self.index.clear();
        for (slot, cell) in self.slots.iter().enumerate() {
            if let Slot::Live(conditional) = cell {
                for frontal in conditional.frontals() {
                    self.index.insert(frontal, slot);
                }
            }
        }
        self.version += 1;
    }

    /// Total slot count including vacant ones.
    pub fn capacity_used(&self) -> usize {
        self.slots.len()
    }
}
