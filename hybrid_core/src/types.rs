// hybrid_core/src/types.rs

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// --- Core Type Aliases ---
/// A discrete assignment: key -> chosen value index.
pub type DiscreteValues = BTreeMap<Key, usize>;
/// A continuous assignment (or tangent-space delta): key -> vector.
pub type VectorValues = BTreeMap<Key, DVector<f64>>;

// --- Core Identifier ---
/// An opaque variable identifier.
///
/// Keys built with [`Key::symbol`] pack a character into the top byte and an
/// index into the remaining 56 bits, so `x(3)` prints as `x3`. Plain integer
/// keys print as their number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Key(pub u64);

const CHR_BITS: u32 = 8;
const INDEX_BITS: u32 = 64 - CHR_BITS;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

impl Key {
    pub const fn symbol(chr: char, index: u64) -> Self {
        Self(((chr as u64) << INDEX_BITS) | (index & INDEX_MASK))
    }

    /// The symbol character, if this key was built with [`Key::symbol`].
    pub fn chr(self) -> Option<char> {
        let c = (self.0 >> INDEX_BITS) as u8;
        if c.is_ascii_alphabetic() {
            Some(c as char)
        } else {
            None
        }
    }

    pub fn index(self) -> u64 {
        self.0 & INDEX_MASK
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chr() {
            Some(c) => write!(f, "{}{}", c, self.index()),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Pose variables.
pub fn x(index: u64) -> Key {
    Key::symbol('x', index)
}

/// Discrete measurement-mode variables.
pub fn m(index: u64) -> Key {
    Key::symbol('m', index)
}

/// Discrete loop-closure (inlier/outlier) variables.
pub fn l(index: u64) -> Key {
    Key::symbol('l', index)
}

/// A discrete variable together with its number of possible values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DiscreteKey {
    pub key: Key,
    pub cardinality: usize,
}

impl DiscreteKey {
    pub fn new(key: Key, cardinality: usize) -> Self {
        Self { key, cardinality }
    }
}

impl fmt::Display for DiscreteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.key, self.cardinality)
    }
}

/// The joint point estimate returned by the smoother.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridEstimate {
    pub discrete: DiscreteValues,
    pub continuous: VectorValues,
}

impl HybridEstimate {
    pub fn new(discrete: DiscreteValues, continuous: VectorValues) -> Self {
        Self {
            discrete,
            continuous,
        }
    }
}

pub(crate) fn format_keys(keys: &[Key]) -> String {
    let names: Vec<String> = keys.iter().map(ToString::to_string).collect();
    format!("[{}]", names.join(", "))
}
