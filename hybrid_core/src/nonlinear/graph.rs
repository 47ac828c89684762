// hybrid_core/src/nonlinear/graph.rs

use super::factor::NonlinearFactor;
use super::hybrid::HybridNonlinearFactor;
use super::values::Values;
use crate::discrete::DiscreteTable;
use crate::error::FactorError;
use crate::hybrid::{HybridFactor, HybridFactorGraph};

/// One entry of a nonlinear hybrid graph.
#[derive(Debug, Clone)]
pub enum NonlinearEntry {
    Nonlinear(Box<dyn NonlinearFactor>),
    Hybrid(HybridNonlinearFactor),
    Discrete(DiscreteTable),
}

impl From<HybridNonlinearFactor> for NonlinearEntry {
    fn from(f: HybridNonlinearFactor) -> Self {
        Self::Hybrid(f)
    }
}

impl From<DiscreteTable> for NonlinearEntry {
    fn from(t: DiscreteTable) -> Self {
        Self::Discrete(t)
    }
}

impl From<Box<dyn NonlinearFactor>> for NonlinearEntry {
    fn from(f: Box<dyn NonlinearFactor>) -> Self {
        Self::Nonlinear(f)
    }
}

/// Factors collected between smoother updates, linearized together.
#[derive(Debug, Clone, Default)]
pub struct HybridNonlinearFactorGraph {
    entries: Vec<NonlinearEntry>,
}

impl HybridNonlinearFactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plain nonlinear factor.
    pub fn add(&mut self, factor: impl NonlinearFactor + 'static) {
        self.entries.push(NonlinearEntry::Nonlinear(Box::new(factor)));
    }

    pub fn push(&mut self, entry: impl Into<NonlinearEntry>) {
        self.entries.push(entry.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &NonlinearEntry> {
        self.entries.iter()
    }

    /// Linearizes every entry at `values`. Discrete tables pass through.
    pub fn linearize(&self, values: &Values) -> Result<HybridFactorGraph, FactorError> {
        self.entries
            .iter()
            .map(|entry| {
                Ok(match entry {
                    NonlinearEntry::Nonlinear(f) => HybridFactor::Continuous(f.linearize(values)?),
                    NonlinearEntry::Hybrid(f) => HybridFactor::Mixture(f.linearize(values)?),
                    NonlinearEntry::Discrete(t) => HybridFactor::Discrete(t.clone()),
                })
            })
            .collect()
    }

    /// Sum of all factor errors at `values`; discrete and hybrid entries are
    /// skipped because they need a discrete assignment.
    pub fn continuous_error(&self, values: &Values) -> Result<f64, FactorError> {
        let mut total = 0.0;
        for entry in &self.entries {
            if let NonlinearEntry::Nonlinear(f) = entry {
                total += f.error(values)?;
            }
        }
        Ok(total)
    }
}
