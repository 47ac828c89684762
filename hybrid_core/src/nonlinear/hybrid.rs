// hybrid_core/src/nonlinear/hybrid.rs

use super::factor::NonlinearFactor;
use super::values::Values;
use crate::discrete::{cardinality_product, Branches};
use crate::error::FactorError;
use crate::hybrid::HybridGaussianFactor;
use crate::types::{format_keys, DiscreteKey, Key};

/// A discrete choice between nonlinear measurement models.
///
/// Components are listed in lexicographic assignment order of the discrete
/// keys; each carries a scalar added to its error, typically the `−log`
/// normalization constant of its noise model so that models with different
/// covariances compete fairly.
#[derive(Debug, Clone)]
pub struct HybridNonlinearFactor {
    discrete_keys: Vec<DiscreteKey>,
    components: Vec<(Box<dyn NonlinearFactor>, f64)>,
}

impl HybridNonlinearFactor {
    pub fn new(
        discrete_keys: Vec<DiscreteKey>,
        components: Vec<(Box<dyn NonlinearFactor>, f64)>,
    ) -> Result<Self, FactorError> {
        let expected = cardinality_product(&discrete_keys);
        if components.len() != expected {
            return Err(FactorError::WrongComponentCount {
                keys: format_keys(&discrete_keys.iter().map(|k| k.key).collect::<Vec<_>>()),
                expected,
                actual: components.len(),
            });
        }
        Ok(Self {
            discrete_keys,
            components,
        })
    }

    /// Uses each component's own noise normalization constant as its scalar.
    pub fn with_noise_constants(
        discrete_keys: Vec<DiscreteKey>,
        factors: Vec<Box<dyn NonlinearFactor>>,
    ) -> Result<Self, FactorError> {
        let components = factors
            .into_iter()
            .map(|f| {
                let c = f.noise_model().neg_log_constant();
                (f, c)
            })
            .collect();
        Self::new(discrete_keys, components)
    }

    pub fn discrete_keys(&self) -> &[DiscreteKey] {
        &self.discrete_keys
    }

    pub fn components(&self) -> &[(Box<dyn NonlinearFactor>, f64)] {
        &self.components
    }

    /// Continuous keys over all components, in order of first appearance.
    pub fn keys(&self) -> Vec<Key> {
        let mut keys = Vec::new();
        for (factor, _) in &self.components {
            for key in factor.keys() {
                if !keys.contains(key) {
                    keys.push(*key);
                }
            }
        }
        keys
    }

    pub fn linearize(&self, values: &Values) -> Result<HybridGaussianFactor, FactorError> {
        let mut linear = Vec::with_capacity(self.components.len());
        for (factor, scalar) in &self.components {
            linear.push((factor.linearize(values)?, *scalar));
        }
        let mut linear = linear.into_iter();
        let branches = Branches::from_fn(self.discrete_keys.clone(), |_| linear.next());
        Ok(HybridGaussianFactor::from_branches(branches))
    }
}
