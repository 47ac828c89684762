// hybrid_core/src/hybrid/factor.rs

use crate::discrete::{Branches, DiscreteTable};
use crate::error::{SmootherError, TableError};
use crate::linear::JacobianFactor;
use crate::types::{format_keys, DiscreteKey, DiscreteValues, HybridEstimate, Key};

/// A Gaussian mixture: one `(JacobianFactor, scalar)` pair per joint
/// assignment of the discrete keys. The scalar is added to the component's
/// error, so `−log` weights and noise normalization constants live there.
/// Absent branches have zero probability.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridGaussianFactor {
    components: Branches<(JacobianFactor, f64)>,
}

impl HybridGaussianFactor {
    /// Builds a mixture from dense components listed in lexicographic
    /// assignment order of `discrete_keys`.
    pub fn new(
        discrete_keys: Vec<DiscreteKey>,
        components: Vec<(JacobianFactor, f64)>,
    ) -> Result<Self, TableError> {
        let expected = crate::discrete::cardinality_product(&discrete_keys);
        if components.len() != expected {
            return Err(TableError::WrongSize {
                keys: format_keys(&discrete_keys.iter().map(|k| k.key).collect::<Vec<_>>()),
                expected,
                actual: components.len(),
            });
        }
        let mut components = components.into_iter();
        Ok(Self {
            components: Branches::from_fn(discrete_keys, |_| components.next()),
        })
    }

    pub fn from_branches(components: Branches<(JacobianFactor, f64)>) -> Self {
        Self { components }
    }

    pub fn discrete_keys(&self) -> &[DiscreteKey] {
        self.components.keys()
    }

    pub fn components(&self) -> &Branches<(JacobianFactor, f64)> {
        &self.components
    }

    /// Union of the continuous keys over all present components, in order of
    /// first appearance.
    pub fn continuous_keys(&self) -> Vec<Key> {
        let mut keys = Vec::new();
        for (factor, _) in self.components.values() {
            for key in factor.keys() {
                if !keys.contains(key) {
                    keys.push(*key);
                }
            }
        }
        keys
    }

    pub fn error(&self, estimate: &HybridEstimate) -> Option<f64> {
        match self.components.select(&estimate.discrete).ok()? {
            Some((factor, scalar)) => factor.error(&estimate.continuous).map(|e| e + scalar),
            None => Some(f64::INFINITY),
        }
    }
}

/// Closed set of factor kinds the elimination engine understands.
#[derive(Debug, Clone, PartialEq)]
pub enum HybridFactor {
    Continuous(JacobianFactor),
    Discrete(DiscreteTable),
    Mixture(HybridGaussianFactor),
}

impl From<JacobianFactor> for HybridFactor {
    fn from(f: JacobianFactor) -> Self {
        HybridFactor::Continuous(f)
    }
}

impl From<DiscreteTable> for HybridFactor {
    fn from(f: DiscreteTable) -> Self {
        HybridFactor::Discrete(f)
    }
}

impl From<HybridGaussianFactor> for HybridFactor {
    fn from(f: HybridGaussianFactor) -> Self {
        HybridFactor::Mixture(f)
    }
}

impl HybridFactor {
    pub fn continuous_keys(&self) -> Vec<Key> {
        match self {
            HybridFactor::Continuous(f) => f.keys().to_vec(),
            HybridFactor::Discrete(_) => Vec::new(),
            HybridFactor::Mixture(f) => f.continuous_keys(),
        }
    }

    pub fn discrete_keys(&self) -> Vec<DiscreteKey> {
        match self {
            HybridFactor::Continuous(_) => Vec::new(),
            HybridFactor::Discrete(t) => t.keys().to_vec(),
            HybridFactor::Mixture(f) => f.discrete_keys().to_vec(),
        }
    }

    /// Continuous keys followed by discrete keys.
    pub fn keys(&self) -> Vec<Key> {
        let mut keys = self.continuous_keys();
        keys.extend(self.discrete_keys().iter().map(|k| k.key));
        keys
    }

    pub fn involves(&self, key: Key) -> bool {
        match self {
            HybridFactor::Continuous(f) => f.keys().contains(&key),
            HybridFactor::Discrete(t) => t.contains_key(key),
            HybridFactor::Mixture(f) => {
                f.components().contains_key(key) || f.continuous_keys().contains(&key)
            }
        }
    }

    /// Slices the factor at fixed discrete values. A mixture left without
    /// discrete keys collapses to its single component.
    pub fn restrict(self, fixed: &DiscreteValues) -> Result<HybridFactor, SmootherError> {
        if fixed.is_empty() {
            return Ok(self);
        }
        match self {
            HybridFactor::Continuous(_) => Ok(self),
            HybridFactor::Discrete(t) => Ok(HybridFactor::Discrete(t.restrict(fixed))),
            HybridFactor::Mixture(f) => {
                let keys = f.components.key_ids();
                let restricted = f.components.restrict(fixed);
                if restricted.is_empty() {
                    return Err(SmootherError::Invariant(format!(
                        "mixture over {} has no branch consistent with the fixed values",
                        format_keys(&keys)
                    )));
                }
                if restricted.keys().is_empty() {
                    // A single branch over no keys; its scalar is a constant.
                    let (factor, _) = restricted
                        .into_entries()
                        .next()
                        .map(|(_, component)| component)
                        .ok_or_else(|| SmootherError::Invariant("empty restricted mixture".into()))?;
                    Ok(HybridFactor::Continuous(factor))
                } else {
                    Ok(HybridFactor::Mixture(HybridGaussianFactor::from_branches(restricted)))
                }
            }
        }
    }

    /// `−log` of the (unnormalized) factor value at an estimate; `None` if the
    /// estimate does not cover the factor's keys.
    pub fn error(&self, estimate: &HybridEstimate) -> Option<f64> {
        match self {
            HybridFactor::Continuous(f) => f.error(&estimate.continuous),
            HybridFactor::Discrete(t) => t.evaluate(&estimate.discrete).ok().map(|p| -p.ln()),
            HybridFactor::Mixture(f) => f.error(estimate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{m, x};
    use nalgebra::DVector;

    fn two_mode_odometry() -> HybridGaussianFactor {
        let mode = DiscreteKey::new(m(0), 2);
        HybridGaussianFactor::new(
            vec![mode],
            vec![
                (
                    JacobianFactor::between(x(0), x(1), DVector::from_element(1, 1.0), 1.0),
                    0.0,
                ),
                (
                    JacobianFactor::between(x(0), x(1), DVector::from_element(1, 5.0), 1.0),
                    2.0,
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn mixture_reports_both_key_kinds() {
        let f: HybridFactor = two_mode_odometry().into();
        assert_eq!(f.keys(), vec![x(0), x(1), m(0)]);
        assert!(f.involves(m(0)));
        assert!(f.involves(x(1)));
        assert!(!f.involves(x(2)));
    }

    #[test]
    fn wrong_component_count_is_rejected() {
        let err = HybridGaussianFactor::new(vec![DiscreteKey::new(m(0), 3)], vec![]).unwrap_err();
        assert!(matches!(err, TableError::WrongSize { expected: 3, .. }));
    }

    #[test]
    fn restricting_the_only_mode_collapses_to_a_jacobian() {
        let f: HybridFactor = two_mode_odometry().into();
        let fixed: DiscreteValues = [(m(0), 1)].into_iter().collect();
        match f.restrict(&fixed).unwrap() {
            HybridFactor::Continuous(j) => assert_eq!(j.rhs()[0], 5.0),
            other => panic!("expected a Jacobian, got {other:?}"),
        }
    }

    #[test]
    fn error_includes_the_branch_scalar() {
        let f = two_mode_odometry();
        let mut estimate = HybridEstimate::default();
        estimate.continuous.insert(x(0), DVector::from_element(1, 0.0));
        estimate.continuous.insert(x(1), DVector::from_element(1, 5.0));
        estimate.discrete.insert(m(0), 1);
        assert_eq!(f.error(&estimate), Some(2.0));
    }
}
