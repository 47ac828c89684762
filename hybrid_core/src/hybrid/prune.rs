// hybrid_core/src/hybrid/prune.rs

//! Bounds the number of discrete hypotheses a fragment carries forward.

use super::bayes_net::HybridBayesNet;
use super::conditional::HybridConditional;
use crate::discrete::{Branches, DiscreteConditional, DiscreteTable};
use crate::error::SmootherError;
use crate::smoother::validate_marginal_threshold;
use crate::types::{DiscreteValues, Key};

/// What pruning did to a fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruneOutcome {
    pub leaves_before: usize,
    pub leaves_after: usize,
    /// Discrete keys decided by this pruning pass.
    pub newly_fixed: DiscreteValues,
}

/// Keeps the `max_leaves` most probable discrete assignments of `fragment`.
///
/// The product of the fragment's discrete conditionals is ranked (ties go to
/// the lexicographically smaller assignment) and truncated. Keys are then
/// visited in order: a key whose marginal, given the keys fixed before it,
/// has a single non-zero value or a most likely value above
/// `marginal_threshold` becomes fixed and is sliced out of every
/// conditional. Fixing one key at a time keeps the fixed values jointly
/// possible. Mixture branches no kept assignment reaches are dropped, and
/// the discrete conditionals are replaced by one conditional holding the
/// renormalized kept joint, appended last.
pub fn prune(
    fragment: HybridBayesNet,
    max_leaves: usize,
    marginal_threshold: Option<f64>,
) -> Result<(HybridBayesNet, PruneOutcome), SmootherError> {
    if max_leaves == 0 {
        return Err(SmootherError::InvalidMaxLeaves);
    }
    validate_marginal_threshold(marginal_threshold)?;
    let joint = fragment.discrete_joint()?;
    let leaves_before = joint.nonzero_count();
    if joint.keys().is_empty() {
        let outcome = PruneOutcome {
            leaves_before,
            leaves_after: leaves_before,
            newly_fixed: DiscreteValues::new(),
        };
        return Ok((fragment, outcome));
    }

    let mut ranked: Vec<(&Vec<usize>, f64)> = joint.iter().collect();
    ranked.sort_by(|(a, va), (b, vb)| vb.total_cmp(va).then_with(|| a.cmp(b)));
    let mut kept = Branches::new(joint.keys().to_vec());
    for (assignment, value) in ranked.into_iter().take(max_leaves) {
        kept.insert(assignment.clone(), value)?;
    }
    let mut kept = DiscreteTable::from_branches(kept).normalized();

    let mut newly_fixed = DiscreteValues::new();
    for key in kept.key_ids() {
        let Some(marginal) = kept.marginal_of(key) else {
            continue;
        };
        let support = marginal.iter().filter(|p| **p > 0.0).count();
        let (best, p_best) = marginal
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });
        if support == 1 || marginal_threshold.is_some_and(|t| p_best > t) {
            let decided = DiscreteValues::from([(key, best)]);
            kept = kept.restrict(&decided).normalized();
            newly_fixed.insert(key, best);
        }
    }
    if kept.nonzero_count() == 0 {
        return Err(SmootherError::Invariant(format!(
            "fixing {newly_fixed:?} left no discrete hypothesis"
        )));
    }

    let mut pruned = HybridBayesNet::default();
    for conditional in fragment {
        if conditional.is_discrete() {
            continue;
        }
        let Some(conditional) = conditional.restrict(&newly_fixed)? else {
            continue;
        };
        match conditional {
            HybridConditional::Mixture(mut mixture) => {
                let onto: Vec<Key> = mixture.discrete_keys().iter().map(|k| k.key).collect();
                if let Some(allowed) = kept.branches().projections(&onto) {
                    mixture.retain_projections(&onto, &allowed);
                }
                if mixture.branches().is_empty() {
                    return Err(SmootherError::AbsentBranch {
                        key: mixture.frontal(),
                    });
                }
                pruned.push(HybridConditional::Mixture(mixture));
            }
            other => pruned.push(other),
        }
    }

    let leaves_after = kept.nonzero_count();
    if !kept.keys().is_empty() {
        let frontals = kept.key_ids();
        pruned.push(HybridConditional::Discrete(DiscreteConditional::from_joint(&kept, &frontals)));
    }
    Ok((
        pruned,
        PruneOutcome {
            leaves_before,
            leaves_after,
            newly_fixed,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discrete::DiscreteTable;
    use crate::hybrid::{eliminate_sequential, HybridFactorGraph, HybridGaussianFactor};
    use crate::linear::JacobianFactor;
    use crate::ordering::Ordering;
    use crate::types::{m, x, DiscreteKey};
    use nalgebra::DVector;

    fn scalar(v: f64) -> DVector<f64> {
        DVector::from_element(1, v)
    }

    /// Two independent binary modes on two odometry steps; the mode priors
    /// give the joint (0,0)=.48 (0,1)=.32 (1,0)=.12 (1,1)=.08.
    fn two_mode_fragment() -> HybridBayesNet {
        let priors = [[0.8, 0.2], [0.6, 0.4]];
        let mut graph = HybridFactorGraph::new();
        graph.push(JacobianFactor::prior(x(0), scalar(0.0), 0.1));
        for i in 0..2 {
            let mode = DiscreteKey::new(m(i), 2);
            graph.push(
                HybridGaussianFactor::new(
                    vec![mode],
                    vec![
                        (JacobianFactor::between(x(i), x(i + 1), scalar(1.0), 0.1), 0.0),
                        (JacobianFactor::between(x(i), x(i + 1), scalar(2.0), 0.1), 0.0),
                    ],
                )
                .unwrap(),
            );
            graph.push(DiscreteTable::new(vec![mode], priors[i as usize].to_vec()).unwrap());
        }
        let ordering = Ordering::new(vec![x(0), x(1), x(2), m(0), m(1)]);
        eliminate_sequential(&graph, &ordering).unwrap()
    }

    #[test]
    fn keeps_at_most_max_leaves() {
        let (pruned, outcome) = prune(two_mode_fragment(), 2, None).unwrap();
        assert_eq!(outcome.leaves_before, 4);
        assert_eq!(outcome.leaves_after, 2);
        assert_eq!(pruned.leaf_count().unwrap(), 2);
        // (0,0) and (0,1) survive, so m0 is decided.
        assert_eq!(outcome.newly_fixed.get(&m(0)), Some(&0));
        assert_eq!(pruned.iter().filter(|c| c.is_discrete()).count(), 1);
    }

    #[test]
    fn single_leaf_fixes_every_key() {
        let (pruned, outcome) = prune(two_mode_fragment(), 1, None).unwrap();
        assert_eq!(outcome.newly_fixed.len(), 2);
        assert!(pruned.iter().all(|c| matches!(c, HybridConditional::Continuous(_))));
        assert_eq!(pruned.leaf_count().unwrap(), 1);
    }

    #[test]
    fn threshold_fixes_confident_keys() {
        let (_, outcome) = prune(two_mode_fragment(), 4, Some(0.7)).unwrap();
        assert_eq!(outcome.newly_fixed.len(), 1);
        assert_eq!(outcome.newly_fixed.get(&m(0)), Some(&0));
        let (pruned, outcome) = prune(two_mode_fragment(), 4, Some(0.55)).unwrap();
        assert_eq!(outcome.newly_fixed.len(), 2);
        assert_eq!(outcome.leaves_after, 1);
        assert_eq!(pruned.leaf_count().unwrap(), 1);
        let (_, outcome) = prune(two_mode_fragment(), 4, Some(0.99)).unwrap();
        assert!(outcome.newly_fixed.is_empty());
    }

    #[test]
    fn mixture_branches_follow_the_kept_leaves() {
        let (pruned, _) = prune(two_mode_fragment(), 2, None).unwrap();
        for c in pruned.iter() {
            if let HybridConditional::Mixture(mixture) = c {
                for (assignment, _) in mixture.branches().iter() {
                    assert!(assignment.iter().all(|v| *v < 2));
                }
                assert!(mixture.branches().len() <= 2);
            }
        }
    }

    #[test]
    fn zero_leaves_is_rejected() {
        assert_eq!(
            prune(two_mode_fragment(), 0, None).unwrap_err(),
            SmootherError::InvalidMaxLeaves
        );
    }

    /// Three binary modes where exactly one is 1: (0,0,1), (0,1,0), (1,0,0).
    /// Each key alone is 0 with probability 2/3, jointly that is impossible.
    fn exactly_one_fragment() -> HybridBayesNet {
        let keys: Vec<DiscreteKey> = (0..3).map(|i| DiscreteKey::new(m(i), 2)).collect();
        let table = DiscreteTable::new(keys, vec![0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0]).unwrap();
        HybridBayesNet::new(vec![HybridConditional::Discrete(DiscreteConditional::from_joint(
            &table,
            &[m(0), m(1), m(2)],
        ))])
    }

    #[test]
    fn threshold_fixing_keeps_a_possible_assignment() {
        let (pruned, outcome) = prune(exactly_one_fragment(), 3, Some(0.6)).unwrap();
        // m0 = 0 leaves (0,1) and (1,0) for m1 and m2, neither above 0.6.
        assert_eq!(outcome.newly_fixed.len(), 1);
        assert_eq!(outcome.newly_fixed.get(&m(0)), Some(&0));
        assert_eq!(outcome.leaves_after, 2);
        assert_eq!(pruned.leaf_count().unwrap(), 2);
        let joint = pruned.discrete_joint().unwrap();
        assert_eq!(joint.nonzero_count(), 2);
    }

    #[test]
    fn thresholds_at_or_below_one_half_are_rejected() {
        for t in [0.3, 0.5, 1.5, f64::NAN] {
            assert!(matches!(
                prune(two_mode_fragment(), 4, Some(t)),
                Err(SmootherError::InvalidMarginalThreshold(_))
            ));
        }
        assert!(prune(two_mode_fragment(), 4, Some(1.0)).is_ok());
    }
}
