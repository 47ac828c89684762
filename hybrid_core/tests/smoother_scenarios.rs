// hybrid_core/tests/smoother_scenarios.rs

//! End-to-end behaviour of the incremental smoother on small hybrid chains.

use approx::assert_abs_diff_eq;
use hybrid_core::error::EliminationError;
use hybrid_core::hybrid::bayes_net::choose;
use hybrid_core::hybrid::eliminate_sequential;
use hybrid_core::ordering::constrained_ordering;
use hybrid_core::prelude::*;
use nalgebra::{DVector, Vector2};
use std::collections::BTreeSet;

// --- Helpers ---

fn scalar(v: f64) -> DVector<f64> {
    DVector::from_element(1, v)
}

fn binary(key: Key) -> DiscreteKey {
    DiscreteKey::new(key, 2)
}

/// A 1-D odometry step whose length depends on a binary mode.
fn mixture_step(from: Key, to: Key, mode: Key, deltas: [f64; 2], sigma: f64) -> HybridGaussianFactor {
    HybridGaussianFactor::new(
        vec![binary(mode)],
        deltas
            .iter()
            .map(|d| (JacobianFactor::between(from, to, scalar(*d), sigma), 0.0))
            .collect(),
    )
    .unwrap()
}

fn mode_prior(mode: Key, p0: f64) -> DiscreteTable {
    DiscreteTable::new(vec![binary(mode)], vec![p0, 1.0 - p0]).unwrap()
}

/// Prior on x0 and one ambiguous step to x1 whose modes are 0.9 / 0.1 likely.
fn ambiguous_odometry() -> HybridFactorGraph {
    let mut graph = HybridFactorGraph::new();
    graph.push(JacobianFactor::prior(x(0), scalar(0.0), 1.0));
    graph.push(mixture_step(x(0), x(1), m(0), [1.0, 2.0], 1.0));
    graph.push(mode_prior(m(0), 0.9));
    graph
}

/// Three batches over three modes, ending in an absolute fix on x3.
fn three_batches() -> Vec<HybridFactorGraph> {
    let mut first = HybridFactorGraph::new();
    first.push(JacobianFactor::prior(x(0), scalar(0.0), 1.0));
    first.push(mixture_step(x(0), x(1), m(0), [1.0, 1.5], 0.5));
    first.push(mode_prior(m(0), 0.7));

    let mut second = HybridFactorGraph::new();
    second.push(mixture_step(x(1), x(2), m(1), [1.0, 0.8], 0.5));
    second.push(mode_prior(m(1), 0.4));

    let mut third = HybridFactorGraph::new();
    third.push(mixture_step(x(2), x(3), m(2), [1.2, 0.9], 0.4));
    third.push(mode_prior(m(2), 0.55));
    third.push(JacobianFactor::prior(x(3), scalar(3.3), 0.3));

    vec![first, second, third]
}

fn point(modes: [usize; 3], xs: [f64; 4]) -> HybridEstimate {
    HybridEstimate::new(
        (0..3).map(|i| (m(i as u64), modes[i])).collect(),
        (0..4).map(|i| (x(i as u64), scalar(xs[i]))).collect(),
    )
}

// --- Scenarios ---

#[test]
fn incremental_updates_match_batch_elimination() {
    let batches = three_batches();
    let mut smoother = HybridSmoother::new(None);
    for batch in &batches {
        smoother.update(batch, None, None).unwrap();
    }

    let all: HybridFactorGraph = batches.into_iter().flatten().collect();
    let ordering = constrained_ordering(&all, &[], true);
    let batch = eliminate_sequential(&all, &ordering).unwrap();

    // Same normalized joint at arbitrary hybrid points.
    for modes in [[0, 0, 0], [1, 0, 1], [0, 1, 1], [1, 1, 0]] {
        let p = point(modes, [0.1, 1.2, 2.0, 3.1]);
        let incremental = smoother.error(&p).unwrap();
        let reference = batch.neg_log_probability(&p).unwrap();
        assert_abs_diff_eq!(incremental, reference, epsilon = 1e-8);
    }

    // Same point estimate.
    let a = smoother.optimize().unwrap();
    let b = batch.optimize().unwrap();
    assert_eq!(a.discrete, b.discrete);
    for (key, value) in &b.continuous {
        assert_abs_diff_eq!(a.continuous[key][0], value[0], epsilon = 1e-8);
    }
}

#[test]
fn ambiguous_odometry_picks_the_likely_mode() {
    let mut smoother = HybridSmoother::new(Some(0.99));
    let summary = smoother.update(&ambiguous_odometry(), None, None).unwrap();
    assert_eq!(summary.leaves_before, 2);
    assert!(summary.newly_fixed.is_empty());

    let estimate = smoother.optimize().unwrap();
    assert_eq!(estimate.discrete[&m(0)], 0);
    assert_abs_diff_eq!(estimate.continuous[&x(0)][0], 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(estimate.continuous[&x(1)][0], 1.0, epsilon = 1e-9);
}

#[test]
fn single_leaf_fixes_the_mode_for_later_updates() {
    let mut smoother = HybridSmoother::new(Some(0.99));
    let first = smoother.update(&ambiguous_odometry(), Some(1), None).unwrap();
    assert_eq!(first.leaves_after, 1);
    assert_eq!(first.newly_fixed.get(&m(0)), Some(&0));
    assert!(smoother.posterior().iter().all(|c| c.discrete_keys().is_empty()));

    // A later step that is itself keyed on m0 gets sliced at the fixed value.
    let mut next = HybridFactorGraph::new();
    next.push(mixture_step(x(1), x(2), m(0), [1.0, 5.0], 1.0));
    let second = smoother.update(&next, Some(1), None).unwrap();
    assert!(second.newly_fixed.is_empty());
    assert_eq!(second.reopened, 1);
    assert_eq!(second.eliminated, 2);

    assert_eq!(smoother.fixed_values().get(&m(0)), Some(&0));
    let estimate = smoother.optimize().unwrap();
    assert_eq!(estimate.discrete[&m(0)], 0);
    assert_abs_diff_eq!(estimate.continuous[&x(2)][0], 2.0, epsilon = 1e-9);
}

#[test]
fn discrete_keys_are_ordered_after_continuous_keys() {
    let all: HybridFactorGraph = three_batches().into_iter().flatten().collect();
    let discrete = all.discrete_keys();
    for strategy in [
        FrontierStrategy::None,
        FrontierStrategy::NewFactorKeys,
        FrontierStrategy::AllKeys,
    ] {
        let ordering = hybrid_core::smoother::compute_ordering(&all, &all, strategy);
        let first_discrete = ordering
            .iter()
            .position(|k| discrete.contains(k))
            .unwrap();
        assert!(ordering.iter().skip(first_discrete).all(|k| discrete.contains(k)));
        assert_eq!(ordering.len(), all.keys().len());
    }
}

#[test]
fn pruning_never_increases_the_hypothesis_count() {
    let mut smoother = HybridSmoother::new(None);
    let mut saw_pruning = false;
    for batch in three_batches() {
        let summary = smoother.update(&batch, Some(3), None).unwrap();
        assert!(summary.leaves_after <= summary.leaves_before);
        assert!(summary.leaves_after <= 3);
        saw_pruning |= summary.leaves_after < summary.leaves_before;
    }
    assert!(saw_pruning);
    assert!(smoother.optimize().is_ok());
}

#[test]
fn every_variable_has_one_defining_conditional() {
    let mut smoother = HybridSmoother::new(Some(0.99));
    for batch in three_batches() {
        smoother.update(&batch, Some(4), None).unwrap();

        let mut seen = BTreeSet::new();
        for conditional in smoother.posterior().iter() {
            for frontal in conditional.frontals() {
                assert!(seen.insert(frontal), "{frontal} defined twice");
            }
        }
        let indexed: BTreeSet<Key> = smoother.posterior().keys().copied().collect();
        assert_eq!(seen, indexed);
    }
}

#[test]
fn failed_update_leaves_the_posterior_untouched() {
    let mut smoother = HybridSmoother::new(None);
    let batches = three_batches();
    smoother.update(&batches[0], None, None).unwrap();
    let before: Vec<HybridConditional> = smoother.posterior().iter().cloned().collect();
    let estimate = smoother.optimize().unwrap();

    // The ordering misses most keys of the elimination graph.
    let err = smoother
        .update(&batches[1], None, Some(Ordering::new(vec![x(2)])))
        .unwrap_err();
    assert!(matches!(
        err,
        SmootherError::Elimination(EliminationError::InvalidOrdering(_))
    ));

    let after: Vec<HybridConditional> = smoother.posterior().iter().cloned().collect();
    assert_eq!(before, after);
    assert_eq!(smoother.optimize().unwrap(), estimate);

    // And the smoother is still usable.
    smoother.update(&batches[1], None, None).unwrap();
    assert!(smoother.posterior().contains(x(2)));
}

#[test]
fn selecting_a_pruned_branch_fails() {
    let mut graph = HybridFactorGraph::new();
    graph.push(JacobianFactor::prior(x(0), scalar(0.0), 0.1));
    graph.push(mixture_step(x(0), x(1), m(0), [1.0, 1.1], 1.0));
    graph.push(mixture_step(x(1), x(2), m(1), [1.0, 1.1], 1.0));
    graph.push(mode_prior(m(0), 0.8));
    graph.push(mode_prior(m(1), 0.6));

    let mut smoother = HybridSmoother::new(None);
    let summary = smoother.update(&graph, Some(3), None).unwrap();
    assert_eq!(summary.leaves_after, 3);

    let unlikely: DiscreteValues = [(m(0), 1), (m(1), 1)].into_iter().collect();
    let err = choose(smoother.posterior().iter(), &unlikely).unwrap_err();
    assert!(matches!(err, SmootherError::AbsentBranch { .. }));

    // The MPE never lands there.
    let estimate = smoother.optimize().unwrap();
    assert_eq!(estimate.discrete[&m(0)], 0);
    assert_eq!(estimate.discrete[&m(1)], 0);
}

#[test]
fn empty_batch_is_a_no_op() {
    let mut smoother = HybridSmoother::default();
    let summary = smoother.update(&HybridFactorGraph::new(), None, None).unwrap();
    assert_eq!(summary.eliminated, 0);
    assert!(smoother.posterior().is_empty());
    assert!(smoother.optimize().unwrap().continuous.is_empty());

    smoother.update(&ambiguous_odometry(), None, None).unwrap();
    let before = smoother.optimize().unwrap();
    let len = smoother.posterior().len();
    smoother.update(&HybridFactorGraph::new(), Some(2), None).unwrap();
    assert_eq!(smoother.posterior().len(), len);
    assert_eq!(smoother.optimize().unwrap(), before);
}

#[test]
fn zero_leaves_is_rejected_before_touching_the_store() {
    let mut smoother = HybridSmoother::new(None);
    assert_eq!(
        smoother.update(&ambiguous_odometry(), Some(0), None).unwrap_err(),
        SmootherError::InvalidMaxLeaves
    );
    assert!(smoother.posterior().is_empty());
}

#[test]
fn nonlinear_pose_chain_is_disambiguated_by_gps() {
    // Odometry is either one or two metres forward; a GPS fix settles it.
    let odometry_noise = DiagonalNoise::isotropic(3, 0.1);
    let mut graph = HybridNonlinearFactorGraph::new();
    graph.add(PriorFactorPose2::new(x(0), Pose2::identity(), DiagonalNoise::isotropic(3, 1e-4)));
    let steps: Vec<Box<dyn NonlinearFactor>> = [1.0, 2.0]
        .iter()
        .map(|d| {
            Box::new(BetweenFactorPose2::new(x(0), x(1), Pose2::new(*d, 0.0, 0.0), odometry_noise.clone()))
                as Box<dyn NonlinearFactor>
        })
        .collect();
    graph.push(HybridNonlinearFactor::with_noise_constants(vec![binary(m(0))], steps).unwrap());
    graph.add(GpsFactor::new(x(1), Vector2::new(2.0, 0.0), DiagonalNoise::isotropic(2, 0.1)));

    let mut initial = Values::new();
    initial.insert(x(0), Pose2::identity());
    initial.insert(x(1), Pose2::new(1.5, 0.1, 0.05));

    let mut smoother = HybridSmoother::new(Some(0.99));
    let linear = graph.linearize(&initial).unwrap();
    let summary = smoother.update(&linear, Some(10), None).unwrap();
    assert_eq!(summary.newly_fixed.get(&m(0)), Some(&1));

    let estimate = smoother.optimize().unwrap();
    let result = initial.retract(&estimate.continuous);
    let x1 = result.at(x(1)).unwrap();
    assert_abs_diff_eq!(x1.x, 2.0, epsilon = 2e-2);
    assert_abs_diff_eq!(x1.y, 0.0, epsilon = 2e-2);
}

#[test]
fn threshold_at_one_half_or_below_is_rejected_before_touching_the_store() {
    let mut smoother = HybridSmoother::new(Some(0.3));
    assert_eq!(
        smoother.update(&ambiguous_odometry(), Some(4), None).unwrap_err(),
        SmootherError::InvalidMarginalThreshold(0.3)
    );
    assert!(smoother.posterior().is_empty());
    assert!(smoother.fixed_values().is_empty());
}

#[test]
fn threshold_fixing_never_selects_an_impossible_assignment() {
    // Exactly one of three modes is active; alone, each is off with 2/3.
    let modes: Vec<DiscreteKey> = (0..3).map(|i| binary(m(i))).collect();
    let mut graph = HybridFactorGraph::new();
    graph.push(JacobianFactor::prior(x(0), scalar(0.0), 1.0));
    graph.push(DiscreteTable::new(modes, vec![0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0]).unwrap());

    let mut smoother = HybridSmoother::new(Some(0.6));
    let summary = smoother.update(&graph, Some(4), None).unwrap();
    assert_eq!(summary.newly_fixed.get(&m(0)), Some(&0));
    assert_eq!(summary.leaves_after, 2);

    let estimate = smoother.optimize().unwrap();
    let active: usize = (0..3).map(|i| estimate.discrete[&m(i)]).sum();
    assert_eq!(active, 1);
    assert!(smoother.error(&estimate).is_some_and(f64::is_finite));
}
