// hybrid_core/src/hybrid/elimination.rs

//! Sequential variable elimination of a hybrid factor graph.
//!
//! Eliminating a continuous key gathers every factor that touches it, joins
//! the discrete branches of the mixtures among them and runs one dense QR per
//! present branch. Eliminating a discrete key multiplies the gathered tables
//! and sums the key out. The resulting conditionals are returned in
//! elimination order, so roots come last.

use super::bayes_net::HybridBayesNet;
use super::conditional::{HybridConditional, HybridGaussianConditional};
use super::factor::{HybridFactor, HybridGaussianFactor};
use super::graph::HybridFactorGraph;
use crate::discrete::{Branches, DiscreteConditional, DiscreteTable, Reduce};
use crate::error::EliminationError;
use crate::linear::{GaussianConditional, JacobianFactor};
use crate::ordering::Ordering;
use crate::types::{format_keys, Key};
use nalgebra::{DMatrix, DVector};
use std::collections::{BTreeMap, BTreeSet};

/// Pivots smaller than this make `R` singular.
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Eliminates every variable of `graph` in `ordering`.
pub fn eliminate_sequential(
    graph: &HybridFactorGraph,
    ordering: &Ordering,
) -> Result<HybridBayesNet, EliminationError> {
    validate_ordering(graph, ordering)?;
    let dims = variable_dims(graph)?;
    let discrete = graph.discrete_keys();

    let mut pool: Vec<HybridFactor> = graph.iter().cloned().collect();
    let mut net = HybridBayesNet::default();
    for &key in ordering {
        let (involved, rest): (Vec<_>, Vec<_>) = pool.into_iter().partition(|f| f.involves(key));
        pool = rest;
        if involved.is_empty() {
            return Err(EliminationError::NoFactors(key));
        }
        let (conditional, marginal) = if discrete.contains(&key) {
            eliminate_discrete(key, involved)?
        } else {
            eliminate_continuous(key, involved, &dims)?
        };
        net.push(conditional);
        pool.extend(marginal);
    }
    Ok(net)
}

fn validate_ordering(graph: &HybridFactorGraph, ordering: &Ordering) -> Result<(), EliminationError> {
    let keys = graph.keys();
    let mut seen = BTreeSet::new();
    for key in ordering {
        if !seen.insert(*key) {
            return Err(EliminationError::InvalidOrdering(format!("{key} appears twice")));
        }
    }
    let missing: Vec<Key> = keys.difference(&seen).copied().collect();
    if !missing.is_empty() {
        return Err(EliminationError::InvalidOrdering(format!(
            "missing {}",
            format_keys(&missing)
        )));
    }
    let extra: Vec<Key> = seen.difference(&keys).copied().collect();
    if !extra.is_empty() {
        return Err(EliminationError::InvalidOrdering(format!(
            "{} are not in the graph",
            format_keys(&extra)
        )));
    }
    Ok(())
}

/// Dimension of every continuous variable, checked for consistency across
/// factors and mixture components.
fn variable_dims(graph: &HybridFactorGraph) -> Result<BTreeMap<Key, usize>, EliminationError> {
    let mut dims = BTreeMap::new();
    let mut record = |factor: &JacobianFactor| -> Result<(), EliminationError> {
        for (key, block) in factor.terms() {
            let dim = block.ncols();
            match dims.get(&key) {
                Some(&first) if first != dim => {
                    return Err(EliminationError::DimensionMismatch {
                        key,
                        first,
                        second: dim,
                    })
                }
                Some(_) => {}
                None => {
                    dims.insert(key, dim);
                }
            }
        }
        Ok(())
    };
    for factor in graph {
        match factor {
            HybridFactor::Continuous(f) => record(f)?,
            HybridFactor::Mixture(f) => {
                for (component, _) in f.components().values() {
                    record(component)?;
                }
            }
            HybridFactor::Discrete(_) => {}
        }
    }
    Ok(dims)
}

type Eliminated = (HybridConditional, Option<HybridFactor>);

fn eliminate_discrete(key: Key, involved: Vec<HybridFactor>) -> Result<Eliminated, EliminationError> {
    let mut joint = DiscreteTable::uniform(Vec::new());
    for factor in involved {
        match factor {
            HybridFactor::Discrete(table) => joint = joint.product(&table)?,
            HybridFactor::Continuous(_) | HybridFactor::Mixture(_) => {
                return Err(EliminationError::DiscreteBeforeContinuous(key))
            }
        }
    }
    let (marginal, _) = joint.marginalize(&[key], Reduce::Sum);
    if marginal.nonzero_count() == 0 {
        return Err(EliminationError::AllBranchesAbsent(key));
    }
    let conditional = DiscreteConditional::from_joint(&joint, &[key]);
    let marginal = (!marginal.keys().is_empty()).then(|| HybridFactor::Discrete(marginal.scaled_to_max()));
    Ok((HybridConditional::Discrete(conditional), marginal))
}

/// One branch of a continuous elimination.
struct DenseResult {
    conditional: GaussianConditional,
    remaining: Option<JacobianFactor>,
    residual: f64,
}

fn eliminate_continuous(
    key: Key,
    involved: Vec<HybridFactor>,
    dims: &BTreeMap<Key, usize>,
) -> Result<Eliminated, EliminationError> {
    let separator: Vec<Key> = involved
        .iter()
        .flat_map(|f| f.continuous_keys())
        .filter(|k| *k != key)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut plain: Vec<&JacobianFactor> = Vec::new();
    let mut joined: Branches<(Vec<&JacobianFactor>, f64)> = Branches::single((Vec::new(), 0.0));
    for factor in &involved {
        match factor {
            HybridFactor::Continuous(f) => plain.push(f),
            HybridFactor::Mixture(mixture) => {
                joined = joined.join(mixture.components(), |(factors, scalar), (component, extra)| {
                    let mut factors = factors.clone();
                    factors.push(component);
                    Some((factors, scalar + extra))
                })?;
            }
            // Tables never mention a continuous key.
            HybridFactor::Discrete(_) => {}
        }
    }
    if joined.is_empty() {
        return Err(EliminationError::AllBranchesAbsent(key));
    }

    let mut results: Branches<(DenseResult, f64)> = Branches::new(joined.keys().to_vec());
    for (assignment, (factors, scalar)) in joined.iter() {
        let dense = eliminate_dense(key, plain.iter().chain(factors.iter()).copied(), &separator, dims)?;
        results.insert(assignment.clone(), (dense, *scalar))?;
    }

    if results.keys().is_empty() {
        let (_, (dense, _)) = results
            .into_entries()
            .next()
            .ok_or(EliminationError::AllBranchesAbsent(key))?;
        let marginal = dense.remaining.map(HybridFactor::Continuous);
        return Ok((HybridConditional::Continuous(dense.conditional), marginal));
    }

    let discrete_keys = results.keys().to_vec();
    let mut conditionals = Branches::new(discrete_keys.clone());
    let mut factors = Branches::new(discrete_keys.clone());
    let mut scalars = Branches::new(discrete_keys);
    for (assignment, (dense, scalar)) in results.into_entries() {
        let total = scalar + dense.residual - dense.conditional.neg_log_constant();
        if let Some(remaining) = dense.remaining {
            factors.insert(assignment.clone(), (remaining, total))?;
        }
        scalars.insert(assignment.clone(), total)?;
        conditionals.insert(assignment, dense.conditional)?;
    }

    let conditional = HybridGaussianConditional::new(key, separator.clone(), conditionals);
    let marginal = if separator.is_empty() {
        // Nothing continuous is left: the branch scalars become a table.
        let min = scalars.values().copied().fold(f64::INFINITY, f64::min);
        HybridFactor::Discrete(DiscreteTable::from_branches(
            scalars.map(|_, s| Some((min - s).exp())),
        ))
    } else {
        HybridFactor::Mixture(HybridGaussianFactor::from_branches(factors))
    };
    Ok((HybridConditional::Mixture(conditional), Some(marginal)))
}

/// Stacks `[A_key | A_separator | b]`, triangularizes it, and splits the
/// result into the conditional on `key` and the factor left on the separator.
fn eliminate_dense<'a>(
    key: Key,
    factors: impl Iterator<Item = &'a JacobianFactor>,
    separator: &[Key],
    dims: &BTreeMap<Key, usize>,
) -> Result<DenseResult, EliminationError> {
    let factors: Vec<&JacobianFactor> = factors.collect();
    let n = dims.get(&key).copied().ok_or(EliminationError::NoFactors(key))?;

    let mut offsets = BTreeMap::new();
    offsets.insert(key, 0);
    let mut cols = n;
    for sep in separator {
        offsets.insert(*sep, cols);
        cols += dims.get(sep).copied().unwrap_or(0);
    }

    let rows: usize = factors.iter().map(|f| f.rows()).sum();
    if rows < n {
        return Err(EliminationError::Indeterminant(key));
    }

    let mut ab = DMatrix::<f64>::zeros(rows, cols + 1);
    let mut row = 0;
    for factor in &factors {
        let m = factor.rows();
        for (k, block) in factor.terms() {
            let offset = offsets[&k];
            ab.view_mut((row, offset), (m, block.ncols())).copy_from(block);
        }
        ab.view_mut((row, cols), (m, 1)).copy_from(factor.rhs());
        row += m;
    }

    let r = ab.qr().r();
    if (0..n).any(|i| r[(i, i)].abs() < PIVOT_TOLERANCE) {
        return Err(EliminationError::Indeterminant(key));
    }

    let rhs_column = |range: std::ops::Range<usize>| DVector::from_iterator(range.len(), range.map(|i| r[(i, cols)]));
    let parents = separator
        .iter()
        .map(|sep| {
            let dim = dims.get(sep).copied().unwrap_or(0);
            (*sep, r.view((0, offsets[sep]), (n, dim)).into_owned())
        })
        .collect();
    let conditional = GaussianConditional::new(
        key,
        r.view((0, 0), (n, n)).into_owned(),
        parents,
        rhs_column(0..n),
    );

    let left = r.nrows() - n;
    if separator.is_empty() {
        let tail = rhs_column(n..r.nrows());
        return Ok(DenseResult {
            conditional,
            remaining: None,
            residual: 0.5 * tail.norm_squared(),
        });
    }
    let terms = separator
        .iter()
        .map(|sep| {
            let dim = dims.get(sep).copied().unwrap_or(0);
            (*sep, r.view((n, offsets[sep]), (left, dim)).into_owned())
        })
        .collect();
    Ok(DenseResult {
        conditional,
        remaining: Some(JacobianFactor::new(terms, rhs_column(n..r.nrows()))),
        residual: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{m, x, DiscreteKey, VectorValues};
    use approx::assert_abs_diff_eq;

    fn scalar(v: f64) -> DVector<f64> {
        DVector::from_element(1, v)
    }

    #[test]
    fn continuous_chain_solves_exactly() {
        let mut graph = HybridFactorGraph::new();
        graph.push(JacobianFactor::prior(x(0), scalar(1.0), 0.1));
        graph.push(JacobianFactor::between(x(0), x(1), scalar(2.0), 0.1));
        let net = eliminate_sequential(&graph, &Ordering::new(vec![x(0), x(1)])).unwrap();
        assert_eq!(net.len(), 2);

        let estimate = net.optimize().unwrap();
        assert_abs_diff_eq!(estimate.continuous[&x(0)][0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(estimate.continuous[&x(1)][0], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn ordering_must_cover_the_graph() {
        let mut graph = HybridFactorGraph::new();
        graph.push(JacobianFactor::prior(x(0), scalar(0.0), 1.0));
        let err = eliminate_sequential(&graph, &Ordering::new(vec![])).unwrap_err();
        assert!(matches!(err, EliminationError::InvalidOrdering(_)));
        let err = eliminate_sequential(&graph, &Ordering::new(vec![x(0), x(0)])).unwrap_err();
        assert!(matches!(err, EliminationError::InvalidOrdering(_)));
        let err = eliminate_sequential(&graph, &Ordering::new(vec![x(0), x(1)])).unwrap_err();
        assert!(matches!(err, EliminationError::InvalidOrdering(_)));
    }

    #[test]
    fn underdetermined_variable_is_indeterminant() {
        let mut graph = HybridFactorGraph::new();
        graph.push(JacobianFactor::new(
            vec![(x(0), DMatrix::identity(1, 2))],
            scalar(0.0),
        ));
        let err = eliminate_sequential(&graph, &Ordering::new(vec![x(0)])).unwrap_err();
        assert_eq!(err, EliminationError::Indeterminant(x(0)));
    }

    #[test]
    fn conflicting_dimensions_are_rejected() {
        let mut graph = HybridFactorGraph::new();
        graph.push(JacobianFactor::prior(x(0), scalar(0.0), 1.0));
        graph.push(JacobianFactor::prior(x(0), DVector::zeros(2), 1.0));
        let err = eliminate_sequential(&graph, &Ordering::new(vec![x(0)])).unwrap_err();
        assert!(matches!(err, EliminationError::DimensionMismatch { .. }));
    }

    #[test]
    fn discrete_key_before_its_mixture_fails() {
        let mode = DiscreteKey::new(m(0), 2);
        let mut graph = HybridFactorGraph::new();
        graph.push(JacobianFactor::prior(x(0), scalar(0.0), 1.0));
        graph.push(
            HybridGaussianFactor::new(
                vec![mode],
                vec![
                    (JacobianFactor::prior(x(0), scalar(0.0), 1.0), 0.0),
                    (JacobianFactor::prior(x(0), scalar(1.0), 1.0), 0.0),
                ],
            )
            .unwrap(),
        );
        let err = eliminate_sequential(&graph, &Ordering::new(vec![m(0), x(0)])).unwrap_err();
        assert_eq!(err, EliminationError::DiscreteBeforeContinuous(m(0)));
    }

    #[test]
    fn mixture_posterior_prefers_the_consistent_mode() {
        // x0 is pinned at 0; mode 0 says x1 = 1, mode 1 says x1 = 10 with a
        // prior on x1 near 1, so mode 0 should win.
        let mode = DiscreteKey::new(m(0), 2);
        let mut graph = HybridFactorGraph::new();
        graph.push(JacobianFactor::prior(x(0), scalar(0.0), 0.01));
        graph.push(JacobianFactor::prior(x(1), scalar(1.0), 0.5));
        graph.push(
            HybridGaussianFactor::new(
                vec![mode],
                vec![
                    (JacobianFactor::between(x(0), x(1), scalar(1.0), 0.5), 0.0),
                    (JacobianFactor::between(x(0), x(1), scalar(10.0), 0.5), 0.0),
                ],
            )
            .unwrap(),
        );
        graph.push(DiscreteTable::new(vec![mode], vec![0.5, 0.5]).unwrap());

        let net = eliminate_sequential(&graph, &Ordering::new(vec![x(0), x(1), m(0)])).unwrap();
        let estimate = net.optimize().unwrap();
        assert_eq!(estimate.discrete[&m(0)], 0);
        assert_abs_diff_eq!(estimate.continuous[&x(1)][0], 1.0, epsilon = 1e-6);

        let joint = net.discrete_joint().unwrap();
        assert!(joint.get(&[0]) > 0.99);
    }

    #[test]
    fn zero_row_marginals_are_kept() {
        // Eliminating x0 from a single between factor leaves no rows on x1.
        let mut graph = HybridFactorGraph::new();
        graph.push(JacobianFactor::between(x(0), x(1), scalar(1.0), 1.0));
        graph.push(JacobianFactor::prior(x(1), scalar(2.0), 1.0));
        let net = eliminate_sequential(&graph, &Ordering::new(vec![x(0), x(1)])).unwrap();
        let values: VectorValues = net.optimize().unwrap().continuous;
        assert_abs_diff_eq!(values[&x(1)][0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(values[&x(0)][0], 1.0, epsilon = 1e-9);
    }
}
