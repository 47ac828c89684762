// hybrid_core/src/smoother/estimate.rs

use super::store::BeliefStore;
use crate::error::SmootherError;
use crate::hybrid::bayes_net::{choose, mpe, neg_log_probability};
use crate::types::{DiscreteValues, HybridEstimate};

/// Joint point estimate of the whole store: the exact most probable discrete
/// assignment (fixed values included), then the continuous solution of the
/// Gaussian branches it selects.
pub fn extract(store: &BeliefStore, fixed: &DiscreteValues) -> Result<HybridEstimate, SmootherError> {
    let discrete = mpe(store.iter(), fixed)?;
    let continuous = choose(store.iter(), &discrete)?.optimize()?;
    Ok(HybridEstimate::new(discrete, continuous))
}

/// `−log` of the stored posterior at `estimate`. Fixed discrete keys are
/// filled in from `fixed` when the estimate omits them.
pub fn neg_log_posterior(store: &BeliefStore, fixed: &DiscreteValues, estimate: &HybridEstimate) -> Option<f64> {
    if fixed.keys().all(|k| estimate.discrete.contains_key(k)) {
        return neg_log_probability(store.iter(), estimate);
    }
    let mut completed = estimate.clone();
    for (key, value) in fixed {
        completed.discrete.entry(*key).or_insert(*value);
    }
    neg_log_probability(store.iter(), &completed)
}
