// hybrid_core/src/smoother/mod.rs

//! The incremental hybrid smoother.
//!
//! Each [`HybridSmoother::update`] folds a batch of new factors into the
//! stored posterior: the batch is sliced at the already fixed discrete
//! values, the stored conditionals it touches are reopened, the resulting
//! graph is eliminated discrete-last, the new fragment is optionally pruned
//! and finally appended. [`HybridSmoother::optimize`] can run between
//! updates.

pub mod carry_forward;
pub mod estimate;
pub mod policy;
pub mod store;

pub use carry_forward::{reopen, Carried};
pub use policy::{compute_ordering, FrontierStrategy};
pub use store::{BeliefStore, Removed, Slot};

use crate::error::SmootherError;
use crate::hybrid::{eliminate_sequential, prune, HybridBayesNet, HybridFactorGraph, PruneOutcome};
use crate::ordering::Ordering;
use crate::types::{DiscreteValues, HybridEstimate};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tuning knobs of the smoother.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmootherParams {
    /// A discrete key whose most likely value has more marginal mass than
    /// this after pruning is fixed. `None` only fixes fully decided keys.
    /// Must lie in `(0.5, 1]`.
    pub marginal_threshold: Option<f64>,
    pub frontier: FrontierStrategy,
}

impl Default for SmootherParams {
    fn default() -> Self {
        Self {
            marginal_threshold: Some(0.99),
            frontier: FrontierStrategy::None,
        }
    }
}

impl SmootherParams {
    pub fn validate(&self) -> Result<(), SmootherError> {
        validate_marginal_threshold(self.marginal_threshold)
    }
}

/// Below one half, two values of the same key could both pass.
pub(crate) fn validate_marginal_threshold(threshold: Option<f64>) -> Result<(), SmootherError> {
    match threshold {
        Some(t) if !(t > 0.5 && t <= 1.0) => Err(SmootherError::InvalidMarginalThreshold(t)),
        _ => Ok(()),
    }
}

/// What one update did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSummary {
    /// Conditionals taken back out of the store.
    pub reopened: usize,
    /// Variables eliminated into the new fragment.
    pub eliminated: usize,
    /// Conditionals appended to the store.
    pub fragment_len: usize,
    pub leaves_before: usize,
    pub leaves_after: usize,
    pub newly_fixed: DiscreteValues,
}

#[derive(Debug, Clone, Default)]
pub struct HybridSmoother {
    params: SmootherParams,
    store: BeliefStore,
    fixed: DiscreteValues,
}

impl HybridSmoother {
    /// An empty smoother with the given fixing threshold.
    pub fn new(marginal_threshold: Option<f64>) -> Self {
        Self::with_params(SmootherParams {
            marginal_threshold,
            ..SmootherParams::default()
        })
    }

    pub fn with_params(params: SmootherParams) -> Self {
        Self {
            params,
            store: BeliefStore::new(),
            fixed: DiscreteValues::new(),
        }
    }

    pub fn params(&self) -> &SmootherParams {
        &self.params
    }

    /// The accumulated posterior.
    pub fn posterior(&self) -> &BeliefStore {
        &self.store
    }

    /// Discrete keys decided so far. Entries are never changed or removed.
    pub fn fixed_values(&self) -> &DiscreteValues {
        &self.fixed
    }

    /// Folds `new_factors` into the posterior.
    ///
    /// With `max_leaves` set, the new fragment keeps at most that many
    /// discrete hypotheses. A caller-supplied `ordering` must cover exactly
    /// the keys of the elimination graph. On error the store and the fixed
    /// values are left as they were.
    pub fn update(
        &mut self,
        new_factors: &HybridFactorGraph,
        max_leaves: Option<usize>,
        ordering: Option<Ordering>,
    ) -> Result<UpdateSummary, SmootherError> {
        if max_leaves == Some(0) {
            return Err(SmootherError::InvalidMaxLeaves);
        }
        self.params.validate()?;

        // 1. Slice the batch at the values decided by earlier updates.
        let batch = new_factors.clone().restrict(&self.fixed)?;

        // 2. Reopen the stored conditionals the batch touches.
        let carried = reopen(&batch, &mut self.store, &self.fixed)?;
        let reopened = carried.reopened();

        // 3-5. Eliminate and prune; roll the store back on failure.
        let ordering = ordering.unwrap_or_else(|| compute_ordering(&carried.graph, &batch, self.params.frontier));
        match self.eliminate_and_prune(&carried.graph, &ordering, max_leaves) {
            Ok((fragment, mut summary)) => {
                // The batch and every reopened conditional were sliced at the
                // fixed values, so the fragment cannot mention a fixed key.
                debug_assert!(
                    summary.newly_fixed.keys().all(|k| !self.fixed.contains_key(k)),
                    "pruning fixed an already fixed key"
                );
                summary.reopened = reopened;
                summary.fragment_len = fragment.len();
                if let Err(e) = self.store.append(fragment, &self.fixed) {
                    self.store.restore(carried.removed)?;
                    return Err(e);
                }
                self.fixed
                    .extend(summary.newly_fixed.iter().map(|(k, v)| (*k, *v)));
                self.store.compact_if_sparse();

                debug!(
                    reopened = summary.reopened,
                    eliminated = summary.eliminated,
                    fragment = summary.fragment_len,
                    leaves_before = summary.leaves_before,
                    leaves_after = summary.leaves_after,
                    newly_fixed = summary.newly_fixed.len(),
                    store = self.store.len(),
                    "smoother update"
                );
                Ok(summary)
            }
            Err(e) => {
                self.store.restore(carried.removed)?;
                Err(e)
            }
        }
    }

    /// Exact MPE discrete assignment and the continuous solution it selects.
    pub fn optimize(&self) -> Result<HybridEstimate, SmootherError> {
        estimate::extract(&self.store, &self.fixed)
    }

    /// `−log p` of the stored posterior at a hybrid point.
    pub fn error(&self, estimate: &HybridEstimate) -> Option<f64> {
        estimate::neg_log_posterior(&self.store, &self.fixed, estimate)
    }

    // --- Private Helper Methods ---

    fn eliminate_and_prune(
        &self,
        graph: &HybridFactorGraph,
        ordering: &Ordering,
        max_leaves: Option<usize>,
    ) -> Result<(HybridBayesNet, UpdateSummary), SmootherError> {
        let fragment = eliminate_sequential(graph, ordering)?;
        let eliminated = ordering.len();
        let (fragment, outcome) = match max_leaves {
            Some(max_leaves) => prune(fragment, max_leaves, self.params.marginal_threshold)?,
            None => {
                let leaves = fragment.leaf_count()?;
                let outcome = PruneOutcome {
                    leaves_before: leaves,
                    leaves_after: leaves,
                    newly_fixed: DiscreteValues::new(),
                };
                (fragment, outcome)
            }
        };
        Ok((
            fragment,
            UpdateSummary {
                eliminated,
                leaves_before: outcome.leaves_before,
                leaves_after: outcome.leaves_after,
                newly_fixed: outcome.newly_fixed,
                ..UpdateSummary::default()
            },
        ))
    }
}
