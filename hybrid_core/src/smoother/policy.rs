// hybrid_core/src/smoother/policy.rs

use crate::hybrid::HybridFactorGraph;
use crate::ordering::{constrained_ordering, Ordering};
use crate::types::Key;
use serde::{Deserialize, Serialize};

/// Which continuous keys are held back to the end of the continuous block.
///
/// Holding back the keys the new batch touched keeps them near the roots of
/// the fragment, so the next batch (which usually touches the same frontier)
/// reopens less. The cost is more fill while eliminating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontierStrategy {
    /// Plain minimum degree over all continuous keys.
    #[default]
    None,
    /// Continuous keys of the new batch go last among continuous keys.
    NewFactorKeys,
    /// Every continuous key is constrained, which is plain minimum degree again.
    AllKeys,
}

/// Elimination order for `graph`: continuous keys (the frontier group per
/// `frontier` last) followed by all discrete keys.
pub fn compute_ordering(
    graph: &HybridFactorGraph,
    new_factors: &HybridFactorGraph,
    frontier: FrontierStrategy,
) -> Ordering {
    let last: Vec<Key> = match frontier {
        FrontierStrategy::None => Vec::new(),
        FrontierStrategy::NewFactorKeys => new_factors.continuous_keys().into_iter().collect(),
        FrontierStrategy::AllKeys => graph.continuous_keys().into_iter().collect(),
    };
    constrained_ordering(graph, &last, true)
}
