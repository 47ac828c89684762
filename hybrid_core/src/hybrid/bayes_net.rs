// hybrid_core/src/hybrid/bayes_net.rs

use super::conditional::HybridConditional;
use crate::discrete::{ArgmaxTable, Assignment, DiscreteTable, Reduce};
use crate::error::{SmootherError, TableError};
use crate::linear::GaussianBayesNet;
use crate::types::{format_keys, DiscreteValues, HybridEstimate, Key};

/// Conditionals in elimination order: children first, roots last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridBayesNet {
    conditionals: Vec<HybridConditional>,
}

impl HybridBayesNet {
    pub fn new(conditionals: Vec<HybridConditional>) -> Self {
        Self { conditionals }
    }

    pub fn push(&mut self, conditional: HybridConditional) {
        self.conditionals.push(conditional);
    }

    pub fn len(&self) -> usize {
        self.conditionals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditionals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HybridConditional> {
        self.conditionals.iter()
    }

    /// Product of all discrete conditionals.
    pub fn discrete_joint(&self) -> Result<DiscreteTable, TableError> {
        discrete_joint(self.iter())
    }

    /// Number of discrete assignments with non-zero probability.
    pub fn leaf_count(&self) -> Result<usize, TableError> {
        Ok(self.discrete_joint()?.nonzero_count())
    }

    pub fn mpe(&self) -> Result<DiscreteValues, SmootherError> {
        mpe(self.iter(), &DiscreteValues::new())
    }

    pub fn choose(&self, assignment: &DiscreteValues) -> Result<GaussianBayesNet, SmootherError> {
        choose(self.iter(), assignment)
    }

    /// MPE of the discrete part followed by back-substitution of the chosen
    /// Gaussian branches.
    pub fn optimize(&self) -> Result<HybridEstimate, SmootherError> {
        let discrete = self.mpe()?;
        let continuous = self.choose(&discrete)?.optimize()?;
        Ok(HybridEstimate::new(discrete, continuous))
    }

    pub fn neg_log_probability(&self, estimate: &HybridEstimate) -> Option<f64> {
        neg_log_probability(self.iter(), estimate)
    }
}

impl IntoIterator for HybridBayesNet {
    type Item = HybridConditional;
    type IntoIter = std::vec::IntoIter<HybridConditional>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditionals.into_iter()
    }
}

/// Product of the discrete conditionals among `conditionals`. With none, the
/// result is the scalar table `1`.
pub fn discrete_joint<'a>(
    conditionals: impl IntoIterator<Item = &'a HybridConditional>,
) -> Result<DiscreteTable, TableError> {
    let mut joint = DiscreteTable::uniform(Vec::new());
    for conditional in conditionals {
        if let HybridConditional::Discrete(c) = conditional {
            joint = joint.product(c.table())?;
        }
    }
    Ok(joint)
}

/// One max-product step: which keys it eliminated, the keys it left behind
/// and the maximizing values for every assignment of those.
struct MaxStep {
    eliminated: Vec<Key>,
    rest: Vec<Key>,
    argmax: ArgmaxTable,
}

/// Exact most probable assignment of the discrete conditionals in
/// `conditionals`, given values that are already fixed.
///
/// Conditionals are visited in order (children first), so each visit
/// maximizes its frontals out of everything gathered so far; a backward pass
/// then reads the maximizers off from the roots down. Fixed values are
/// merged into the result.
pub fn mpe<'a>(
    conditionals: impl IntoIterator<Item = &'a HybridConditional>,
    fixed: &DiscreteValues,
) -> Result<DiscreteValues, SmootherError> {
    let mut pool: Vec<DiscreteTable> = Vec::new();
    let mut steps = Vec::new();
    for conditional in conditionals {
        let HybridConditional::Discrete(c) = conditional else {
            continue;
        };
        let c = c.restrict(fixed);
        if c.frontals().is_empty() {
            continue;
        }
        let mut product = c.table().clone();
        let mut kept = Vec::with_capacity(pool.len());
        for table in pool {
            if c.frontals().iter().any(|k| table.contains_key(*k)) {
                product = product.product(&table)?;
            } else {
                kept.push(table);
            }
        }
        pool = kept;

        let eliminated: Vec<Key> = product
            .key_ids()
            .into_iter()
            .filter(|k| c.frontals().contains(k))
            .collect();
        let (reduced, argmax) = product.marginalize(c.frontals(), Reduce::Max);
        if reduced.nonzero_count() == 0 {
            return Err(SmootherError::Invariant(format!(
                "no assignment of {} has non-zero probability",
                format_keys(c.frontals())
            )));
        }
        let rest = reduced.key_ids();
        if !rest.is_empty() {
            pool.push(reduced.scaled_to_max());
        }
        steps.push(MaxStep {
            eliminated,
            rest,
            argmax,
        });
    }
    if let Some(table) = pool.first() {
        return Err(SmootherError::Invariant(format!(
            "discrete keys {} have no defining conditional",
            format_keys(&table.key_ids())
        )));
    }

    let mut assignment = fixed.clone();
    for step in steps.iter().rev() {
        let rest: Assignment = step
            .rest
            .iter()
            .map(|k| {
                assignment.get(k).copied().ok_or_else(|| {
                    SmootherError::Invariant(format!("{k} is assigned after its child"))
                })
            })
            .collect::<Result<_, _>>()?;
        let best = step.argmax.get(&rest).ok_or_else(|| {
            SmootherError::Invariant(format!(
                "no feasible value for {} given {}",
                format_keys(&step.eliminated),
                format_keys(&step.rest)
            ))
        })?;
        assignment.extend(step.eliminated.iter().copied().zip(best.iter().copied()));
    }
    Ok(assignment)
}

/// Selects one Gaussian branch per conditional under a full discrete
/// assignment; discrete conditionals are skipped.
pub fn choose<'a>(
    conditionals: impl IntoIterator<Item = &'a HybridConditional>,
    assignment: &DiscreteValues,
) -> Result<GaussianBayesNet, SmootherError> {
    let mut net = GaussianBayesNet::default();
    for conditional in conditionals {
        match conditional {
            HybridConditional::Discrete(_) => {}
            HybridConditional::Continuous(g) => net.push(g.clone()),
            HybridConditional::Mixture(c) => match c.select(assignment) {
                Ok(Some(g)) => net.push(g.clone()),
                Ok(None) => return Err(SmootherError::AbsentBranch { key: c.frontal() }),
                Err(missing) => {
                    return Err(SmootherError::Invariant(format!(
                        "discrete parent {missing} of {} is unassigned",
                        c.frontal()
                    )))
                }
            },
        }
    }
    Ok(net)
}

/// Sum of `−log p` over the conditionals at a joint estimate.
pub fn neg_log_probability<'a>(
    conditionals: impl IntoIterator<Item = &'a HybridConditional>,
    estimate: &HybridEstimate,
) -> Option<f64> {
    conditionals
        .into_iter()
        .map(|c| c.neg_log_probability(estimate))
        .sum()
}
