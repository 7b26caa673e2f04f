//! Honest pruning
//!
//! Routes a held-out sample set through a fitted tree and rebuilds the tree
//! with statistics computed on the held-out samples only. Split projections,
//! thresholds and missing value routing are copied from the source tree and
//! never re-decided. Source subtrees whose held-out range is too small are
//! collapsed into a leaf.
use crate::constants::TREE_UNDEFINED;
use crate::criterion::CriterionKind;
use crate::data::Matrix;
use crate::errors::ObliqueTreeError;
use crate::splitter::{partition_by_rule, SplitRule};
use crate::tree::Tree;
use crate::utils::{
    normalize_row, validate_class_labels, validate_length, validate_min_usize_parameter, validate_sample_weight,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Value given to a leaf that receives no held-out samples.
///
/// Empty leaves carry no weight, so their value is a distribution over the
/// classes rather than a weighted count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HonestPrior {
    /// The empirical class distribution of the whole held-out sample, its
    /// weighted class counts normalised to sum to one. Regression uses the
    /// weighted held-out mean. The structure-fit value of the node is not
    /// used.
    #[default]
    Empirical,
    /// Equal mass on every class. Regression falls back to the held-out mean.
    Uniform,
    /// Leave the value missing (NaN).
    Ignore,
}

fn default_honest_min_samples_split() -> usize {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HonestConfig {
    /// Held-out samples a source split needs to be kept.
    #[serde(default = "default_honest_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default)]
    pub prior: HonestPrior,
}

impl Default for HonestConfig {
    fn default() -> Self {
        HonestConfig {
            min_samples_split: default_honest_min_samples_split(),
            prior: HonestPrior::Empirical,
        }
    }
}

impl HonestConfig {
    pub fn validate(&self) -> Result<(), ObliqueTreeError> {
        validate_min_usize_parameter(self.min_samples_split, 1, "honest min_samples_split")
    }
}

/// A source node still to be visited, with the held-out range assigned to it.
#[derive(Debug, Clone, Copy)]
struct PruningRecord {
    node_idx: usize,
    parent: usize,
    is_left: bool,
    start: usize,
    end: usize,
    depth: usize,
}

/// Outcome of visiting one pruning record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PruneState {
    /// The node keeps its split and its children are visited next.
    Descend,
    /// The node became a leaf of the output tree.
    Leaf,
}

/// Rebuild `tree` with statistics from the held-out samples.
///
/// Returns a new tree in preorder. Every source node reachable through a kept
/// split produces exactly one output node, so the weighted sample count of the
/// output leaves sums to the total held-out weight.
pub fn honest_prune(
    tree: &Tree,
    data: &Matrix<f64>,
    y: &[f64],
    sample_weight: Option<&[f64]>,
    criterion: CriterionKind,
    cfg: &HonestConfig,
) -> Result<Tree, ObliqueTreeError> {
    cfg.validate()?;
    if tree.node_count() == 0 {
        return Err(ObliqueTreeError::NotFitted);
    }
    if data.cols != tree.n_features {
        return Err(ObliqueTreeError::FeatureMismatch(tree.n_features, data.cols));
    }
    validate_length("y", data.rows, y.len())?;
    let weighted_n_samples = validate_sample_weight(sample_weight, data.rows)?;
    if criterion.is_classification() {
        validate_class_labels(y, tree.n_values)?;
    }

    let mut samples: Vec<usize> = match sample_weight {
        Some(w) => (0..data.rows).filter(|i| w[*i] > 0.0).collect(),
        None => (0..data.rows).collect(),
    };
    let mut crit = criterion.build(y, sample_weight, tree.n_values, weighted_n_samples);
    let mut out = Tree::new(tree.n_features, tree.n_values);
    let mut value = vec![0.0; tree.n_values];
    // Held-out class distribution, or mean target, for the empirical prior.
    let mut empirical = vec![0.0; tree.n_values];
    if !samples.is_empty() {
        crit.init(&samples, 0, samples.len());
        crit.node_value(&mut empirical);
        if criterion.is_classification() {
            normalize_row(&mut empirical);
        }
    }
    let mut n_collapsed = 0;
    let mut n_empty = 0;

    let mut stack = vec![PruningRecord {
        node_idx: 0,
        parent: TREE_UNDEFINED,
        is_left: false,
        start: 0,
        end: samples.len(),
        depth: 0,
    }];
    while let Some(record) = stack.pop() {
        let source = tree.node(record.node_idx);
        let n_node_samples = record.end - record.start;

        let (impurity, weighted_n_node_samples) = if n_node_samples == 0 {
            n_empty += 1;
            empty_leaf_value(&empirical, criterion, cfg.prior, &mut value);
            (0.0, 0.0)
        } else {
            crit.init(&samples, record.start, record.end);
            crit.node_value(&mut value);
            (crit.node_impurity(), crit.weighted_n_node_samples())
        };

        let state = if source.is_leaf() || n_node_samples < cfg.min_samples_split {
            PruneState::Leaf
        } else {
            PruneState::Descend
        };

        let node_id = match (state, tree.projection(record.node_idx)) {
            (PruneState::Descend, Some(projection)) => {
                let rule = SplitRule {
                    projection,
                    threshold: source.threshold,
                    missing_go_to_left: source.missing_go_to_left,
                };
                let node_id = out.add_node(
                    record.parent,
                    record.is_left,
                    Some(rule),
                    impurity,
                    n_node_samples,
                    weighted_n_node_samples,
                )?;
                let n_left = partition_by_rule(data, &rule, &mut samples[record.start..record.end]);
                let pos = record.start + n_left;
                stack.push(PruningRecord {
                    node_idx: source.right_child,
                    parent: node_id,
                    is_left: false,
                    start: pos,
                    end: record.end,
                    depth: record.depth + 1,
                });
                stack.push(PruningRecord {
                    node_idx: source.left_child,
                    parent: node_id,
                    is_left: true,
                    start: record.start,
                    end: pos,
                    depth: record.depth + 1,
                });
                node_id
            }
            _ => {
                if !source.is_leaf() {
                    n_collapsed += 1;
                }
                out.add_node(
                    record.parent,
                    record.is_left,
                    None,
                    impurity,
                    n_node_samples,
                    weighted_n_node_samples,
                )?
            }
        };
        out.set_value(node_id, &value);
        out.max_depth = out.max_depth.max(record.depth);
    }

    if n_empty > 0 {
        warn!(
            "Honest pruning left {} nodes without held-out samples, their values follow the {:?} prior.",
            n_empty, cfg.prior
        );
    }
    debug!(
        "Honest pruning: n_nodes {} -> {}, {} subtrees collapsed",
        tree.node_count(),
        out.node_count(),
        n_collapsed
    );
    Ok(out)
}

fn empty_leaf_value(empirical: &[f64], criterion: CriterionKind, prior: HonestPrior, dest: &mut [f64]) {
    match prior {
        HonestPrior::Empirical => dest.copy_from_slice(empirical),
        HonestPrior::Uniform if criterion.is_classification() => {
            let mass = 1.0 / dest.len() as f64;
            dest.iter_mut().for_each(|v| *v = mass);
        }
        HonestPrior::Uniform => dest.copy_from_slice(empirical),
        HonestPrior::Ignore => dest.iter_mut().for_each(|v| *v = f64::NAN),
    }
}
