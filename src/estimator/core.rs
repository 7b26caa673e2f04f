//! Oblique Decision Tree
//!
//! The estimator wrapping a single [`Tree`]: input validation, the fit driver
//! wiring criterion, projection sampler, splitter and builder together, and
//! honest pruning of the fitted tree.
use crate::builder::{BestFirstBuilder, BuilderParams, DepthFirstBuilder, TreeBuilder};
use crate::criterion::validate_regression_targets;
use crate::data::Matrix;
use crate::errors::ObliqueTreeError;
use crate::estimator::config::{TreeConfig, TreeIO};
use crate::prune::{honest_prune, HonestConfig};
use crate::splitter::{Splitter, SplitterParams};
use crate::tree::Tree;
use crate::utils::{validate_class_labels, validate_length, validate_sample_weight};
use log::info;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Oblique decision tree classifier or regressor, decided by the criterion.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObliqueDecisionTree {
    pub cfg: TreeConfig,
    /// Number of classes seen during fit, zero for regression.
    #[serde(default)]
    pub n_classes: usize,
    #[serde(default)]
    pub tree: Option<Tree>,
}

/// Summary of validated fit inputs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FitInput {
    pub n_classes: usize,
    pub n_values: usize,
}

/// Validate the data, targets and weights of a fit against `cfg`.
pub(crate) fn validate_fit_input(
    cfg: &TreeConfig,
    data: &Matrix<f64>,
    y: &[f64],
    sample_weight: Option<&[f64]>,
) -> Result<FitInput, ObliqueTreeError> {
    cfg.validate()?;
    validate_length("y", data.rows, y.len())?;
    let total_weight = validate_sample_weight(sample_weight, data.rows)?;
    if data.rows == 0 || data.cols == 0 || total_weight <= 0.0 {
        return Err(ObliqueTreeError::EmptyDataset);
    }
    if let Some(v) = data.data.iter().find(|v| v.is_infinite()) {
        return Err(ObliqueTreeError::InvalidParameter(
            "data".to_string(),
            "finite or missing (NaN) values".to_string(),
            v.to_string(),
        ));
    }
    let n_classes = if cfg.criterion.is_classification() {
        validate_class_labels(y, data.rows)?
    } else {
        validate_regression_targets(y)?;
        0
    };
    Ok(FitInput {
        n_classes,
        n_values: n_classes.max(1),
    })
}

/// Fit one tree on validated inputs.
///
/// Samples with zero weight never enter the sample buffer. `seed` seeds the
/// splitter stream, so equal inputs and seeds give identical trees.
pub(crate) fn build_tree(
    cfg: &TreeConfig,
    data: &Matrix<f64>,
    y: &[f64],
    sample_weight: Option<&[f64]>,
    input: FitInput,
    seed: u64,
) -> Result<Tree, ObliqueTreeError> {
    let samples: Vec<usize> = match sample_weight {
        Some(w) => (0..data.rows).filter(|i| w[*i] > 0.0).collect(),
        None => (0..data.rows).collect(),
    };
    let weighted_n_samples: f64 = match sample_weight {
        Some(w) => samples.iter().map(|i| w[*i]).sum(),
        None => samples.len() as f64,
    };
    if samples.is_empty() || weighted_n_samples <= 0.0 {
        return Err(ObliqueTreeError::EmptyDataset);
    }

    let sampler = cfg.projection.build(data.cols)?;
    let criterion = cfg.criterion.build(y, sample_weight, input.n_classes, weighted_n_samples);
    let mut splitter = Splitter::new(
        data,
        criterion,
        sampler,
        samples,
        SplitterParams {
            max_features: cfg.max_features.resolve(data.cols),
            min_samples_leaf: cfg.min_samples_leaf,
            min_weight_leaf: cfg.min_weight_leaf,
            min_impurity_decrease: cfg.min_impurity_decrease,
        },
        seed,
    );

    let params = BuilderParams {
        max_depth: cfg.max_depth.unwrap_or(usize::MAX),
        min_samples_split: cfg.min_samples_split,
        min_samples_leaf: cfg.min_samples_leaf,
        min_weight_leaf: cfg.min_weight_leaf,
        timeout: cfg.timeout,
    };
    let builder: Box<dyn TreeBuilder> = match cfg.max_leaf_nodes {
        Some(max_leaf_nodes) => Box::new(BestFirstBuilder::new(params, max_leaf_nodes)),
        None => Box::new(DepthFirstBuilder::new(params)),
    };

    let mut tree = Tree::new(data.cols, input.n_values);
    builder.build(&mut splitter, &mut tree)?;
    Ok(tree)
}

impl ObliqueDecisionTree {
    pub fn new(cfg: TreeConfig) -> Self {
        ObliqueDecisionTree {
            cfg,
            n_classes: 0,
            tree: None,
        }
    }

    /// Fit the tree.
    ///
    /// * `data` - Column major feature matrix, NaN marks a missing value.
    /// * `y` - Class labels `0..n_classes` for classification criteria, any
    ///   finite value for regression.
    /// * `sample_weight` - Optional non-negative weight per row.
    pub fn fit(&mut self, data: &Matrix<f64>, y: &[f64], sample_weight: Option<&[f64]>) -> Result<(), ObliqueTreeError> {
        let start = Instant::now();
        self.tree = None;
        self.n_classes = 0;
        let input = validate_fit_input(&self.cfg, data, y, sample_weight)?;
        let tree = build_tree(&self.cfg, data, y, sample_weight, input, self.cfg.seed)?;
        info!(
            "Fit tree with {} nodes, {} leaves and depth {} in {:.3} seconds.",
            tree.node_count(),
            tree.n_leaves(),
            tree.max_depth,
            start.elapsed().as_secs_f32()
        );
        self.n_classes = input.n_classes;
        self.tree = Some(tree);
        Ok(())
    }

    /// Replace the leaf statistics of the fitted tree with ones estimated on
    /// a held-out sample, collapsing splits the held-out sample cannot support.
    pub fn honest_prune(
        &mut self,
        data: &Matrix<f64>,
        y: &[f64],
        sample_weight: Option<&[f64]>,
        honest: &HonestConfig,
    ) -> Result<(), ObliqueTreeError> {
        let tree = self.fitted_tree()?;
        let pruned = honest_prune(tree, data, y, sample_weight, self.cfg.criterion, honest)?;
        info!(
            "Honest pruning: n_nodes {} -> {}, n_leaves {} -> {}",
            tree.node_count(),
            pruned.node_count(),
            tree.n_leaves(),
            pruned.n_leaves()
        );
        self.tree = Some(pruned);
        Ok(())
    }

    pub fn fitted_tree(&self) -> Result<&Tree, ObliqueTreeError> {
        self.tree.as_ref().ok_or(ObliqueTreeError::NotFitted)
    }

    pub fn is_classifier(&self) -> bool {
        self.cfg.criterion.is_classification()
    }
}

impl TreeIO for ObliqueDecisionTree {
    fn validate_loaded(&self) -> Result<(), ObliqueTreeError> {
        self.cfg.validate()?;
        match &self.tree {
            Some(tree) => tree.validate(),
            None => Ok(()),
        }
    }
}
