//! Forest
//!
//! Ensemble of oblique trees fit in parallel. Every tree owns its sample
//! weights and random stream, derived from the master seed and the tree
//! index, and reads the shared data without synchronisation.
use crate::data::{Matrix, RowMajorMatrix};
use crate::errors::ObliqueTreeError;
use crate::estimator::config::{TreeConfig, TreeIO};
use crate::estimator::core::{build_tree, validate_fit_input, FitInput};
use crate::prune::{honest_prune, HonestConfig};
use crate::sampler::{BootstrapSampler, HoldOutSampler, Sampler};
use crate::tree::Tree;
use crate::utils::{argmax, normalize_row, validate_min_usize_parameter};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

fn default_n_estimators() -> usize {
    100
}
fn default_bootstrap() -> bool {
    true
}
fn default_honest_fraction() -> Option<f64> {
    None
}

/// Configuration for an `ObliqueForest`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Parameters of every tree. The tree seed is replaced per tree.
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Resample the structure rows of every tree with replacement.
    #[serde(default = "default_bootstrap")]
    pub bootstrap: bool,
    /// Fraction of rows held out of structure fitting and used to honestly
    /// re-estimate the leaves of every tree.
    #[serde(default = "default_honest_fraction")]
    pub honest_fraction: Option<f64>,
    #[serde(default)]
    pub honest: HonestConfig,
    #[serde(default)]
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        ForestConfig {
            tree: TreeConfig::default(),
            n_estimators: default_n_estimators(),
            bootstrap: default_bootstrap(),
            honest_fraction: default_honest_fraction(),
            honest: HonestConfig::default(),
            seed: 0,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<(), ObliqueTreeError> {
        self.tree.validate()?;
        validate_min_usize_parameter(self.n_estimators, 1, "n_estimators")?;
        if let Some(f) = self.honest_fraction {
            if f.is_nan() || f <= 0.0 || f >= 1.0 {
                return Err(ObliqueTreeError::InvalidParameter(
                    "honest_fraction".to_string(),
                    "fraction within (0, 1)".to_string(),
                    f.to_string(),
                ));
            }
        }
        self.honest.validate()
    }
}

/// Seed of tree `index`, independent of the order trees are fit in.
pub fn tree_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_add((index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObliqueForest {
    pub cfg: ForestConfig,
    #[serde(default)]
    pub n_classes: usize,
    #[serde(default)]
    pub trees: Vec<Tree>,
}

impl ObliqueForest {
    pub fn new(cfg: ForestConfig) -> Self {
        ObliqueForest {
            cfg,
            n_classes: 0,
            trees: Vec::new(),
        }
    }

    /// Fit every tree of the forest in parallel.
    ///
    /// With `honest_fraction` set, every tree holds out exactly
    /// `floor(honest_fraction * n)` of the `n` positive weight rows. Fitting
    /// fails when that leaves no honest row.
    pub fn fit(&mut self, data: &Matrix<f64>, y: &[f64], sample_weight: Option<&[f64]>) -> Result<(), ObliqueTreeError> {
        let start = Instant::now();
        self.trees.clear();
        self.n_classes = 0;
        self.cfg.validate()?;
        let input = validate_fit_input(&self.cfg.tree, data, y, sample_weight)?;
        let n_honest = match self.cfg.honest_fraction {
            Some(f) => {
                let n = sample_weight.map_or(data.rows, |w| w.iter().filter(|v| **v > 0.0).count());
                let n_honest = (f * n as f64).floor() as usize;
                if n_honest == 0 {
                    return Err(ObliqueTreeError::InvalidParameter(
                        "honest_fraction".to_string(),
                        format!("at least one honest row out of {}", n),
                        f.to_string(),
                    ));
                }
                n_honest
            }
            None => 0,
        };
        let trees = (0..self.cfg.n_estimators)
            .into_par_iter()
            .map(|index| self.fit_tree(index, data, y, sample_weight, input, n_honest))
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            "Fit forest of {} trees with {} nodes in total in {:.3} seconds.",
            trees.len(),
            trees.iter().map(|t| t.node_count()).sum::<usize>(),
            start.elapsed().as_secs_f32()
        );
        self.n_classes = input.n_classes;
        self.trees = trees;
        Ok(())
    }

    fn fit_tree(
        &self,
        index: usize,
        data: &Matrix<f64>,
        y: &[f64],
        sample_weight: Option<&[f64]>,
        input: FitInput,
        n_honest: usize,
    ) -> Result<Tree, ObliqueTreeError> {
        let seed = tree_seed(self.cfg.seed, index);
        let mut rng = StdRng::seed_from_u64(seed);
        let base_weight = |i: usize| sample_weight.map_or(1.0, |w| w[i]);
        let rows: Vec<usize> = (0..data.rows).filter(|i| base_weight(*i) > 0.0).collect();

        let (structure, honest) = HoldOutSampler::new(n_honest).sample(&mut rng, &rows);
        let structure = if self.cfg.bootstrap {
            BootstrapSampler.sample(&mut rng, &structure).0
        } else {
            structure
        };

        let mut structure_weight = vec![0.0; data.rows];
        for i in structure {
            structure_weight[i] += base_weight(i);
        }
        let tree = build_tree(&self.cfg.tree, data, y, Some(&structure_weight), input, seed)?;

        let tree = if self.cfg.honest_fraction.is_some() {
            let mut honest_weight = vec![0.0; data.rows];
            for i in honest {
                honest_weight[i] = base_weight(i);
            }
            honest_prune(&tree, data, y, Some(&honest_weight), self.cfg.tree.criterion, &self.cfg.honest)?
        } else {
            tree
        };
        if tree.node_count() == 1 {
            warn!("Tree {} of the forest is a single leaf.", index);
        }
        Ok(tree)
    }

    fn check_fitted(&self) -> Result<(), ObliqueTreeError> {
        if self.trees.is_empty() {
            Err(ObliqueTreeError::NotFitted)
        } else {
            Ok(())
        }
    }

    /// Average of the per tree leaf statistics.
    ///
    /// Classification rows are normalised per tree before averaging. Trees
    /// whose leaf holds no mass, or a missing value, are left out of the
    /// average of that row.
    pub fn predict_values(&self, data: &Matrix<f64>, parallel: bool) -> Result<RowMajorMatrix<f64>, ObliqueTreeError> {
        self.check_fitted()?;
        let classification = self.cfg.tree.criterion.is_classification();
        let per_tree = if parallel {
            self.trees
                .par_iter()
                .map(|t| t.predict(data, false))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            self.trees
                .iter()
                .map(|t| t.predict(data, false))
                .collect::<Result<Vec<_>, _>>()?
        };

        let cols = self.trees[0].n_values;
        let mut out = vec![0.0; data.rows * cols];
        let mut counts = vec![0usize; data.rows];
        let mut row = vec![0.0; cols];
        for values in &per_tree {
            for (i, leaf) in values.rows_iter().enumerate() {
                row.copy_from_slice(leaf);
                if classification {
                    normalize_row(&mut row);
                }
                let total: f64 = row.iter().sum();
                if total.is_nan() || (classification && total <= 0.0) {
                    continue;
                }
                counts[i] += 1;
                out[i * cols..(i + 1) * cols]
                    .iter_mut()
                    .zip(&row)
                    .for_each(|(o, v)| *o += v);
            }
        }
        for (i, count) in counts.iter().enumerate() {
            let slot = &mut out[i * cols..(i + 1) * cols];
            if *count == 0 {
                slot.iter_mut().for_each(|v| *v = f64::NAN);
            } else {
                slot.iter_mut().for_each(|v| *v /= *count as f64);
            }
        }
        Ok(RowMajorMatrix::new(out, data.rows, cols))
    }

    /// Predict the class label, or the mean target for regression.
    pub fn predict(&self, data: &Matrix<f64>, parallel: bool) -> Result<Vec<f64>, ObliqueTreeError> {
        let values = self.predict_values(data, parallel)?;
        if self.cfg.tree.criterion.is_classification() {
            Ok(values.rows_iter().map(|row| argmax(row) as f64).collect())
        } else {
            Ok(values.rows_iter().map(|row| row[0]).collect())
        }
    }

    /// Class probabilities averaged over the trees.
    pub fn predict_proba(&self, data: &Matrix<f64>, parallel: bool) -> Result<RowMajorMatrix<f64>, ObliqueTreeError> {
        if !self.cfg.tree.criterion.is_classification() {
            return Err(ObliqueTreeError::InvalidParameter(
                "criterion".to_string(),
                "a classification criterion".to_string(),
                format!("{:?}", self.cfg.tree.criterion),
            ));
        }
        self.predict_values(data, parallel)
    }

    /// Leaf id reached by every row in every tree, one column per tree.
    pub fn apply(&self, data: &Matrix<f64>, parallel: bool) -> Result<RowMajorMatrix<usize>, ObliqueTreeError> {
        self.check_fitted()?;
        let per_tree = self
            .trees
            .iter()
            .map(|t| t.apply(data, parallel))
            .collect::<Result<Vec<_>, _>>()?;
        let n_trees = per_tree.len();
        let mut out = vec![0; data.rows * n_trees];
        for (t, leaves) in per_tree.iter().enumerate() {
            for (i, leaf) in leaves.iter().enumerate() {
                out[i * n_trees + t] = *leaf;
            }
        }
        Ok(RowMajorMatrix::new(out, data.rows, n_trees))
    }

    /// Mean of the normalised feature importances of the trees.
    pub fn feature_importances(&self) -> Result<Vec<f64>, ObliqueTreeError> {
        self.check_fitted()?;
        let mut importances = vec![0.0; self.trees[0].n_features];
        for tree in &self.trees {
            for (total, v) in importances.iter_mut().zip(tree.compute_feature_importances(true)) {
                *total += v;
            }
        }
        let n = self.trees.len() as f64;
        importances.iter_mut().for_each(|v| *v /= n);
        Ok(importances)
    }
}

impl TreeIO for ObliqueForest {
    fn validate_loaded(&self) -> Result<(), ObliqueTreeError> {
        self.cfg.validate()?;
        self.trees.iter().try_for_each(|t| t.validate())
    }
}
