//! Projection
//!
//! Sparse projections of the raw feature space, and the sampling policies that
//! draw a fresh matrix of candidate projections at every node. A split compares
//! `sum(weight * x[index])` over the projection support against a threshold.
use crate::data::Matrix;
use crate::errors::ObliqueTreeError;
use crate::utils::{fmt_vec_output, validate_float_parameter, validate_min_usize_parameter};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// A sparse vector over raw feature indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub indices: Vec<usize>,
    pub weights: Vec<f64>,
}

impl Projection {
    pub fn new() -> Self {
        Projection::default()
    }

    pub fn push(&mut self, index: usize, weight: f64) {
        self.indices.push(index);
        self.weights.push(weight);
    }

    pub fn clear(&mut self) {
        self.indices.clear();
        self.weights.clear();
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.weights.iter().copied())
    }

    /// Evaluate the projection for one row of the data.
    ///
    /// A missing (NaN) value anywhere in the support makes the projected
    /// value missing.
    #[inline]
    pub fn dot(&self, data: &Matrix<f64>, row: usize) -> f64 {
        self.iter().map(|(j, w)| w * data.get(row, j)).sum()
    }

    /// Evaluate the projection against a single raw feature vector.
    #[inline]
    pub fn dot_slice(&self, row: &[f64]) -> f64 {
        self.iter().map(|(j, w)| w * row[j]).sum()
    }
}

impl Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}*[{}]", self.indices, fmt_vec_output(&self.weights))
    }
}

/// The candidate projections drawn for one node, one row per candidate.
pub type ProjectionMatrix = Vec<Projection>;

/// Strategy that fills a projection matrix for a node.
///
/// Samplers own whatever scratch state they need between nodes, the random
/// stream is owned by the splitter and threaded through every call.
pub trait ProjectionSampler: Send {
    /// Fill `proj_mat` with `max_features` candidate projections.
    fn sample(
        &mut self,
        rng: &mut StdRng,
        max_features: usize,
        proj_mat: &mut ProjectionMatrix,
    ) -> Result<(), ObliqueTreeError>;
}

/// Average number of features combined when `feature_combinations` is unset.
pub const DEFAULT_FEATURE_COMBINATIONS: f64 = 1.5;

/// Projection sampling policy, as configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectionPolicy {
    /// Every candidate projection is a single raw feature with weight one.
    AxisAligned,
    /// Every candidate combines on average `feature_combinations` raw features
    /// with weights drawn from {-1, +1}. `None` combines
    /// `min(1.5, n_features)` features.
    SparseRandom { feature_combinations: Option<f64> },
    /// Every candidate is a box sum over a contiguous patch of a feature grid.
    Patch(PatchConfig),
}

impl Default for ProjectionPolicy {
    fn default() -> Self {
        ProjectionPolicy::SparseRandom {
            feature_combinations: None,
        }
    }
}

impl ProjectionPolicy {
    /// Validate parameters that do not depend on the data.
    pub fn validate(&self) -> Result<(), ObliqueTreeError> {
        match self {
            ProjectionPolicy::AxisAligned => Ok(()),
            ProjectionPolicy::SparseRandom {
                feature_combinations: Some(fc),
            } => validate_float_parameter(*fc, 1.0, f64::MAX, "feature_combinations"),
            ProjectionPolicy::SparseRandom { feature_combinations: None } => Ok(()),
            ProjectionPolicy::Patch(cfg) => cfg.validate(),
        }
    }

    /// Build the sampler for data with `n_features` raw features.
    pub fn build(&self, n_features: usize) -> Result<Box<dyn ProjectionSampler>, ObliqueTreeError> {
        self.validate()?;
        validate_min_usize_parameter(n_features, 1, "n_features")?;
        match self {
            ProjectionPolicy::AxisAligned => Ok(Box::new(AxisAlignedSampler::new(n_features))),
            ProjectionPolicy::SparseRandom { feature_combinations } => {
                let fc = feature_combinations.unwrap_or_else(|| DEFAULT_FEATURE_COMBINATIONS.min(n_features as f64));
                validate_float_parameter(fc, 1.0, n_features as f64, "feature_combinations")?;
                Ok(Box::new(SparseRandomSampler::new(n_features, fc)))
            }
            ProjectionPolicy::Patch(cfg) => Ok(Box::new(PatchSampler::new(cfg.clone(), n_features)?)),
        }
    }
}

/// Draw `k` distinct features from the pool with a partial Fisher-Yates
/// shuffle. Successive draws take disjoint chunks of the pool until it is
/// exhausted, after which the shuffle restarts from the front.
fn draw_from_pool(rng: &mut StdRng, pool: &mut [usize], cursor: &mut usize, k: usize, out: &mut Vec<usize>) {
    let n = pool.len();
    if *cursor + k > n {
        *cursor = 0;
    }
    for _ in 0..k {
        let pick = rng.gen_range(*cursor..n);
        pool.swap(*cursor, pick);
        out.push(pool[*cursor]);
        *cursor += 1;
    }
}

pub struct AxisAlignedSampler {
    pool: Vec<usize>,
    drawn: Vec<usize>,
}

impl AxisAlignedSampler {
    pub fn new(n_features: usize) -> Self {
        AxisAlignedSampler {
            pool: (0..n_features).collect(),
            drawn: Vec::with_capacity(1),
        }
    }
}

impl ProjectionSampler for AxisAlignedSampler {
    fn sample(
        &mut self,
        rng: &mut StdRng,
        max_features: usize,
        proj_mat: &mut ProjectionMatrix,
    ) -> Result<(), ObliqueTreeError> {
        reset_matrix(proj_mat, max_features);
        let mut cursor = 0;
        for row in proj_mat.iter_mut() {
            self.drawn.clear();
            draw_from_pool(rng, &mut self.pool, &mut cursor, 1, &mut self.drawn);
            row.push(self.drawn[0], 1.0);
        }
        Ok(())
    }
}

/// Sparse random projections.
///
/// Each row selects `floor(feature_combinations)` features, plus one more with
/// probability equal to the fractional part, without replacement. Rows with a
/// single feature keep weight one, since a sign flip of a single feature only
/// mirrors the threshold scan. Otherwise weights are drawn from {-1, +1}.
pub struct SparseRandomSampler {
    pool: Vec<usize>,
    drawn: Vec<usize>,
    feature_combinations: f64,
}

impl SparseRandomSampler {
    pub fn new(n_features: usize, feature_combinations: f64) -> Self {
        SparseRandomSampler {
            pool: (0..n_features).collect(),
            drawn: Vec::new(),
            feature_combinations,
        }
    }

    fn n_non_zeros(&self, rng: &mut StdRng) -> usize {
        let base = self.feature_combinations.floor();
        let frac = self.feature_combinations - base;
        let mut k = base as usize;
        if frac > 0.0 && rng.gen::<f64>() < frac {
            k += 1;
        }
        k.clamp(1, self.pool.len())
    }
}

impl ProjectionSampler for SparseRandomSampler {
    fn sample(
        &mut self,
        rng: &mut StdRng,
        max_features: usize,
        proj_mat: &mut ProjectionMatrix,
    ) -> Result<(), ObliqueTreeError> {
        reset_matrix(proj_mat, max_features);
        let n_features = self.pool.len();
        let mut cursor = 0;
        for row in proj_mat.iter_mut() {
            let k = self.n_non_zeros(rng);
            self.drawn.clear();
            draw_from_pool(rng, &mut self.pool, &mut cursor, k, &mut self.drawn);
            for &idx in &self.drawn {
                if idx >= n_features {
                    return Err(ObliqueTreeError::ProjectionIndexOutOfRange(idx, n_features));
                }
                let weight = if k == 1 || rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                row.push(idx, weight);
            }
        }
        Ok(())
    }
}

/// Patch (MORF) policy parameters over a row-major feature grid.
///
/// The last axis varies fastest in the raveled feature index, so a 2-D grid is
/// `[data_height, data_width]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchConfig {
    pub data_dims: Vec<usize>,
    pub min_patch_dims: Vec<usize>,
    pub max_patch_dims: Vec<usize>,
}

impl PatchConfig {
    pub fn two_dimensional(
        data_height: usize,
        data_width: usize,
        min_patch_height: usize,
        max_patch_height: usize,
        min_patch_width: usize,
        max_patch_width: usize,
    ) -> Self {
        PatchConfig {
            data_dims: vec![data_height, data_width],
            min_patch_dims: vec![min_patch_height, min_patch_width],
            max_patch_dims: vec![max_patch_height, max_patch_width],
        }
    }

    /// Number of raw features the grid covers.
    pub fn n_cells(&self) -> usize {
        self.data_dims.iter().product()
    }

    pub fn validate(&self) -> Result<(), ObliqueTreeError> {
        let n_dims = self.data_dims.len();
        validate_min_usize_parameter(n_dims, 1, "data_dims")?;
        for (name, dims) in [("min_patch_dims", &self.min_patch_dims), ("max_patch_dims", &self.max_patch_dims)] {
            if dims.len() != n_dims {
                return Err(ObliqueTreeError::InvalidParameter(
                    name.to_string(),
                    format!("{} axes", n_dims),
                    format!("{} axes", dims.len()),
                ));
            }
        }
        for axis in 0..n_dims {
            let (min, max, dim) = (self.min_patch_dims[axis], self.max_patch_dims[axis], self.data_dims[axis]);
            validate_min_usize_parameter(dim, 1, &format!("data_dims[{}]", axis))?;
            validate_min_usize_parameter(min, 1, &format!("min_patch_dims[{}]", axis))?;
            if min > max {
                return Err(ObliqueTreeError::InvalidParameter(
                    format!("min_patch_dims[{}]", axis),
                    format!("value no greater than max_patch_dims[{}] = {}", axis, max),
                    min.to_string(),
                ));
            }
            if max > dim {
                return Err(ObliqueTreeError::InvalidParameter(
                    format!("max_patch_dims[{}]", axis),
                    format!("value no greater than data_dims[{}] = {}", axis, dim),
                    max.to_string(),
                ));
            }
        }
        Ok(())
    }
}

pub struct PatchSampler {
    cfg: PatchConfig,
    strides: Vec<usize>,
    n_features: usize,
    patch_dims: Vec<usize>,
    anchor: Vec<usize>,
    offset: Vec<usize>,
}

impl PatchSampler {
    pub fn new(cfg: PatchConfig, n_features: usize) -> Result<Self, ObliqueTreeError> {
        cfg.validate()?;
        if cfg.n_cells() != n_features {
            return Err(ObliqueTreeError::InvalidParameter(
                "data_dims".to_string(),
                format!("grid covering {} features", n_features),
                format!("{:?}", cfg.data_dims),
            ));
        }
        let n_dims = cfg.data_dims.len();
        let mut strides = vec![1; n_dims];
        for axis in (0..n_dims.saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * cfg.data_dims[axis + 1];
        }
        Ok(PatchSampler {
            cfg,
            strides,
            n_features,
            patch_dims: vec![0; n_dims],
            anchor: vec![0; n_dims],
            offset: vec![0; n_dims],
        })
    }

    fn sample_patch(&mut self, rng: &mut StdRng, row: &mut Projection) -> Result<(), ObliqueTreeError> {
        let n_dims = self.cfg.data_dims.len();
        let mut n_anchors = 1;
        for axis in 0..n_dims {
            self.patch_dims[axis] = rng.gen_range(self.cfg.min_patch_dims[axis]..=self.cfg.max_patch_dims[axis]);
            n_anchors *= self.cfg.data_dims[axis] - self.patch_dims[axis] + 1;
        }

        // unravel the top-left anchor, last axis fastest
        let mut anchor = rng.gen_range(0..n_anchors);
        for axis in (0..n_dims).rev() {
            let valid = self.cfg.data_dims[axis] - self.patch_dims[axis] + 1;
            self.anchor[axis] = anchor % valid;
            anchor /= valid;
        }

        self.offset.iter_mut().for_each(|o| *o = 0);
        loop {
            let idx: usize = (0..n_dims)
                .map(|axis| (self.anchor[axis] + self.offset[axis]) * self.strides[axis])
                .sum();
            if idx >= self.n_features {
                return Err(ObliqueTreeError::ProjectionIndexOutOfRange(idx, self.n_features));
            }
            row.push(idx, 1.0);

            // odometer over the patch footprint
            let mut axis = n_dims;
            loop {
                if axis == 0 {
                    return Ok(());
                }
                axis -= 1;
                self.offset[axis] += 1;
                if self.offset[axis] < self.patch_dims[axis] {
                    break;
                }
                self.offset[axis] = 0;
            }
        }
    }
}

impl ProjectionSampler for PatchSampler {
    fn sample(
        &mut self,
        rng: &mut StdRng,
        max_features: usize,
        proj_mat: &mut ProjectionMatrix,
    ) -> Result<(), ObliqueTreeError> {
        reset_matrix(proj_mat, max_features);
        for row in proj_mat.iter_mut() {
            self.sample_patch(rng, row)?;
        }
        Ok(())
    }
}

fn reset_matrix(proj_mat: &mut ProjectionMatrix, max_features: usize) {
    proj_mat.resize_with(max_features, Projection::new);
    proj_mat.iter_mut().for_each(|p| p.clear());
}
