//! Splitter
//!
//! Searches a node's sample range for the best oblique split. For every
//! candidate projection drawn by the [`ProjectionSampler`], samples are sorted
//! by their projected value and thresholds are scanned left to right while the
//! [`Criterion`] is updated incrementally.
use crate::constants::{EPSILON, FEATURE_THRESHOLD};
use crate::criterion::Criterion;
use crate::data::Matrix;
use crate::errors::ObliqueTreeError;
use crate::projection::{Projection, ProjectionMatrix, ProjectionSampler};
use crate::utils::is_missing;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// A proposed split of a node range.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRecord {
    pub projection: Projection,
    pub threshold: f64,
    /// Boundary within the sample buffer, `[start, pos)` goes left.
    pub pos: usize,
    pub impurity_left: f64,
    pub impurity_right: f64,
    pub improvement: f64,
    pub missing_go_to_left: bool,
    pub n_missing: usize,
}

impl SplitRecord {
    pub fn rule(&self) -> SplitRule<'_> {
        SplitRule {
            projection: &self.projection,
            threshold: self.threshold,
            missing_go_to_left: self.missing_go_to_left,
        }
    }
}

/// The parts of a split needed to route samples.
#[derive(Debug, Clone, Copy)]
pub struct SplitRule<'p> {
    pub projection: &'p Projection,
    pub threshold: f64,
    pub missing_go_to_left: bool,
}

impl<'p> SplitRule<'p> {
    #[inline]
    pub fn goes_left(&self, value: f64) -> bool {
        if is_missing(value) {
            self.missing_go_to_left
        } else {
            value <= self.threshold
        }
    }
}

/// Partition `samples` in place so the ones routed left by `rule` come first,
/// returning the number routed left.
pub fn partition_by_rule(data: &Matrix<f64>, rule: &SplitRule, samples: &mut [usize]) -> usize {
    let mut p = 0;
    let mut partition_end = samples.len();
    while p < partition_end {
        if rule.goes_left(rule.projection.dot(data, samples[p])) {
            p += 1;
        } else {
            partition_end -= 1;
            samples.swap(p, partition_end);
        }
    }
    p
}

/// Stopping parameters the splitter enforces on every candidate.
#[derive(Debug, Clone, Copy)]
pub struct SplitterParams {
    pub max_features: usize,
    pub min_samples_leaf: usize,
    pub min_weight_leaf: f64,
    pub min_impurity_decrease: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    row: usize,
    threshold: f64,
    missing_go_to_left: bool,
}

pub struct Splitter<'a> {
    data: &'a Matrix<'a, f64>,
    criterion: Box<dyn Criterion + 'a>,
    sampler: Box<dyn ProjectionSampler>,
    rng: StdRng,
    params: SplitterParams,
    samples: Vec<usize>,
    feature_values: Vec<f64>,
    proj_mat: ProjectionMatrix,
    sort_buffer: Vec<(f64, usize)>,
    left_buffer: Vec<usize>,
    right_buffer: Vec<usize>,
    missing_buffer: Vec<usize>,
    start: usize,
    end: usize,
}

impl<'a> Splitter<'a> {
    /// Create a splitter over `samples`, the rows of `data` the tree is fit on.
    pub fn new(
        data: &'a Matrix<'a, f64>,
        criterion: Box<dyn Criterion + 'a>,
        sampler: Box<dyn ProjectionSampler>,
        samples: Vec<usize>,
        params: SplitterParams,
        seed: u64,
    ) -> Self {
        let n = samples.len();
        Splitter {
            data,
            criterion,
            sampler,
            rng: StdRng::seed_from_u64(seed),
            params,
            samples,
            feature_values: vec![0.0; n],
            proj_mat: ProjectionMatrix::with_capacity(params.max_features),
            sort_buffer: Vec::with_capacity(n),
            left_buffer: Vec::with_capacity(n),
            right_buffer: Vec::with_capacity(n),
            missing_buffer: Vec::new(),
            start: 0,
            end: n,
        }
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[usize] {
        &self.samples
    }

    /// Bind the splitter and criterion to `[start, end)`, returning the
    /// weighted number of samples in the node.
    pub fn reset(&mut self, start: usize, end: usize) -> f64 {
        self.start = start;
        self.end = end;
        self.criterion.set_missing_go_to_left(false);
        self.criterion.init(&self.samples, start, end);
        self.criterion.weighted_n_node_samples()
    }

    pub fn node_impurity(&self) -> f64 {
        self.criterion.node_impurity()
    }

    pub fn node_value(&self, dest: &mut [f64]) {
        self.criterion.node_value(dest)
    }

    /// Find the best split of the current node.
    ///
    /// Returns `Ok(None)` when no candidate satisfies the leaf size, leaf
    /// weight and impurity decrease constraints. On success the sample buffer
    /// is partitioned so `[start, pos)` holds the samples routed left.
    pub fn find_best_split(&mut self, impurity: f64) -> Result<Option<SplitRecord>, ObliqueTreeError> {
        let (start, end) = (self.start, self.end);
        let min_samples_leaf = self.params.min_samples_leaf;
        let min_weight_leaf = self.params.min_weight_leaf;

        self.sampler
            .sample(&mut self.rng, self.params.max_features, &mut self.proj_mat)?;

        let mut best: Option<Candidate> = None;
        let mut best_proxy = f64::NEG_INFINITY;

        for row in 0..self.proj_mat.len() {
            if self.proj_mat[row].is_empty() {
                continue;
            }
            let n_missing = project_and_sort(
                self.data,
                &self.proj_mat[row],
                &mut self.samples[start..end],
                &mut self.feature_values[start..end],
                &mut self.sort_buffer,
                &mut self.missing_buffer,
            );
            let end_non_missing = end - n_missing;
            let values = &self.feature_values;
            let constant =
                end_non_missing == start || values[end_non_missing - 1] <= values[start] + FEATURE_THRESHOLD;
            if constant && n_missing == 0 {
                continue;
            }

            self.criterion.init_missing(&self.samples, n_missing);
            let directions: &[bool] = if n_missing == 0 { &[false] } else { &[false, true] };

            if !constant {
                for &missing_go_to_left in directions {
                    self.criterion.set_missing_go_to_left(missing_go_to_left);
                    self.criterion.reset();
                    let mut p = start;
                    while p < end_non_missing {
                        while p + 1 < end_non_missing && values[p + 1] <= values[p] + FEATURE_THRESHOLD {
                            p += 1;
                        }
                        p += 1;
                        if p >= end_non_missing {
                            continue;
                        }

                        let (n_left, n_right) = if missing_go_to_left {
                            (p - start + n_missing, end_non_missing - p)
                        } else {
                            (p - start, end_non_missing - p + n_missing)
                        };
                        if n_left < min_samples_leaf || n_right < min_samples_leaf {
                            continue;
                        }

                        self.criterion.update(&self.samples, p);
                        if self.criterion.weighted_n_left() < min_weight_leaf
                            || self.criterion.weighted_n_right() < min_weight_leaf
                        {
                            continue;
                        }

                        // strictly greater, so the earliest candidate wins ties
                        let proxy = self.criterion.proxy_impurity_improvement();
                        if proxy > best_proxy {
                            best_proxy = proxy;
                            let mut threshold = values[p - 1] / 2.0 + values[p] / 2.0;
                            if threshold.is_infinite() || threshold == values[p] {
                                threshold = values[p - 1];
                            }
                            best = Some(Candidate {
                                row,
                                threshold,
                                missing_go_to_left,
                            });
                        }
                    }
                }
            }

            // all non-missing samples left, all missing samples right
            if n_missing > 0 {
                let n_left = end_non_missing - start;
                if n_left >= min_samples_leaf && n_missing >= min_samples_leaf {
                    self.criterion.set_missing_go_to_left(false);
                    self.criterion.reset();
                    self.criterion.update(&self.samples, end_non_missing);
                    if self.criterion.weighted_n_left() >= min_weight_leaf
                        && self.criterion.weighted_n_right() >= min_weight_leaf
                    {
                        let proxy = self.criterion.proxy_impurity_improvement();
                        if proxy > best_proxy {
                            best_proxy = proxy;
                            best = Some(Candidate {
                                row,
                                threshold: f64::MAX,
                                missing_go_to_left: false,
                            });
                        }
                    }
                }
            }
        }

        let candidate = match best {
            Some(c) => c,
            None => return Ok(None),
        };
        let projection = self.proj_mat[candidate.row].clone();
        let (n_left_non_missing, n_missing) = self.partition_final(&projection, candidate.threshold);
        let split_non_missing = start + n_left_non_missing;

        self.criterion.init_missing(&self.samples, n_missing);
        self.criterion.set_missing_go_to_left(candidate.missing_go_to_left);
        self.criterion.reset();
        self.criterion.update(&self.samples, split_non_missing);
        let (impurity_left, impurity_right) = self.criterion.children_impurity();
        let improvement = self
            .criterion
            .impurity_improvement(impurity, impurity_left, impurity_right);

        let mut pos = split_non_missing;
        if candidate.missing_go_to_left && n_missing > 0 {
            self.samples[split_non_missing..end].rotate_right(n_missing);
            pos += n_missing;
        }

        if improvement + EPSILON < self.params.min_impurity_decrease {
            return Ok(None);
        }

        // with no missing values seen, route them to the larger child
        let missing_go_to_left = if n_missing == 0 {
            pos - start > end - pos
        } else {
            candidate.missing_go_to_left
        };

        Ok(Some(SplitRecord {
            projection,
            threshold: candidate.threshold,
            pos,
            impurity_left,
            impurity_right,
            improvement,
            missing_go_to_left,
            n_missing,
        }))
    }

    /// Reorder the node range as `[left | right | missing]` for the winning
    /// projection, returning the non-missing left count and the missing count.
    fn partition_final(&mut self, projection: &Projection, threshold: f64) -> (usize, usize) {
        let (start, end) = (self.start, self.end);
        self.left_buffer.clear();
        self.right_buffer.clear();
        self.missing_buffer.clear();
        for &s in &self.samples[start..end] {
            let v = projection.dot(self.data, s);
            if is_missing(v) {
                self.missing_buffer.push(s);
            } else if v <= threshold {
                self.left_buffer.push(s);
            } else {
                self.right_buffer.push(s);
            }
        }
        let chunks = [&self.left_buffer, &self.right_buffer, &self.missing_buffer];
        let mut p = start;
        for chunk in chunks {
            self.samples[p..p + chunk.len()].copy_from_slice(chunk);
            p += chunk.len();
        }
        (self.left_buffer.len(), self.missing_buffer.len())
    }
}

/// Compute projected values for `samples`, stable sort the non-missing ones
/// ascending and move the missing ones to the end. Returns the missing count.
fn project_and_sort(
    data: &Matrix<f64>,
    projection: &Projection,
    samples: &mut [usize],
    values: &mut [f64],
    sort_buffer: &mut Vec<(f64, usize)>,
    missing_buffer: &mut Vec<usize>,
) -> usize {
    sort_buffer.clear();
    missing_buffer.clear();
    for &s in samples.iter() {
        let v = projection.dot(data, s);
        if is_missing(v) {
            missing_buffer.push(s);
        } else {
            sort_buffer.push((v, s));
        }
    }
    sort_buffer.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n_non_missing = sort_buffer.len();
    for (k, (v, s)) in sort_buffer.iter().enumerate() {
        samples[k] = *s;
        values[k] = *v;
    }
    for (k, s) in missing_buffer.iter().enumerate() {
        samples[n_non_missing + k] = *s;
        values[n_non_missing + k] = f64::NAN;
    }
    missing_buffer.len()
}
