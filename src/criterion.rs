//! Criterion
//!
//! Impurity criteria evaluated over ranges of the shared sample buffer. The
//! splitter owns the buffer and hands the criterion a view on every call; the
//! criterion owns references to the targets and weights for the whole fit.
//!
//! Within a node range `[start, end)` the last `n_missing` samples are the ones
//! whose projected value is missing. Left statistics cover `[start, pos)` plus
//! the missing block when `missing_go_to_left` is set.
use crate::utils::validate_float_parameter;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::ObliqueTreeError;
use crate::utils::items_to_strings;

/// Impurity measure used to score splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriterionKind {
    /// Gini impurity over weighted class counts.
    Gini,
    /// Shannon entropy, in bits, over weighted class counts.
    Entropy,
    /// Weighted variance of a continuous target.
    SquaredError,
}

impl CriterionKind {
    pub fn is_classification(&self) -> bool {
        !matches!(self, CriterionKind::SquaredError)
    }

    /// Build a criterion bound to the targets and weights of a fit.
    ///
    /// * `n_classes` - Number of classes, ignored for regression.
    pub fn build<'a>(
        &self,
        y: &'a [f64],
        sample_weight: Option<&'a [f64]>,
        n_classes: usize,
        weighted_n_samples: f64,
    ) -> Box<dyn Criterion + 'a> {
        match self {
            CriterionKind::Gini => Box::new(ClassificationCriterion::new(
                ClassImpurity::Gini,
                y,
                sample_weight,
                n_classes,
                weighted_n_samples,
            )),
            CriterionKind::Entropy => Box::new(ClassificationCriterion::new(
                ClassImpurity::Entropy,
                y,
                sample_weight,
                n_classes,
                weighted_n_samples,
            )),
            CriterionKind::SquaredError => {
                Box::new(SquaredErrorCriterion::new(y, sample_weight, weighted_n_samples))
            }
        }
    }
}

impl FromStr for CriterionKind {
    type Err = ObliqueTreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gini" | "Gini" => Ok(CriterionKind::Gini),
            "entropy" | "Entropy" => Ok(CriterionKind::Entropy),
            "squared_error" | "SquaredError" => Ok(CriterionKind::SquaredError),
            _ => Err(ObliqueTreeError::InvalidParameter(
                "criterion".to_string(),
                items_to_strings(vec!["gini", "entropy", "squared_error"]),
                s.to_string(),
            )),
        }
    }
}

/// Statistics over a node's sample range, updated incrementally as the split
/// position moves left to right.
pub trait Criterion: Send {
    /// Bind the criterion to the node range `[start, end)` and reset it.
    fn init(&mut self, samples: &[usize], start: usize, end: usize);
    /// Accumulate the statistics of the last `n_missing` samples of the range.
    fn init_missing(&mut self, samples: &[usize], n_missing: usize);
    fn set_missing_go_to_left(&mut self, missing_go_to_left: bool);
    /// Move the split position back to `start`.
    fn reset(&mut self);
    /// Move the split position to `new_pos`, shifting `[pos, new_pos)` to the left.
    fn update(&mut self, samples: &[usize], new_pos: usize);
    fn node_impurity(&self) -> f64;
    /// Impurity of the (left, right) children at the current position.
    fn children_impurity(&self) -> (f64, f64);
    fn node_value(&self, dest: &mut [f64]);
    fn weighted_n_samples(&self) -> f64;
    fn weighted_n_node_samples(&self) -> f64;
    fn weighted_n_left(&self) -> f64;
    fn weighted_n_right(&self) -> f64;

    /// A cheaper quantity ordered the same way as the impurity improvement,
    /// used to rank split positions.
    fn proxy_impurity_improvement(&self) -> f64 {
        let (impurity_left, impurity_right) = self.children_impurity();
        -self.weighted_n_right() * impurity_right - self.weighted_n_left() * impurity_left
    }

    /// Weighted impurity decrease of the split, relative to the whole fit.
    fn impurity_improvement(&self, impurity_parent: f64, impurity_left: f64, impurity_right: f64) -> f64 {
        let w_node = self.weighted_n_node_samples();
        (w_node / self.weighted_n_samples())
            * (impurity_parent
                - (self.weighted_n_right() / w_node) * impurity_right
                - (self.weighted_n_left() / w_node) * impurity_left)
    }
}

#[inline]
fn sample_weight_of(sample_weight: Option<&[f64]>, i: usize) -> f64 {
    match sample_weight {
        Some(w) => w[i],
        None => 1.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassImpurity {
    Gini,
    Entropy,
}

impl ClassImpurity {
    fn of(&self, counts: &[f64], total: f64) -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        match self {
            ClassImpurity::Gini => {
                let sq: f64 = counts.iter().map(|c| c * c).sum();
                1.0 - sq / (total * total)
            }
            ClassImpurity::Entropy => counts
                .iter()
                .filter(|c| **c > 0.0)
                .map(|c| {
                    let p = c / total;
                    -p * p.log2()
                })
                .sum(),
        }
    }
}

pub struct ClassificationCriterion<'a> {
    impurity: ClassImpurity,
    y: &'a [f64],
    sample_weight: Option<&'a [f64]>,
    n_classes: usize,
    weighted_n_samples: f64,
    start: usize,
    pos: usize,
    end: usize,
    n_missing: usize,
    missing_go_to_left: bool,
    sum_total: Vec<f64>,
    sum_left: Vec<f64>,
    sum_right: Vec<f64>,
    sum_missing: Vec<f64>,
    weighted_n_node_samples: f64,
    weighted_n_left: f64,
    weighted_n_right: f64,
    weighted_n_missing: f64,
}

impl<'a> ClassificationCriterion<'a> {
    pub fn new(
        impurity: ClassImpurity,
        y: &'a [f64],
        sample_weight: Option<&'a [f64]>,
        n_classes: usize,
        weighted_n_samples: f64,
    ) -> Self {
        ClassificationCriterion {
            impurity,
            y,
            sample_weight,
            n_classes,
            weighted_n_samples,
            start: 0,
            pos: 0,
            end: 0,
            n_missing: 0,
            missing_go_to_left: false,
            sum_total: vec![0.0; n_classes],
            sum_left: vec![0.0; n_classes],
            sum_right: vec![0.0; n_classes],
            sum_missing: vec![0.0; n_classes],
            weighted_n_node_samples: 0.0,
            weighted_n_left: 0.0,
            weighted_n_right: 0.0,
            weighted_n_missing: 0.0,
        }
    }

    #[inline]
    fn class_of(&self, i: usize) -> usize {
        self.y[i] as usize
    }
}

impl<'a> Criterion for ClassificationCriterion<'a> {
    fn init(&mut self, samples: &[usize], start: usize, end: usize) {
        self.start = start;
        self.end = end;
        self.n_missing = 0;
        self.sum_total.iter_mut().for_each(|v| *v = 0.0);
        self.sum_missing.iter_mut().for_each(|v| *v = 0.0);
        self.weighted_n_missing = 0.0;
        self.weighted_n_node_samples = 0.0;
        for &i in &samples[start..end] {
            let w = sample_weight_of(self.sample_weight, i);
            let c = self.class_of(i);
            self.sum_total[c] += w;
            self.weighted_n_node_samples += w;
        }
        self.reset();
    }

    fn init_missing(&mut self, samples: &[usize], n_missing: usize) {
        self.n_missing = n_missing;
        self.sum_missing.iter_mut().for_each(|v| *v = 0.0);
        self.weighted_n_missing = 0.0;
        for &i in &samples[self.end - n_missing..self.end] {
            let w = sample_weight_of(self.sample_weight, i);
            let c = self.class_of(i);
            self.sum_missing[c] += w;
            self.weighted_n_missing += w;
        }
    }

    fn set_missing_go_to_left(&mut self, missing_go_to_left: bool) {
        self.missing_go_to_left = missing_go_to_left;
    }

    fn reset(&mut self) {
        self.pos = self.start;
        if self.missing_go_to_left {
            self.sum_left.copy_from_slice(&self.sum_missing);
            self.weighted_n_left = self.weighted_n_missing;
        } else {
            self.sum_left.iter_mut().for_each(|v| *v = 0.0);
            self.weighted_n_left = 0.0;
        }
        for c in 0..self.n_classes {
            self.sum_right[c] = self.sum_total[c] - self.sum_left[c];
        }
        self.weighted_n_right = self.weighted_n_node_samples - self.weighted_n_left;
    }

    fn update(&mut self, samples: &[usize], new_pos: usize) {
        for &i in &samples[self.pos..new_pos] {
            let w = sample_weight_of(self.sample_weight, i);
            let c = self.class_of(i);
            self.sum_left[c] += w;
            self.weighted_n_left += w;
        }
        for c in 0..self.n_classes {
            self.sum_right[c] = self.sum_total[c] - self.sum_left[c];
        }
        self.weighted_n_right = self.weighted_n_node_samples - self.weighted_n_left;
        self.pos = new_pos;
    }

    fn node_impurity(&self) -> f64 {
        self.impurity.of(&self.sum_total, self.weighted_n_node_samples)
    }

    fn children_impurity(&self) -> (f64, f64) {
        (
            self.impurity.of(&self.sum_left, self.weighted_n_left),
            self.impurity.of(&self.sum_right, self.weighted_n_right),
        )
    }

    fn node_value(&self, dest: &mut [f64]) {
        dest.copy_from_slice(&self.sum_total);
    }

    fn weighted_n_samples(&self) -> f64 {
        self.weighted_n_samples
    }

    fn weighted_n_node_samples(&self) -> f64 {
        self.weighted_n_node_samples
    }

    fn weighted_n_left(&self) -> f64 {
        self.weighted_n_left
    }

    fn weighted_n_right(&self) -> f64 {
        self.weighted_n_right
    }
}

pub struct SquaredErrorCriterion<'a> {
    y: &'a [f64],
    sample_weight: Option<&'a [f64]>,
    weighted_n_samples: f64,
    start: usize,
    pos: usize,
    end: usize,
    missing_go_to_left: bool,
    sum_total: f64,
    sq_sum_total: f64,
    sum_left: f64,
    sq_sum_left: f64,
    sum_missing: f64,
    sq_sum_missing: f64,
    weighted_n_node_samples: f64,
    weighted_n_left: f64,
    weighted_n_missing: f64,
}

impl<'a> SquaredErrorCriterion<'a> {
    pub fn new(y: &'a [f64], sample_weight: Option<&'a [f64]>, weighted_n_samples: f64) -> Self {
        SquaredErrorCriterion {
            y,
            sample_weight,
            weighted_n_samples,
            start: 0,
            pos: 0,
            end: 0,
            missing_go_to_left: false,
            sum_total: 0.0,
            sq_sum_total: 0.0,
            sum_left: 0.0,
            sq_sum_left: 0.0,
            sum_missing: 0.0,
            sq_sum_missing: 0.0,
            weighted_n_node_samples: 0.0,
            weighted_n_left: 0.0,
            weighted_n_missing: 0.0,
        }
    }

    fn variance(sum: f64, sq_sum: f64, w: f64) -> f64 {
        if w <= 0.0 {
            return 0.0;
        }
        let mean = sum / w;
        // guard the tiny negative values cancellation can produce
        (sq_sum / w - mean * mean).max(0.0)
    }
}

impl<'a> Criterion for SquaredErrorCriterion<'a> {
    fn init(&mut self, samples: &[usize], start: usize, end: usize) {
        self.start = start;
        self.end = end;
        self.sum_total = 0.0;
        self.sq_sum_total = 0.0;
        self.weighted_n_node_samples = 0.0;
        self.sum_missing = 0.0;
        self.sq_sum_missing = 0.0;
        self.weighted_n_missing = 0.0;
        for &i in &samples[start..end] {
            let w = sample_weight_of(self.sample_weight, i);
            let y = self.y[i];
            self.sum_total += w * y;
            self.sq_sum_total += w * y * y;
            self.weighted_n_node_samples += w;
        }
        self.reset();
    }

    fn init_missing(&mut self, samples: &[usize], n_missing: usize) {
        self.sum_missing = 0.0;
        self.sq_sum_missing = 0.0;
        self.weighted_n_missing = 0.0;
        for &i in &samples[self.end - n_missing..self.end] {
            let w = sample_weight_of(self.sample_weight, i);
            let y = self.y[i];
            self.sum_missing += w * y;
            self.sq_sum_missing += w * y * y;
            self.weighted_n_missing += w;
        }
    }

    fn set_missing_go_to_left(&mut self, missing_go_to_left: bool) {
        self.missing_go_to_left = missing_go_to_left;
    }

    fn reset(&mut self) {
        self.pos = self.start;
        if self.missing_go_to_left {
            self.sum_left = self.sum_missing;
            self.sq_sum_left = self.sq_sum_missing;
            self.weighted_n_left = self.weighted_n_missing;
        } else {
            self.sum_left = 0.0;
            self.sq_sum_left = 0.0;
            self.weighted_n_left = 0.0;
        }
    }

    fn update(&mut self, samples: &[usize], new_pos: usize) {
        for &i in &samples[self.pos..new_pos] {
            let w = sample_weight_of(self.sample_weight, i);
            let y = self.y[i];
            self.sum_left += w * y;
            self.sq_sum_left += w * y * y;
            self.weighted_n_left += w;
        }
        self.pos = new_pos;
    }

    fn node_impurity(&self) -> f64 {
        Self::variance(self.sum_total, self.sq_sum_total, self.weighted_n_node_samples)
    }

    fn children_impurity(&self) -> (f64, f64) {
        (
            Self::variance(self.sum_left, self.sq_sum_left, self.weighted_n_left),
            Self::variance(
                self.sum_total - self.sum_left,
                self.sq_sum_total - self.sq_sum_left,
                self.weighted_n_right(),
            ),
        )
    }

    fn node_value(&self, dest: &mut [f64]) {
        dest[0] = if self.weighted_n_node_samples > 0.0 {
            self.sum_total / self.weighted_n_node_samples
        } else {
            0.0
        };
    }

    fn weighted_n_samples(&self) -> f64 {
        self.weighted_n_samples
    }

    fn weighted_n_node_samples(&self) -> f64 {
        self.weighted_n_node_samples
    }

    fn weighted_n_left(&self) -> f64 {
        self.weighted_n_left
    }

    fn weighted_n_right(&self) -> f64 {
        self.weighted_n_node_samples - self.weighted_n_left
    }

    fn proxy_impurity_improvement(&self) -> f64 {
        let w_right = self.weighted_n_right();
        let sum_right = self.sum_total - self.sum_left;
        let mut proxy = 0.0;
        if self.weighted_n_left > 0.0 {
            proxy += self.sum_left * self.sum_left / self.weighted_n_left;
        }
        if w_right > 0.0 {
            proxy += sum_right * sum_right / w_right;
        }
        proxy
    }
}

/// Check a target range for use with a regression criterion.
pub fn validate_regression_targets(y: &[f64]) -> Result<(), ObliqueTreeError> {
    for v in y {
        validate_float_parameter(*v, f64::MIN, f64::MAX, "y")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::precision_round;

    #[test]
    fn test_gini_incremental_matches_direct() {
        let y = vec![0., 0., 1., 1., 1., 2.];
        let samples: Vec<usize> = (0..6).collect();
        let mut c = ClassificationCriterion::new(ClassImpurity::Gini, &y, None, 3, 6.0);
        c.init(&samples, 0, 6);
        let expected = 1.0 - (4.0 + 9.0 + 1.0) / 36.0;
        assert_eq!(precision_round(c.node_impurity(), 10), precision_round(expected, 10));
        c.update(&samples, 2);
        let (left, right) = c.children_impurity();
        assert_eq!(left, 0.0);
        assert_eq!(precision_round(right, 10), precision_round(1.0 - (9.0 + 1.0) / 16.0, 10));
        assert_eq!(c.weighted_n_left(), 2.0);
        assert_eq!(c.weighted_n_right(), 4.0);
        let mut value = vec![0.0; 3];
        c.node_value(&mut value);
        assert_eq!(value, vec![2., 3., 1.]);
    }

    #[test]
    fn test_entropy_in_bits() {
        let y = vec![0., 1., 0., 1.];
        let samples: Vec<usize> = (0..4).collect();
        let mut c = ClassificationCriterion::new(ClassImpurity::Entropy, &y, None, 2, 4.0);
        c.init(&samples, 0, 4);
        assert_eq!(precision_round(c.node_impurity(), 10), 1.0);
    }

    #[test]
    fn test_weighted_classification() {
        let y = vec![0., 1., 1.];
        let w = vec![2., 1., 1.];
        let samples: Vec<usize> = (0..3).collect();
        let mut c = ClassificationCriterion::new(ClassImpurity::Gini, &y, Some(&w), 2, 4.0);
        c.init(&samples, 0, 3);
        assert_eq!(c.weighted_n_node_samples(), 4.0);
        assert_eq!(precision_round(c.node_impurity(), 10), 0.5);
        c.update(&samples, 1);
        let (l, r) = c.children_impurity();
        assert_eq!((l, r), (0.0, 0.0));
        assert_eq!(precision_round(c.impurity_improvement(0.5, l, r), 10), 0.5);
    }

    #[test]
    fn test_missing_goes_left() {
        // samples 3 and 4 are the missing block at the end of the range
        let y = vec![0., 0., 1., 1., 0.];
        let samples: Vec<usize> = (0..5).collect();
        let mut c = ClassificationCriterion::new(ClassImpurity::Gini, &y, None, 2, 5.0);
        c.init(&samples, 0, 5);
        c.init_missing(&samples, 2);
        c.set_missing_go_to_left(true);
        c.reset();
        assert_eq!(c.weighted_n_left(), 2.0);
        c.update(&samples, 2);
        assert_eq!(c.weighted_n_left(), 4.0);
        assert_eq!(c.weighted_n_right(), 1.0);
        c.set_missing_go_to_left(false);
        c.reset();
        c.update(&samples, 2);
        assert_eq!(c.weighted_n_left(), 2.0);
        assert_eq!(c.weighted_n_right(), 3.0);
    }

    #[test]
    fn test_squared_error() {
        let y = vec![1., 1., 3., 3.];
        let samples: Vec<usize> = (0..4).collect();
        let mut c = SquaredErrorCriterion::new(&y, None, 4.0);
        c.init(&samples, 0, 4);
        assert_eq!(c.node_impurity(), 1.0);
        let mut value = vec![0.0];
        c.node_value(&mut value);
        assert_eq!(value, vec![2.0]);
        let before = c.proxy_impurity_improvement();
        c.update(&samples, 2);
        assert_eq!(c.children_impurity(), (0.0, 0.0));
        assert!(c.proxy_impurity_improvement() > before);
        assert_eq!(c.impurity_improvement(1.0, 0.0, 0.0), 1.0);
    }

    #[test]
    fn test_criterion_from_str() {
        assert_eq!("gini".parse::<CriterionKind>().unwrap(), CriterionKind::Gini);
        assert_eq!("squared_error".parse::<CriterionKind>().unwrap(), CriterionKind::SquaredError);
        assert!("mae".parse::<CriterionKind>().is_err());
    }
}
