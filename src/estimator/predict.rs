use crate::data::{Matrix, RowMajorMatrix};
use crate::errors::ObliqueTreeError;
use crate::estimator::core::ObliqueDecisionTree;
use crate::utils::{argmax, normalize_row};

impl ObliqueDecisionTree {
    /// Predict the class label, or the mean target for regression.
    ///
    /// * `data` - Column major data, with the same features the tree was fit on.
    /// * `parallel` - Traverse rows in parallel.
    pub fn predict(&self, data: &Matrix<f64>, parallel: bool) -> Result<Vec<f64>, ObliqueTreeError> {
        let values = self.fitted_tree()?.predict(data, parallel)?;
        if self.is_classifier() {
            Ok(values.rows_iter().map(|row| argmax(row) as f64).collect())
        } else {
            Ok(values.rows_iter().map(|row| row[0]).collect())
        }
    }

    /// Class probabilities, one row per sample and one column per class.
    pub fn predict_proba(&self, data: &Matrix<f64>, parallel: bool) -> Result<RowMajorMatrix<f64>, ObliqueTreeError> {
        if !self.is_classifier() {
            return Err(ObliqueTreeError::InvalidParameter(
                "criterion".to_string(),
                "a classification criterion".to_string(),
                format!("{:?}", self.cfg.criterion),
            ));
        }
        let mut values = self.fitted_tree()?.predict(data, parallel)?;
        let cols = values.cols;
        values.data.chunks_mut(cols).for_each(normalize_row);
        Ok(values)
    }

    /// Raw leaf statistics, weighted class counts or the mean target.
    pub fn predict_values(&self, data: &Matrix<f64>, parallel: bool) -> Result<RowMajorMatrix<f64>, ObliqueTreeError> {
        self.fitted_tree()?.predict(data, parallel)
    }

    /// Leaf id reached by every row.
    pub fn apply(&self, data: &Matrix<f64>, parallel: bool) -> Result<Vec<usize>, ObliqueTreeError> {
        self.fitted_tree()?.apply(data, parallel)
    }

    /// Node ids visited by every row, root first.
    pub fn decision_path(&self, data: &Matrix<f64>, parallel: bool) -> Result<Vec<Vec<usize>>, ObliqueTreeError> {
        self.fitted_tree()?.decision_path(data, parallel)
    }

    /// Impurity based importance of every raw feature.
    pub fn feature_importances(&self, normalize: bool) -> Result<Vec<f64>, ObliqueTreeError> {
        Ok(self.fitted_tree()?.compute_feature_importances(normalize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::CriterionKind;
    use crate::estimator::config::{MaxFeatures, TreeConfig};
    use crate::projection::ProjectionPolicy;

    #[test]
    fn test_predict_classification() {
        // class is 1 when x0 + x1 > 1
        let x0 = [0.1, 0.9, 0.3, 0.8, 0.2, 0.95, 0.4, 0.7];
        let x1 = [0.2, 0.6, 0.1, 0.9, 0.3, 0.5, 0.2, 0.8];
        let y: Vec<f64> = x0.iter().zip(x1).map(|(a, b)| if a + b > 1.0 { 1.0 } else { 0.0 }).collect();
        let x: Vec<f64> = x0.iter().chain(x1.iter()).copied().collect();
        let data = Matrix::new(&x, 8, 2);
        let mut model = ObliqueDecisionTree::new(TreeConfig {
            projection: ProjectionPolicy::SparseRandom {
                feature_combinations: Some(2.0),
            },
            max_features: MaxFeatures::Count(16),
            ..Default::default()
        });
        model.fit(&data, &y, None).unwrap();
        assert_eq!(model.predict(&data, false).unwrap(), y);
        assert_eq!(model.predict(&data, true).unwrap(), y);

        let proba = model.predict_proba(&data, false).unwrap();
        assert_eq!(proba.cols, 2);
        for (row, label) in proba.rows_iter().zip(&y) {
            assert_eq!(row[*label as usize], 1.0);
        }
        let imp = model.feature_importances(true).unwrap();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(model.apply(&data, false).unwrap().len(), 8);
        assert!(model.decision_path(&data, false).unwrap().iter().all(|p| p[0] == 0));
    }

    #[test]
    fn test_predict_regression() {
        let x = vec![0., 1., 2., 3., 4., 5.];
        let y = vec![1., 1., 1., 5., 5., 5.];
        let data = Matrix::new(&x, 6, 1);
        let mut model = ObliqueDecisionTree::new(TreeConfig {
            criterion: CriterionKind::SquaredError,
            projection: ProjectionPolicy::AxisAligned,
            max_depth: Some(1),
            ..Default::default()
        });
        model.fit(&data, &y, None).unwrap();
        assert_eq!(model.predict(&data, false).unwrap(), y);
        assert!(model.predict_proba(&data, false).is_err());
        let tree = model.fitted_tree().unwrap();
        assert_eq!(tree.node(0).threshold, 2.5);
        assert_eq!(tree.value(0), &[3.0]);
    }

    #[test]
    fn test_predict_before_fit() {
        let x = vec![0., 1.];
        let data = Matrix::new(&x, 1, 2);
        let model = ObliqueDecisionTree::default();
        assert!(matches!(model.predict(&data, false), Err(ObliqueTreeError::NotFitted)));
    }

    #[test]
    fn test_normalize_row() {
        let mut row = [1.0, 3.0];
        normalize_row(&mut row);
        assert_eq!(row, [0.25, 0.75]);
        let mut empty = [0.0, 0.0];
        normalize_row(&mut empty);
        assert_eq!(empty, [0.0, 0.0]);
    }
}
