use crate::criterion::CriterionKind;
use crate::estimator::config::MaxFeatures;
use crate::estimator::core::ObliqueDecisionTree;
use crate::projection::ProjectionPolicy;

impl ObliqueDecisionTree {
    // Set methods for parameters

    /// Set the criterion on the tree.
    /// * `criterion` - Impurity criterion, Gini or Entropy classify, SquaredError regresses.
    pub fn set_criterion(mut self, criterion: CriterionKind) -> Self {
        self.cfg.criterion = criterion;
        self
    }

    /// Set the number of candidate projections drawn at each node.
    pub fn set_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.cfg.max_features = max_features;
        self
    }

    /// Set the maximum depth of the tree.
    /// * `max_depth` - `None` grows until the leaves are pure or too small to split.
    pub fn set_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.cfg.max_depth = max_depth;
        self
    }

    pub fn set_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.cfg.min_samples_split = min_samples_split;
        self
    }

    pub fn set_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.cfg.min_samples_leaf = min_samples_leaf;
        self
    }

    pub fn set_min_weight_leaf(mut self, min_weight_leaf: f64) -> Self {
        self.cfg.min_weight_leaf = min_weight_leaf;
        self
    }

    pub fn set_min_impurity_decrease(mut self, min_impurity_decrease: f64) -> Self {
        self.cfg.min_impurity_decrease = min_impurity_decrease;
        self
    }

    /// Set the leaf budget, growing the tree best-first when set.
    pub fn set_max_leaf_nodes(mut self, max_leaf_nodes: Option<usize>) -> Self {
        self.cfg.max_leaf_nodes = max_leaf_nodes;
        self
    }

    /// Set the projection sampling policy.
    pub fn set_projection(mut self, projection: ProjectionPolicy) -> Self {
        self.cfg.projection = projection;
        self
    }

    /// Set the seed of the splitter random stream.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.cfg.seed = seed;
        self
    }

    /// Set the fit timeout, in seconds.
    pub fn set_timeout(mut self, timeout: Option<f32>) -> Self {
        self.cfg.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters() {
        let model = ObliqueDecisionTree::default()
            .set_criterion(CriterionKind::SquaredError)
            .set_max_features(MaxFeatures::Sqrt)
            .set_max_depth(Some(3))
            .set_min_samples_split(4)
            .set_min_samples_leaf(2)
            .set_min_weight_leaf(0.5)
            .set_min_impurity_decrease(0.01)
            .set_max_leaf_nodes(Some(6))
            .set_projection(ProjectionPolicy::AxisAligned)
            .set_seed(11)
            .set_timeout(Some(5.0));
        assert_eq!(model.cfg.criterion, CriterionKind::SquaredError);
        assert_eq!(model.cfg.max_features, MaxFeatures::Sqrt);
        assert_eq!(model.cfg.max_depth, Some(3));
        assert_eq!(model.cfg.min_samples_split, 4);
        assert_eq!(model.cfg.min_samples_leaf, 2);
        assert_eq!(model.cfg.max_leaf_nodes, Some(6));
        assert_eq!(model.cfg.projection, ProjectionPolicy::AxisAligned);
        assert_eq!(model.cfg.seed, 11);
        assert!(model.cfg.validate().is_ok());
    }
}
