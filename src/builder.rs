//! Builder
//!
//! Grows a [`Tree`] by repeatedly asking the [`Splitter`] for the best split
//! of a sample range. Both builders keep an explicit frontier, so the depth
//! of the tree never grows the call stack.
use crate::constants::{EPSILON, TREE_UNDEFINED};
use crate::errors::ObliqueTreeError;
use crate::grower::{FrontierRecord, Grower, StackRecord};
use crate::splitter::Splitter;
use crate::tree::Tree;
use log::debug;
use std::collections::BinaryHeap;
use std::time::Instant;

/// Stopping rules shared by the builders.
#[derive(Debug, Clone, Copy)]
pub struct BuilderParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub min_weight_leaf: f64,
    /// Seconds the whole build may take.
    pub timeout: Option<f32>,
}

impl BuilderParams {
    /// Whether a node must be a leaf regardless of its best split.
    fn forces_leaf(&self, depth: usize, n_node_samples: usize, weighted_n_node_samples: f64) -> bool {
        depth >= self.max_depth
            || n_node_samples < self.min_samples_split
            || n_node_samples < 2 * self.min_samples_leaf
            || weighted_n_node_samples < 2.0 * self.min_weight_leaf
    }

    fn check_deadline(&self, started: &Instant) -> Result<(), ObliqueTreeError> {
        match self.timeout {
            Some(t) if started.elapsed().as_secs_f32() > t => Err(ObliqueTreeError::FitTimeout(t)),
            _ => Ok(()),
        }
    }
}

pub trait TreeBuilder {
    /// Grow `tree` over every sample held by `splitter`.
    fn build(&self, splitter: &mut Splitter, tree: &mut Tree) -> Result<(), ObliqueTreeError>;
}

/// Expands nodes in preorder, node ids follow the order nodes are popped.
pub struct DepthFirstBuilder {
    params: BuilderParams,
}

impl DepthFirstBuilder {
    pub fn new(params: BuilderParams) -> Self {
        DepthFirstBuilder { params }
    }
}

impl TreeBuilder for DepthFirstBuilder {
    fn build(&self, splitter: &mut Splitter, tree: &mut Tree) -> Result<(), ObliqueTreeError> {
        let started = Instant::now();
        let mut stack: Vec<StackRecord> = Vec::new();
        stack.add_node(StackRecord {
            start: 0,
            end: splitter.n_samples(),
            depth: 0,
            parent: TREE_UNDEFINED,
            is_left: false,
            impurity: f64::INFINITY,
        });
        let mut max_depth_seen = 0;

        while let Some(record) = stack.get_next_node() {
            self.params.check_deadline(&started)?;
            let n_node_samples = record.end - record.start;
            let weighted_n_node_samples = splitter.reset(record.start, record.end);
            let impurity = if record.parent == TREE_UNDEFINED {
                splitter.node_impurity()
            } else {
                record.impurity
            };

            let split = if self
                .params
                .forces_leaf(record.depth, n_node_samples, weighted_n_node_samples)
                || impurity <= EPSILON
            {
                None
            } else {
                splitter.find_best_split(impurity)?
            };

            let node_id = tree.add_node(
                record.parent,
                record.is_left,
                split.as_ref().map(|s| s.rule()),
                impurity,
                n_node_samples,
                weighted_n_node_samples,
            )?;
            splitter.node_value(tree.value_mut(node_id));
            max_depth_seen = max_depth_seen.max(record.depth);

            if let Some(split) = split {
                stack.add_node(StackRecord {
                    start: split.pos,
                    end: record.end,
                    depth: record.depth + 1,
                    parent: node_id,
                    is_left: false,
                    impurity: split.impurity_right,
                });
                stack.add_node(StackRecord {
                    start: record.start,
                    end: split.pos,
                    depth: record.depth + 1,
                    parent: node_id,
                    is_left: true,
                    impurity: split.impurity_left,
                });
            }
        }
        tree.max_depth = max_depth_seen;
        debug!("Depth first build finished with {} nodes", tree.node_count());
        Ok(())
    }
}

/// Expands the node with the largest impurity improvement first, until the
/// tree holds `max_leaf_nodes` leaves.
pub struct BestFirstBuilder {
    params: BuilderParams,
    max_leaf_nodes: usize,
}

impl BestFirstBuilder {
    pub fn new(params: BuilderParams, max_leaf_nodes: usize) -> Self {
        BestFirstBuilder { params, max_leaf_nodes }
    }

    /// Commit the node for `[start, end)`, returning a frontier record when
    /// a split was found for it.
    #[allow(clippy::too_many_arguments)]
    fn add_split_node(
        &self,
        splitter: &mut Splitter,
        tree: &mut Tree,
        start: usize,
        end: usize,
        impurity: Option<f64>,
        depth: usize,
        parent: usize,
        is_left: bool,
    ) -> Result<Option<FrontierRecord>, ObliqueTreeError> {
        let n_node_samples = end - start;
        let weighted_n_node_samples = splitter.reset(start, end);
        let impurity = impurity.unwrap_or_else(|| splitter.node_impurity());

        let split = if self.params.forces_leaf(depth, n_node_samples, weighted_n_node_samples) || impurity <= EPSILON
        {
            None
        } else {
            splitter.find_best_split(impurity)?
        };

        let node_id = tree.add_node(
            parent,
            is_left,
            split.as_ref().map(|s| s.rule()),
            impurity,
            n_node_samples,
            weighted_n_node_samples,
        )?;
        splitter.node_value(tree.value_mut(node_id));
        tree.max_depth = tree.max_depth.max(depth);

        Ok(split.map(|s| FrontierRecord {
            node_id,
            start,
            end,
            pos: s.pos,
            depth,
            impurity_left: s.impurity_left,
            impurity_right: s.impurity_right,
            improvement: s.improvement,
        }))
    }
}

impl TreeBuilder for BestFirstBuilder {
    fn build(&self, splitter: &mut Splitter, tree: &mut Tree) -> Result<(), ObliqueTreeError> {
        let started = Instant::now();
        let max_split_nodes = self.max_leaf_nodes.saturating_sub(1);
        let mut frontier: BinaryHeap<FrontierRecord> = BinaryHeap::new();
        tree.max_depth = 0;

        let n_samples = splitter.n_samples();
        if let Some(root) = self.add_split_node(splitter, tree, 0, n_samples, None, 0, TREE_UNDEFINED, false)? {
            frontier.add_node(root);
        }

        let mut n_split_nodes = 0;
        while let Some(record) = frontier.get_next_node() {
            self.params.check_deadline(&started)?;
            if n_split_nodes >= max_split_nodes {
                tree.make_leaf(record.node_id);
                continue;
            }
            n_split_nodes += 1;

            let children = [
                (record.start, record.pos, record.impurity_left, true),
                (record.pos, record.end, record.impurity_right, false),
            ];
            for (start, end, impurity, is_left) in children {
                if let Some(child) = self.add_split_node(
                    splitter,
                    tree,
                    start,
                    end,
                    Some(impurity),
                    record.depth + 1,
                    record.node_id,
                    is_left,
                )? {
                    frontier.add_node(child);
                }
            }
        }
        debug!(
            "Best first build finished with {} nodes and {} leaves",
            tree.node_count(),
            tree.n_leaves()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::CriterionKind;
    use crate::data::Matrix;
    use crate::projection::ProjectionPolicy;
    use crate::splitter::SplitterParams;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn params(max_depth: usize) -> BuilderParams {
        BuilderParams {
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            min_weight_leaf: 0.0,
            timeout: None,
        }
    }

    fn xor_data(rows: usize) -> (Vec<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(1);
        let x: Vec<f64> = (0..rows * 2).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let y = (0..rows)
            .map(|i| if (x[i] > 0.0) == (x[rows + i] > 0.0) { 1.0 } else { 0.0 })
            .collect();
        (x, y)
    }

    fn fit(builder: &dyn TreeBuilder, x: &[f64], y: &[f64], rows: usize) -> Tree {
        let data = Matrix::new(x, rows, 2);
        let criterion = CriterionKind::Gini.build(y, None, 2, rows as f64);
        let mut splitter = Splitter::new(
            &data,
            criterion,
            ProjectionPolicy::AxisAligned.build(2).unwrap(),
            (0..rows).collect(),
            SplitterParams {
                max_features: 2,
                min_samples_leaf: 1,
                min_weight_leaf: 0.0,
                min_impurity_decrease: 0.0,
            },
            0,
        );
        let mut tree = Tree::new(2, 2);
        builder.build(&mut splitter, &mut tree).unwrap();
        tree
    }

    #[test]
    fn test_depth_first_fits_training_data() {
        let rows = 200;
        let (x, y) = xor_data(rows);
        let tree = fit(&DepthFirstBuilder::new(params(usize::MAX)), &x, &y, rows);
        let data = Matrix::new(&x, rows, 2);
        let preds = tree.predict(&data, false).unwrap();
        for (i, row) in preds.rows_iter().enumerate() {
            let class = if row[1] > row[0] { 1.0 } else { 0.0 };
            assert_eq!(class, y[i]);
        }
        assert!(tree.validate().is_ok());
        // preorder, so the left child of the root is always node 1
        assert_eq!(tree.node(0).left_child, 1);
        let root_value: f64 = tree.value(0).iter().sum();
        assert_eq!(root_value, rows as f64);
    }

    #[test]
    fn test_depth_limit() {
        let rows = 200;
        let (x, y) = xor_data(rows);
        let tree = fit(&DepthFirstBuilder::new(params(2)), &x, &y, rows);
        assert!(tree.max_depth <= 2);
        assert!(tree.n_leaves() <= 4);
        let stump = fit(&DepthFirstBuilder::new(params(0)), &x, &y, rows);
        assert_eq!(stump.node_count(), 1);
    }

    #[test]
    fn test_best_first_respects_leaf_budget() {
        let rows = 200;
        let (x, y) = xor_data(rows);
        for max_leaf_nodes in [2, 3, 5, 8] {
            let tree = fit(&BestFirstBuilder::new(params(usize::MAX), max_leaf_nodes), &x, &y, rows);
            assert_eq!(tree.n_leaves(), max_leaf_nodes);
            assert!(tree.validate().is_ok());
        }
    }

    #[test]
    fn test_pure_node_is_leaf() {
        let x = vec![0., 1., 2., 3., 0., 1., 2., 3.];
        let y = vec![1., 1., 1., 1.];
        let tree = fit(&DepthFirstBuilder::new(params(usize::MAX)), &x, &y, 4);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.value(0), &[0.0, 4.0]);
    }

    #[test]
    fn test_timeout() {
        let rows = 200;
        let (x, y) = xor_data(rows);
        let data = Matrix::new(&x, rows, 2);
        let criterion = CriterionKind::Gini.build(&y, None, 2, rows as f64);
        let mut splitter = Splitter::new(
            &data,
            criterion,
            ProjectionPolicy::AxisAligned.build(2).unwrap(),
            (0..rows).collect(),
            SplitterParams {
                max_features: 2,
                min_samples_leaf: 1,
                min_weight_leaf: 0.0,
                min_impurity_decrease: 0.0,
            },
            0,
        );
        let mut p = params(usize::MAX);
        p.timeout = Some(-1.0);
        let mut tree = Tree::new(2, 2);
        let res = DepthFirstBuilder::new(p).build(&mut splitter, &mut tree);
        assert!(matches!(res, Err(ObliqueTreeError::FitTimeout(_))));
    }
}
