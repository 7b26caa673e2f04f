use crate::constants::{GROWTH_FACTOR, INITIAL_CAPACITY, TREE_LEAF, TREE_UNDEFINED};
use crate::data::{Matrix, RowMajorMatrix};
use crate::errors::ObliqueTreeError;
use crate::node::Node;
use crate::projection::Projection;
use crate::splitter::SplitRule;
use hashbrown::HashSet;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{self, Display};

/// Arena of nodes with a sparse projection and a value row per node.
///
/// Node ids are positions in the arena. The projection of internal node `i`
/// is stored at position `i`, leaves store an empty projection. Values are a
/// flat buffer with `n_values` entries per node.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(from = "TreeState", into = "TreeState")]
pub struct Tree {
    pub n_features: usize,
    pub n_values: usize,
    pub max_depth: usize,
    nodes: Vec<Node>,
    values: Vec<f64>,
    projections: Vec<Projection>,
    capacity: usize,
}

/// Persisted form of a [`Tree`], the arena capacity is not part of it.
#[derive(Deserialize, Serialize)]
struct TreeState {
    n_features: usize,
    n_values: usize,
    max_depth: usize,
    nodes: Vec<Node>,
    #[serde(deserialize_with = "parse_values")]
    values: Vec<f64>,
    projections: Vec<Projection>,
}

fn parse_values<'de, D>(d: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Deserialize::deserialize(d).map(|x: Vec<Option<f64>>| x.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

// Trees compare by content, the spare arena capacity is ignored.
impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.n_features == other.n_features
            && self.n_values == other.n_values
            && self.max_depth == other.max_depth
            && self.nodes == other.nodes
            && self.values == other.values
            && self.projections == other.projections
    }
}

impl From<TreeState> for Tree {
    fn from(state: TreeState) -> Self {
        let capacity = state.nodes.len();
        Tree {
            n_features: state.n_features,
            n_values: state.n_values,
            max_depth: state.max_depth,
            nodes: state.nodes,
            values: state.values,
            projections: state.projections,
            capacity,
        }
    }
}

impl From<Tree> for TreeState {
    fn from(tree: Tree) -> Self {
        TreeState {
            n_features: tree.n_features,
            n_values: tree.n_values,
            max_depth: tree.max_depth,
            nodes: tree.nodes,
            values: tree.values,
            projections: tree.projections,
        }
    }
}

impl Tree {
    pub fn new(n_features: usize, n_values: usize) -> Self {
        Tree {
            n_features,
            n_values,
            max_depth: 0,
            nodes: Vec::new(),
            values: Vec::new(),
            projections: Vec::new(),
            capacity: 0,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, node_id: usize) -> &Node {
        &self.nodes[node_id]
    }

    /// The projection of an internal node, `None` for leaves.
    pub fn projection(&self, node_id: usize) -> Option<&Projection> {
        if self.nodes[node_id].is_leaf() {
            None
        } else {
            Some(&self.projections[node_id])
        }
    }

    pub fn value(&self, node_id: usize) -> &[f64] {
        &self.values[node_id * self.n_values..(node_id + 1) * self.n_values]
    }

    pub fn value_mut(&mut self, node_id: usize) -> &mut [f64] {
        &mut self.values[node_id * self.n_values..(node_id + 1) * self.n_values]
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Grow the arena by at least [`GROWTH_FACTOR`].
    fn grow(&mut self) -> Result<(), ObliqueTreeError> {
        let target = self
            .capacity
            .checked_mul(GROWTH_FACTOR)
            .ok_or(ObliqueTreeError::UnableToAllocate(usize::MAX))?
            .max(INITIAL_CAPACITY);
        let additional = target - self.nodes.len();
        let additional_values = additional
            .checked_mul(self.n_values)
            .ok_or(ObliqueTreeError::UnableToAllocate(target))?;
        self.nodes
            .try_reserve_exact(additional)
            .map_err(|_| ObliqueTreeError::UnableToAllocate(target))?;
        self.projections
            .try_reserve_exact(additional)
            .map_err(|_| ObliqueTreeError::UnableToAllocate(target))?;
        self.values
            .try_reserve_exact(additional_values)
            .map_err(|_| ObliqueTreeError::UnableToAllocate(target))?;
        debug!("Tree store capacity {} -> {}", self.capacity, target);
        self.capacity = target;
        Ok(())
    }

    /// Append a node and link it to `parent`, returning the new node id.
    ///
    /// With `split` the node is internal and keeps a copy of the projection,
    /// it stays childless until its children are added. Without `split` the
    /// node is a leaf.
    pub fn add_node(
        &mut self,
        parent: usize,
        is_left: bool,
        split: Option<SplitRule>,
        impurity: f64,
        n_node_samples: usize,
        weighted_n_node_samples: f64,
    ) -> Result<usize, ObliqueTreeError> {
        if self.nodes.len() >= self.capacity {
            self.grow()?;
        }
        let node_id = self.nodes.len();
        let mut node = Node::leaf(impurity, n_node_samples, weighted_n_node_samples);
        match split {
            Some(rule) => {
                node.feature = node_id;
                node.threshold = rule.threshold;
                node.missing_go_to_left = rule.missing_go_to_left;
                self.projections.push(rule.projection.clone());
            }
            None => self.projections.push(Projection::new()),
        }
        self.nodes.push(node);
        self.values.extend(std::iter::repeat(0.0).take(self.n_values));

        if parent != TREE_UNDEFINED {
            if is_left {
                self.nodes[parent].left_child = node_id;
            } else {
                self.nodes[parent].right_child = node_id;
            }
        }
        Ok(node_id)
    }

    pub fn set_value(&mut self, node_id: usize, value: &[f64]) {
        self.value_mut(node_id).copy_from_slice(value);
    }

    /// Turn a node into a leaf, dropping its projection.
    pub fn make_leaf(&mut self, node_id: usize) {
        self.nodes[node_id].make_leaf();
        self.projections[node_id].clear();
    }

    /// Evaluate the projection of `node_id` for one raw feature vector.
    #[inline]
    pub fn compute_feature_for_sample(&self, row: &[f64], node_id: usize) -> f64 {
        self.projections[node_id].dot_slice(row)
    }

    /// Leaf reached by `row` of `data`.
    pub fn apply_row(&self, data: &Matrix<f64>, row: usize) -> usize {
        let mut node_idx = 0;
        loop {
            let node = &self.nodes[node_idx];
            if node.is_leaf() {
                return node_idx;
            }
            node_idx = node.get_child_idx(self.projections[node_idx].dot(data, row));
        }
    }

    fn decision_path_row(&self, data: &Matrix<f64>, row: usize) -> Vec<usize> {
        let mut node_idx = 0;
        let mut path = vec![node_idx];
        while !self.nodes[node_idx].is_leaf() {
            node_idx = self.nodes[node_idx].get_child_idx(self.projections[node_idx].dot(data, row));
            path.push(node_idx);
        }
        path
    }

    fn check_data(&self, data: &Matrix<f64>) -> Result<(), ObliqueTreeError> {
        if self.nodes.is_empty() {
            return Err(ObliqueTreeError::NotFitted);
        }
        if data.cols != self.n_features {
            return Err(ObliqueTreeError::FeatureMismatch(self.n_features, data.cols));
        }
        Ok(())
    }

    /// Leaf id reached by every row of `data`.
    pub fn apply(&self, data: &Matrix<f64>, parallel: bool) -> Result<Vec<usize>, ObliqueTreeError> {
        self.check_data(data)?;
        if parallel {
            Ok(data.index.par_iter().map(|i| self.apply_row(data, *i)).collect())
        } else {
            Ok(data.index.iter().map(|i| self.apply_row(data, *i)).collect())
        }
    }

    /// Value row of the leaf reached by every row of `data`.
    pub fn predict(&self, data: &Matrix<f64>, parallel: bool) -> Result<RowMajorMatrix<f64>, ObliqueTreeError> {
        let leaves = self.apply(data, parallel)?;
        let mut out = Vec::with_capacity(leaves.len() * self.n_values);
        for leaf in &leaves {
            out.extend_from_slice(self.value(*leaf));
        }
        Ok(RowMajorMatrix::new(out, leaves.len(), self.n_values))
    }

    /// Node ids visited by every row of `data`, root first.
    pub fn decision_path(&self, data: &Matrix<f64>, parallel: bool) -> Result<Vec<Vec<usize>>, ObliqueTreeError> {
        self.check_data(data)?;
        if parallel {
            Ok(data.index.par_iter().map(|i| self.decision_path_row(data, *i)).collect())
        } else {
            Ok(data.index.iter().map(|i| self.decision_path_row(data, *i)).collect())
        }
    }

    /// Weighted impurity decrease attributed to every raw feature.
    ///
    /// The decrease of a split is shared among the features of its projection
    /// in proportion to the absolute projection weight, then divided by the
    /// root weight.
    pub fn compute_feature_importances(&self, normalize: bool) -> Vec<f64> {
        let mut importances = vec![0.0; self.n_features];
        if self.nodes.is_empty() {
            return importances;
        }
        for (node_id, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                continue;
            }
            let left = &self.nodes[node.left_child];
            let right = &self.nodes[node.right_child];
            let decrease = node.weighted_n_node_samples * node.impurity
                - left.weighted_n_node_samples * left.impurity
                - right.weighted_n_node_samples * right.impurity;
            let projection = &self.projections[node_id];
            let total: f64 = projection.weights.iter().map(|w| w.abs()).sum();
            if total > 0.0 {
                for (j, w) in projection.iter() {
                    importances[j] += decrease * w.abs() / total;
                }
            }
        }
        let root_weight = self.nodes[0].weighted_n_node_samples;
        if root_weight > 0.0 {
            importances.iter_mut().for_each(|v| *v /= root_weight);
        }
        if normalize {
            let total: f64 = importances.iter().sum();
            if total > 0.0 {
                importances.iter_mut().for_each(|v| *v /= total);
            }
        }
        importances
    }

    /// Check the arena invariants of a tree obtained from outside a build.
    pub fn validate(&self) -> Result<(), ObliqueTreeError> {
        let n = self.nodes.len();
        if self.projections.len() != n {
            return Err(ObliqueTreeError::CorruptTree(format!(
                "{} projections for {} nodes",
                self.projections.len(),
                n
            )));
        }
        if self.values.len() != n * self.n_values {
            return Err(ObliqueTreeError::CorruptTree(format!(
                "{} values for {} nodes with {} values each",
                self.values.len(),
                n,
                self.n_values
            )));
        }
        let mut n_parents = vec![0usize; n];
        for (node_id, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                continue;
            }
            if node.left_child == TREE_LEAF || node.right_child == TREE_LEAF {
                return Err(ObliqueTreeError::CorruptTree(format!("node {} has a single child", node_id)));
            }
            for child in [node.left_child, node.right_child] {
                if child <= node_id || child >= n {
                    return Err(ObliqueTreeError::CorruptTree(format!(
                        "node {} has child {} outside ({}, {})",
                        node_id, child, node_id, n
                    )));
                }
                n_parents[child] += 1;
            }
            if node.feature != node_id {
                return Err(ObliqueTreeError::CorruptTree(format!(
                    "node {} refers to projection {}",
                    node_id, node.feature
                )));
            }
            if node.threshold.is_nan() {
                return Err(ObliqueTreeError::CorruptTree(format!("node {} has a missing threshold", node_id)));
            }
            let projection = &self.projections[node_id];
            if projection.is_empty() || projection.indices.len() != projection.weights.len() {
                return Err(ObliqueTreeError::CorruptTree(format!(
                    "node {} has a malformed projection",
                    node_id
                )));
            }
            let mut seen = HashSet::with_capacity(projection.len());
            for idx in &projection.indices {
                if *idx >= self.n_features {
                    return Err(ObliqueTreeError::ProjectionIndexOutOfRange(*idx, self.n_features));
                }
                if !seen.insert(*idx) {
                    return Err(ObliqueTreeError::CorruptTree(format!(
                        "node {} repeats feature {} in its projection",
                        node_id, idx
                    )));
                }
            }
        }
        if let Some(node_id) = n_parents.iter().skip(1).position(|c| *c != 1) {
            return Err(ObliqueTreeError::CorruptTree(format!(
                "node {} is not reachable from exactly one parent",
                node_id + 1
            )));
        }
        Ok(())
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.nodes.is_empty() {
            return write!(f, "");
        }
        let mut print_buffer: Vec<(usize, usize)> = vec![(0, 0)];
        let mut r = String::new();
        while let Some((idx, depth)) = print_buffer.pop() {
            let node = &self.nodes[idx];
            r += format!("{}{}:{}", "      ".repeat(depth), idx, node).as_str();
            if node.is_leaf() {
                r += format!(",value=[{}]\n", crate::utils::fmt_vec_output(self.value(idx))).as_str();
            } else {
                r += format!(",projection={}\n", self.projections[idx]).as_str();
                print_buffer.push((node.right_child, depth + 1));
                print_buffer.push((node.left_child, depth + 1));
            }
        }
        write!(f, "{}", r)
    }
}
