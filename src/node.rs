use crate::constants::{TREE_LEAF, TREE_UNDEFINED};
use crate::utils::is_missing;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node of the tree arena.
///
/// Children are indices into the same arena; a leaf has both set to
/// [`TREE_LEAF`]. For internal nodes `feature` is the id of the projection
/// stored for the node, which is the node's own index.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Node {
    pub left_child: usize,
    pub right_child: usize,
    pub feature: usize,
    pub threshold: f64,
    pub impurity: f64,
    pub n_node_samples: usize,
    pub weighted_n_node_samples: f64,
    pub missing_go_to_left: bool,
}

impl Node {
    pub fn leaf(impurity: f64, n_node_samples: usize, weighted_n_node_samples: f64) -> Self {
        Node {
            left_child: TREE_LEAF,
            right_child: TREE_LEAF,
            feature: TREE_UNDEFINED,
            threshold: 0.0,
            impurity,
            n_node_samples,
            weighted_n_node_samples,
            missing_go_to_left: false,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.left_child == TREE_LEAF && self.right_child == TREE_LEAF
    }

    /// Get the path that should be traveled down, given a projected value.
    #[inline]
    pub fn get_child_idx(&self, v: f64) -> usize {
        if is_missing(v) {
            if self.missing_go_to_left {
                self.left_child
            } else {
                self.right_child
            }
        } else if v <= self.threshold {
            self.left_child
        } else {
            self.right_child
        }
    }

    /// Turn the node back into a leaf, keeping its statistics.
    pub fn make_leaf(&mut self) {
        self.left_child = TREE_LEAF;
        self.right_child = TREE_LEAF;
        self.feature = TREE_UNDEFINED;
        self.threshold = 0.0;
        self.missing_go_to_left = false;
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_leaf() {
            write!(
                f,
                "leaf,impurity={:.4},samples={},weight={}",
                self.impurity, self.n_node_samples, self.weighted_n_node_samples
            )
        } else {
            write!(
                f,
                "[p{} <= {}] yes={},no={},missing={},impurity={:.4},samples={}",
                self.feature,
                self.threshold,
                self.left_child,
                self.right_child,
                if self.missing_go_to_left {
                    self.left_child
                } else {
                    self.right_child
                },
                self.impurity,
                self.n_node_samples
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_routing() {
        let mut n = Node::leaf(0.5, 10, 10.0);
        assert!(n.is_leaf());
        n.left_child = 1;
        n.right_child = 2;
        n.feature = 0;
        n.threshold = 1.5;
        assert!(!n.is_leaf());
        assert_eq!(n.get_child_idx(1.5), 1);
        assert_eq!(n.get_child_idx(1.6), 2);
        assert_eq!(n.get_child_idx(f64::NAN), 2);
        n.missing_go_to_left = true;
        assert_eq!(n.get_child_idx(f64::NAN), 1);
        n.make_leaf();
        assert!(n.is_leaf());
        assert_eq!(n.n_node_samples, 10);
    }
}
