use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Trait for handling the growth of the tree.
pub trait Grower<T> {
    /// Add a node to the grower.
    fn add_node(&mut self, node: T);
    /// Get the next node to expand, `None` once the grower is empty.
    fn get_next_node(&mut self) -> Option<T>;
    /// Check if the grower is empty.
    fn is_empty(&self) -> bool;
}

/// Last in, first out. Pushing the right child before the left one expands
/// the tree in preorder.
impl<T> Grower<T> for Vec<T> {
    fn add_node(&mut self, node: T) {
        self.push(node);
    }

    fn get_next_node(&mut self) -> Option<T> {
        self.pop()
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Ord> Grower<T> for BinaryHeap<T> {
    fn add_node(&mut self, node: T) {
        self.push(node);
    }

    fn get_next_node(&mut self) -> Option<T> {
        self.pop()
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

/// A node range waiting to be split in depth-first order.
#[derive(Debug, Clone, Copy)]
pub struct StackRecord {
    pub start: usize,
    pub end: usize,
    pub depth: usize,
    pub parent: usize,
    pub is_left: bool,
    pub impurity: f64,
}

/// A node already committed with a split, waiting to have its children
/// expanded in best-first order.
#[derive(Debug, Clone, Copy)]
pub struct FrontierRecord {
    pub node_id: usize,
    pub start: usize,
    pub end: usize,
    pub pos: usize,
    pub depth: usize,
    pub impurity_left: f64,
    pub impurity_right: f64,
    pub improvement: f64,
}

impl PartialEq for FrontierRecord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierRecord {}

impl PartialOrd for FrontierRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Larger improvement first, ties go to the node created first.
impl Ord for FrontierRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.improvement
            .total_cmp(&other.improvement)
            .then_with(|| other.node_id.cmp(&self.node_id))
    }
}
