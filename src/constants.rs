/// Child index marking a node as a leaf.
pub const TREE_LEAF: usize = usize::MAX;
/// Parent index of the root, and feature id of leaves.
pub const TREE_UNDEFINED: usize = usize::MAX;
/// Capacity reserved for the first growth of an empty tree store.
pub const INITIAL_CAPACITY: usize = 3;
/// Minimum factor by which the tree store capacity grows.
pub const GROWTH_FACTOR: usize = 2;
/// Projected values closer than this are treated as equal during split search.
pub const FEATURE_THRESHOLD: f64 = 1e-7;
/// Impurities below this are considered pure.
pub const EPSILON: f64 = f64::EPSILON;
