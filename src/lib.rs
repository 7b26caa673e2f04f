// Modules
pub mod builder;
pub mod constants;
pub mod criterion;
pub mod data;
pub mod errors;
pub mod estimator;
pub mod forest;
pub mod grower;
pub mod node;
pub mod projection;
pub mod prune;
pub mod sampler;
pub mod splitter;
pub mod tree;
pub mod utils;

// Individual classes, and functions
pub use criterion::CriterionKind;
pub use data::{Matrix, RowMajorMatrix};
pub use errors::ObliqueTreeError;
pub use estimator::config::{MaxFeatures, TreeConfig, TreeIO};
pub use estimator::core::ObliqueDecisionTree;
pub use forest::{ForestConfig, ObliqueForest};
pub use projection::{PatchConfig, ProjectionPolicy};
pub use prune::{HonestConfig, HonestPrior};
pub use tree::Tree;
