//! Errors
//!
//! Custom error types used throughout the `obliquetree` crate.
use thiserror::Error;

/// Errors that can occur while fitting, pruning, predicting or persisting trees.
#[derive(Debug, Error)]
pub enum ObliqueTreeError {
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// The tree store could not grow to the requested capacity.
    #[error("Unable to allocate tree storage for {0} nodes.")]
    UnableToAllocate(usize),
    /// A sampled projection referenced a raw feature outside the data.
    #[error("Sampled projection index {0} is out of range for {1} features.")]
    ProjectionIndexOutOfRange(usize, usize),
    /// The number of columns differs from what the tree was fit with.
    #[error("Tree was fit with {0} features, but data with {1} features was provided.")]
    FeatureMismatch(usize, usize),
    /// First value names the buffer, second is the expected length, third the provided one.
    #[error("Length of {0} should be {1}, but {2} was provided.")]
    ShapeMismatch(String, usize, usize),
    /// Classification targets must be non-negative integers.
    #[error("Target value {0} is not a valid class label, expected a non-negative integer.")]
    InvalidTarget(f64),
    /// Sample weights must be finite and non-negative.
    #[error("Sample weight {0} is invalid, expected a finite non-negative value.")]
    InvalidSampleWeight(f64),
    /// No samples, or no sample mass, to fit on.
    #[error("Unable to fit on an empty dataset, or a dataset with zero total weight.")]
    EmptyDataset,
    /// Prediction was requested before fitting.
    #[error("The model has not been fit yet.")]
    NotFitted,
    /// A tree loaded from outside does not satisfy the node invariants.
    #[error("Tree structure is corrupt: {0}")]
    CorruptTree(String),
    /// The fit deadline passed before the tree was finished.
    #[error("Fitting did not finish within the {0} second timeout.")]
    FitTimeout(f32),
    /// Unable to write model to file.
    #[error("Unable to write model to file: {0}")]
    UnableToWrite(String),
    /// Unable to read model from file.
    #[error("Unable to read model from a file {0}")]
    UnableToRead(String),
}
