//! Data
//!
//! Dense matrix containers used to pass raw features into the tree engine and
//! per-sample statistics back out of it.
use crate::errors::ObliqueTreeError;
use serde::{Deserialize, Serialize};

/// Contiguous Column Major Matrix data container.
///
/// This structure borrows a dense matrix of values stored in a single contiguous
/// memory block in column-major order (Fortran-style). Projections read a handful
/// of columns per sample, so column slices stay cache friendly during split search.
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Indices into the data row-wise.
    pub index: Vec<usize>,
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
}

impl<'a, T> Matrix<'a, T> {
    /// Create a new column major Matrix.
    ///
    /// Panics if `data` does not hold exactly `rows * cols` items, use
    /// [`Matrix::try_new`] when the shape comes from user input.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        assert_eq!(data.len(), rows * cols, "Matrix data must hold rows * cols items");
        Matrix {
            data,
            index: (0..rows).collect(),
            rows,
            cols,
        }
    }

    /// Create a new column major Matrix, validating the shape.
    pub fn try_new(data: &'a [T], rows: usize, cols: usize) -> Result<Self, ObliqueTreeError> {
        let expected = rows
            .checked_mul(cols)
            .ok_or_else(|| ObliqueTreeError::ShapeMismatch("data".to_string(), usize::MAX, data.len()))?;
        if data.len() != expected {
            return Err(ObliqueTreeError::ShapeMismatch("data".to_string(), expected, data.len()));
        }
        Ok(Self::new(data, rows, cols))
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - the jth column of the data to get.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[j * self.rows + i]
    }
}

/// A lightweight row major matrix that owns its data, used for returning
/// per-sample results such as leaf statistics or class probabilities.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RowMajorMatrix<T> {
    /// The raw data in row-major order.
    pub data: Vec<T>,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl<T> RowMajorMatrix<T> {
    /// Create a new row major matrix.
    pub fn new(data: Vec<T>, rows: usize, cols: usize) -> Self {
        assert_eq!(data.len(), rows * cols, "RowMajorMatrix data must hold rows * cols items");
        RowMajorMatrix { data, rows, cols }
    }

    /// Iterate over the rows of the matrix.
    pub fn rows_iter(&self) -> std::slice::Chunks<'_, T> {
        self.data.chunks(self.cols.max(1))
    }
}
