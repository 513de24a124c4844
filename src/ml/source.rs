//! Per-call input data for leaf nodes.
//!
//! Leaf nodes only ever see a `Source`; how the data got there (real
//! preprocessed values or zero-filled placeholders) is not their concern.
//! Sources are built for one evaluation and dropped afterwards.

use super::{Matrix, Vector};
use crate::error::{GraphError, Result};

/// Slot-addressed access to the raw inputs of one evaluation.
#[cfg_attr(test, mockall::automock)]
pub trait Source {
    fn vector_at(&self, slot: usize) -> Result<Vector>;
    fn matrix_at(&self, slot: usize) -> Result<Matrix>;
}

fn slot_out_of_range(kind: &str, slot: usize, len: usize) -> GraphError {
    GraphError::Evaluation(format!(
        "{kind} slot {slot} out of range ({len} supplied)"
    ))
}

/// Source backed by concrete values, indexed positionally.
#[derive(Debug, Clone, Default)]
pub struct VectorSource {
    vectors: Vec<Vector>,
    matrices: Vec<Matrix>,
}

impl VectorSource {
    pub fn new(vectors: Vec<Vector>, matrices: Vec<Matrix>) -> Self {
        Self { vectors, matrices }
    }
}

impl Source for VectorSource {
    fn vector_at(&self, slot: usize) -> Result<Vector> {
        self.vectors
            .get(slot)
            .cloned()
            .ok_or_else(|| slot_out_of_range("vector", slot, self.vectors.len()))
    }

    fn matrix_at(&self, slot: usize) -> Result<Matrix> {
        self.matrices
            .get(slot)
            .cloned()
            .ok_or_else(|| slot_out_of_range("matrix", slot, self.matrices.len()))
    }
}

/// Source backed only by declared sizes; every value is zero-filled.
///
/// Used to dry-run a graph for shape consistency without real data.
#[derive(Debug, Clone, Default)]
pub struct DummySource {
    sizes: Vec<usize>,
    /// (time steps, width) per sequence slot
    matrix_sizes: Vec<(usize, usize)>,
}

impl DummySource {
    pub fn new(sizes: Vec<usize>, matrix_sizes: Vec<(usize, usize)>) -> Self {
        Self {
            sizes,
            matrix_sizes,
        }
    }
}

impl Source for DummySource {
    fn vector_at(&self, slot: usize) -> Result<Vector> {
        self.sizes
            .get(slot)
            .map(|&width| Vector::zeros(width))
            .ok_or_else(|| slot_out_of_range("vector", slot, self.sizes.len()))
    }

    fn matrix_at(&self, slot: usize) -> Result<Matrix> {
        self.matrix_sizes
            .get(slot)
            .map(|&shape| Matrix::zeros(shape))
            .ok_or_else(|| slot_out_of_range("matrix", slot, self.matrix_sizes.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn vector_source_indexes_positionally() {
        let source = VectorSource::new(
            vec![array![1.0, 2.0], array![3.0]],
            vec![array![[1.0, 2.0], [3.0, 4.0]]],
        );
        assert_eq!(source.vector_at(1).unwrap(), array![3.0]);
        assert_eq!(source.matrix_at(0).unwrap().nrows(), 2);
    }

    #[test]
    fn vector_source_out_of_range() {
        let source = VectorSource::new(vec![array![1.0]], vec![]);
        assert!(source.vector_at(1).unwrap_err().is_evaluation());
        assert!(source.matrix_at(0).unwrap_err().is_evaluation());
    }

    #[test]
    fn dummy_source_zero_fills() {
        let source = DummySource::new(vec![4], vec![(3, 2)]);
        assert_eq!(source.vector_at(0).unwrap(), Vector::zeros(4));
        assert_eq!(source.matrix_at(0).unwrap().dim(), (3, 2));
        assert!(source.vector_at(1).is_err());
        assert!(source.matrix_at(1).is_err());
    }
}
