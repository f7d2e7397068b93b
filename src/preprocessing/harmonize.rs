//! Brings training and query vectors to one shared dimensionality.

use crate::ingest::ChangeVector;
use crate::primitives::Matrix;

/// Training and query vectors padded to a common length.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonizedSets {
    train: Vec<ChangeVector>,
    query: Vec<ChangeVector>,
    len: usize,
}

impl HarmonizedSets {
    /// Shared vector length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the harmonized length is 0 (both inputs empty or all-empty).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Padded training vectors.
    #[must_use]
    pub fn train(&self) -> &[ChangeVector] {
        &self.train
    }

    /// Padded query vectors.
    #[must_use]
    pub fn query(&self) -> &[ChangeVector] {
        &self.query
    }

    /// Training vectors as an `n_train x len` matrix.
    #[must_use]
    pub fn train_matrix(&self) -> Matrix<f32> {
        vectors_to_matrix(&self.train, self.len)
    }

    /// Query vectors as an `n_query x len` matrix.
    #[must_use]
    pub fn query_matrix(&self) -> Matrix<f32> {
        vectors_to_matrix(&self.query, self.len)
    }
}

/// Pads both collections on the right with zeros to the larger of their
/// maximum lengths.
///
/// Token order and values are untouched; nothing is ever truncated. Two
/// empty collections harmonize to length 0.
#[must_use]
pub fn harmonize(train: &[ChangeVector], query: &[ChangeVector]) -> HarmonizedSets {
    let len = train
        .iter()
        .chain(query)
        .map(ChangeVector::len)
        .max()
        .unwrap_or(0);

    HarmonizedSets {
        train: pad_all(train, len),
        query: pad_all(query, len),
        len,
    }
}

/// Right-pads every vector to at least `len`.
#[must_use]
pub fn pad_all(vectors: &[ChangeVector], len: usize) -> Vec<ChangeVector> {
    vectors.iter().map(|v| v.padded(len)).collect()
}

/// Stacks vectors into a row-major `f32` matrix with `cols` columns.
///
/// Shorter rows are zero-filled and longer rows cut at `cols`; callers pass
/// harmonized vectors, for which neither happens.
#[must_use]
pub fn vectors_to_matrix(vectors: &[ChangeVector], cols: usize) -> Matrix<f32> {
    let mut m = Matrix::zeros(vectors.len(), cols);
    for (i, v) in vectors.iter().enumerate() {
        for (slot, &token) in m.row_mut(i).iter_mut().zip(v.as_slice()) {
            *slot = token as f32;
        }
    }
    m
}
