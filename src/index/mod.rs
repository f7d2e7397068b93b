//! Exact k-nearest-neighbor search over latent vectors.
//!
//! Distances are weighted per dimension (uniform weights by default) and
//! results are ordered by distance, with equal distances resolved by the
//! lower training index.
//!
//! # Example
//!
//! ```
//! use simfin::index::SimilarityIndex;
//! use simfin::primitives::Matrix;
//!
//! let train = Matrix::from_vec(3, 2, vec![
//!     0.0, 0.0,
//!     1.0, 1.0,
//!     0.0, 0.0,
//! ]).expect("3x2");
//! let index = SimilarityIndex::new(train).expect("non-empty");
//!
//! let hits = index.query(&[0.0, 0.5], 2).expect("valid query");
//! assert_eq!(hits[0].train_index, 0);
//! assert_eq!(hits[1].train_index, 2);
//! assert_eq!(hits[1].rank, 2);
//! ```

use crate::error::{Result, SimfinError};
use crate::primitives::Matrix;
use serde::{Deserialize, Serialize};

/// Distance metric for neighbor search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Weighted Manhattan (cityblock) distance: `sum(w_i * |x_i - y_i|)`
    #[default]
    Manhattan,
    /// Weighted Euclidean distance: `sqrt(sum(w_i * (x_i - y_i)^2))`
    Euclidean,
}

impl DistanceMetric {
    /// Distance between `a` and `b` under per-dimension `weights`.
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32], weights: &[f32]) -> f32 {
        let terms = a.iter().zip(b).zip(weights);
        match self {
            Self::Manhattan => terms.map(|((x, y), w)| w * (x - y).abs()).sum(),
            Self::Euclidean => terms
                .map(|((x, y), w)| w * (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

/// Neighbor search settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Neighbors returned per query.
    pub k: usize,
    /// Distance metric.
    pub metric: DistanceMetric,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            k: 10,
            metric: DistanceMetric::Manhattan,
        }
    }
}

impl IndexConfig {
    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::InvalidHyperparameter`] when `k` is 0.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(SimfinError::invalid_hyperparameter("k", 0, ">= 1"));
        }
        Ok(())
    }
}

/// One retrieved training instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeighborMatch {
    /// Row of the matched instance in the training set.
    pub train_index: usize,
    /// Distance from the query in latent space.
    pub distance: f32,
    /// 1-based position in the result list.
    pub rank: usize,
}

/// Read-only k-NN index over training latents.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityIndex {
    latents: Matrix<f32>,
    weights: Vec<f32>,
    metric: DistanceMetric,
}

impl SimilarityIndex {
    /// Builds an index with uniform weights and the Manhattan metric.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::EmptyInput`] if there are no training latents.
    pub fn new(latents: Matrix<f32>) -> Result<Self> {
        if latents.n_rows() == 0 {
            return Err(SimfinError::empty_input("similarity index over zero training latents"));
        }
        let weights = vec![1.0; latents.n_cols()];
        Ok(Self {
            latents,
            weights,
            metric: DistanceMetric::Manhattan,
        })
    }

    /// Sets the distance metric.
    #[must_use]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Sets per-dimension weights.
    ///
    /// # Errors
    ///
    /// Returns an error if the length differs from the latent width or any
    /// weight is negative or not finite.
    pub fn with_weights(mut self, weights: Vec<f32>) -> Result<Self> {
        if weights.len() != self.latents.n_cols() {
            return Err(SimfinError::dimension_mismatch(
                "weights",
                self.latents.n_cols(),
                weights.len(),
            ));
        }
        if let Some(bad) = weights.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
            return Err(SimfinError::invalid_hyperparameter(
                "weight",
                bad,
                "finite and >= 0",
            ));
        }
        self.weights = weights;
        Ok(self)
    }

    /// Number of indexed training instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.latents.n_rows()
    }

    /// Always false; an index holds at least one instance.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latents.n_rows() == 0
    }

    /// Latent width.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.latents.n_cols()
    }

    /// Distance metric in use.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Per-dimension weights in use.
    #[must_use]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Distance from `query` to every training latent, in training order.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::DimensionMismatch`] if `query` has the wrong width.
    pub fn distances(&self, query: &[f32]) -> Result<Vec<f32>> {
        if query.len() != self.dim() {
            return Err(SimfinError::dimension_mismatch(
                "latent dim",
                self.dim(),
                query.len(),
            ));
        }
        Ok(self
            .latents
            .rows()
            .map(|row| self.metric.distance(query, row, &self.weights))
            .collect())
    }

    /// Every training instance, nearest first.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::DimensionMismatch`] if `query` has the wrong width.
    pub fn rank_all(&self, query: &[f32]) -> Result<Vec<NeighborMatch>> {
        let mut order: Vec<(usize, f32)> = self.distances(query)?.into_iter().enumerate().collect();
        order.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(order
            .into_iter()
            .enumerate()
            .map(|(pos, (train_index, distance))| NeighborMatch {
                train_index,
                distance,
                rank: pos + 1,
            })
            .collect())
    }

    /// The `k` nearest training instances, nearest first.
    ///
    /// `k` larger than the index is capped to the index size.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::InvalidHyperparameter`] if `k` is 0 and
    /// [`SimfinError::DimensionMismatch`] if `query` has the wrong width.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<NeighborMatch>> {
        if k == 0 {
            return Err(SimfinError::invalid_hyperparameter("k", 0, ">= 1"));
        }
        let mut ranked = self.rank_all(query)?;
        ranked.truncate(k);
        Ok(ranked)
    }

    /// Runs [`SimilarityIndex::query`] for each row of `queries`.
    ///
    /// # Errors
    ///
    /// Returns the first query error.
    pub fn query_batch(&self, queries: &Matrix<f32>, k: usize) -> Result<Vec<Vec<NeighborMatch>>> {
        queries.rows().map(|q| self.query(q, k)).collect()
    }
}
