//! Core traits shared by the pipeline stages.

use crate::error::Result;
use crate::primitives::Matrix;

/// Trait for data transformers (scalers, encoders).
///
/// A transformer is fitted once on the training matrix and then applied,
/// unchanged, to every later matrix (training or query).
///
/// ```
/// use simfin::preprocessing::MinMaxScaler;
/// use simfin::primitives::Matrix;
/// use simfin::traits::Transformer;
///
/// let train = Matrix::from_vec(2, 1, vec![0.0, 4.0]).expect("2x1");
/// let query = Matrix::from_vec(1, 1, vec![2.0]).expect("1x1");
///
/// let mut scaler = MinMaxScaler::new();
/// scaler.fit(&train).expect("non-empty training matrix");
/// let scaled = scaler.transform(&query).expect("fitted");
/// assert!((scaled.get(0, 0) - 0.5).abs() < 1e-6);
/// ```
pub trait Transformer {
    /// Fits the transformer to data.
    ///
    /// # Errors
    ///
    /// Returns an error if fitting fails.
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()>;

    /// Transforms data using fitted parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if transformer is not fitted.
    fn transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>>;

    /// Fits and transforms in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if fitting fails.
    fn fit_transform(&mut self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        self.fit(x)?;
        self.transform(x)
    }
}
