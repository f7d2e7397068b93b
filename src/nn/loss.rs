//! Reconstruction loss.

use crate::error::{Result, SimfinError};
use crate::primitives::Matrix;

/// Binary cross-entropy between a sigmoid output and targets in `[0, 1]`.
///
/// Averaged over every element of the batch. Predictions are clipped to
/// `[eps, 1 - eps]` before taking logarithms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BCELoss {
    eps: f32,
}

impl Default for BCELoss {
    fn default() -> Self {
        Self { eps: 1e-7 }
    }
}

impl BCELoss {
    /// Creates the loss with clipping epsilon 1e-7.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mean loss over all elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes differ or the batch is empty.
    pub fn forward(&self, predictions: &Matrix<f32>, targets: &Matrix<f32>) -> Result<f32> {
        check_shapes(predictions, targets)?;
        let n = predictions.as_slice().len() as f32;
        let total: f32 = predictions
            .as_slice()
            .iter()
            .zip(targets.as_slice())
            .map(|(&p, &y)| {
                let p = p.clamp(self.eps, 1.0 - self.eps);
                -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
            })
            .sum();
        Ok(total / n)
    }

    /// Gradient w.r.t. the pre-sigmoid logits, given the sigmoid outputs.
    ///
    /// Sigmoid and cross-entropy combine to `(p - y) / n`.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes differ or the batch is empty.
    pub fn grad_logits(&self, predictions: &Matrix<f32>, targets: &Matrix<f32>) -> Result<Matrix<f32>> {
        check_shapes(predictions, targets)?;
        let n = predictions.as_slice().len() as f32;
        let mut grad = Matrix::zeros(predictions.n_rows(), predictions.n_cols());
        for ((g, &p), &y) in grad
            .as_mut_slice()
            .iter_mut()
            .zip(predictions.as_slice())
            .zip(targets.as_slice())
        {
            *g = (p - y) / n;
        }
        Ok(grad)
    }
}

fn check_shapes(predictions: &Matrix<f32>, targets: &Matrix<f32>) -> Result<()> {
    if predictions.shape() != targets.shape() {
        return Err(SimfinError::DimensionMismatch {
            expected: format!("{:?}", targets.shape()),
            actual: format!("{:?}", predictions.shape()),
        });
    }
    if predictions.as_slice().is_empty() {
        return Err(SimfinError::empty_input("loss over an empty batch"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bce_perfect_prediction_near_zero() {
        let p = Matrix::from_vec(1, 2, vec![1.0, 0.0]).expect("1x2");
        let loss = BCELoss::new().forward(&p, &p).expect("loss");
        assert!(loss < 1e-5);
    }

    #[test]
    fn test_bce_wrong_prediction_high() {
        let p = Matrix::from_vec(1, 1, vec![0.999]).expect("1x1");
        let y = Matrix::from_vec(1, 1, vec![0.0]).expect("1x1");
        assert!(BCELoss::new().forward(&p, &y).expect("loss") > 5.0);
    }

    #[test]
    fn test_bce_half() {
        let p = Matrix::from_vec(1, 1, vec![0.5]).expect("1x1");
        let y = Matrix::from_vec(1, 1, vec![1.0]).expect("1x1");
        let loss = BCELoss::new().forward(&p, &y).expect("loss");
        assert!((loss - std::f32::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn test_grad_logits_is_mean_residual() {
        let p = Matrix::from_vec(2, 1, vec![0.75, 0.25]).expect("2x1");
        let y = Matrix::from_vec(2, 1, vec![1.0, 0.0]).expect("2x1");
        let g = BCELoss::new().grad_logits(&p, &y).expect("grad");
        assert!((g.get(0, 0) + 0.125).abs() < 1e-6);
        assert!((g.get(1, 0) - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_shape_mismatch() {
        let p = Matrix::from_vec(1, 2, vec![0.5, 0.5]).expect("1x2");
        let y = Matrix::from_vec(2, 1, vec![0.5, 0.5]).expect("2x1");
        assert!(BCELoss::new().forward(&p, &y).is_err());
    }
}
