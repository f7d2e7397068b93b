//! Fully connected (linear) layer.
//!
//! Implements the transformation y = xW^T + b together with its backward
//! pass; there is no autograd, gradients are computed explicitly.

use super::init::xavier_uniform;
use crate::error::{Result, SimfinError};
use crate::primitives::Matrix;

/// Fully connected layer: y = xW^T + b
///
/// # Shape
///
/// - Input: `(batch, in_features)`
/// - Output: `(batch, out_features)`
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    /// Weight matrix, shape: [out_features, in_features]
    weight: Matrix<f32>,
    /// Bias vector, shape: [out_features]
    bias: Vec<f32>,
}

/// Parameter gradients of a [`Linear`] layer for one batch.
#[derive(Debug, Clone)]
pub struct LinearGrads {
    /// d loss / d weight, shape [out_features, in_features]
    pub weight: Matrix<f32>,
    /// d loss / d bias, shape [out_features]
    pub bias: Vec<f32>,
}

impl Linear {
    /// Creates a layer with Xavier-uniform weights and zero bias.
    #[must_use]
    pub fn with_seed(in_features: usize, out_features: usize, seed: u64) -> Self {
        let mut weight = Matrix::zeros(out_features, in_features);
        weight.as_mut_slice().copy_from_slice(&xavier_uniform(
            in_features * out_features,
            in_features,
            out_features,
            seed,
        ));
        Self {
            weight,
            bias: vec![0.0; out_features],
        }
    }

    /// Creates a layer from explicit parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if `bias` does not have one entry per weight row.
    pub fn from_parts(weight: Matrix<f32>, bias: Vec<f32>) -> Result<Self> {
        if weight.n_rows() != bias.len() {
            return Err(SimfinError::dimension_mismatch(
                "bias length",
                weight.n_rows(),
                bias.len(),
            ));
        }
        Ok(Self { weight, bias })
    }

    /// Number of input features.
    #[must_use]
    pub fn in_features(&self) -> usize {
        self.weight.n_cols()
    }

    /// Number of output features.
    #[must_use]
    pub fn out_features(&self) -> usize {
        self.weight.n_rows()
    }

    /// Weight matrix `[out, in]`.
    #[must_use]
    pub fn weight(&self) -> &Matrix<f32> {
        &self.weight
    }

    /// Bias vector.
    #[must_use]
    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    /// Mutable weight and bias storage, for optimizer updates.
    pub fn params_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (self.weight.as_mut_slice(), &mut self.bias)
    }

    /// Computes `x W^T + b`.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` does not have `in_features` columns.
    pub fn forward(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        if x.n_cols() != self.in_features() {
            return Err(SimfinError::dimension_mismatch(
                "layer input features",
                self.in_features(),
                x.n_cols(),
            ));
        }

        let mut out = Matrix::zeros(x.n_rows(), self.out_features());
        for (i, row) in x.rows().enumerate() {
            let out_row = out.row_mut(i);
            for (o, slot) in out_row.iter_mut().enumerate() {
                let w = self.weight.row(o);
                let dot: f32 = row.iter().zip(w).map(|(a, b)| a * b).sum();
                *slot = dot + self.bias[o];
            }
        }
        Ok(out)
    }

    /// Backward pass.
    ///
    /// `input` is the batch fed to [`Linear::forward`] and `grad_out` the
    /// loss gradient w.r.t. the layer's (pre-activation) output. Returns the
    /// parameter gradients and the gradient w.r.t. `input`.
    #[must_use]
    pub fn backward(&self, input: &Matrix<f32>, grad_out: &Matrix<f32>) -> (LinearGrads, Matrix<f32>) {
        let (in_f, out_f) = (self.in_features(), self.out_features());
        let mut grad_w = Matrix::zeros(out_f, in_f);
        let mut grad_b = vec![0.0; out_f];
        let mut grad_in = Matrix::zeros(input.n_rows(), in_f);

        for (i, (x_row, g_row)) in input.rows().zip(grad_out.rows()).enumerate() {
            for (o, &g) in g_row.iter().enumerate() {
                if g == 0.0 {
                    continue;
                }
                grad_b[o] += g;
                let w_row = self.weight.row(o);
                for (gw, &x) in grad_w.row_mut(o).iter_mut().zip(x_row) {
                    *gw += g * x;
                }
                for (gi, &w) in grad_in.row_mut(i).iter_mut().zip(w_row) {
                    *gi += g * w;
                }
            }
        }

        (
            LinearGrads {
                weight: grad_w,
                bias: grad_b,
            },
            grad_in,
        )
    }
}
