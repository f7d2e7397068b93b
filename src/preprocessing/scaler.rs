//! Min-max scaling into `[0, 1]`.

use crate::error::{Result, SimfinError};
use crate::primitives::Matrix;
use crate::serialization::safetensors::{self, TensorMap, UserMetadata};
use crate::traits::Transformer;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-dimension minima and maxima computed from the training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    /// Minimum value of each feature.
    pub data_min: Vec<f32>,
    /// Maximum value of each feature.
    pub data_max: Vec<f32>,
}

impl ScalerState {
    /// Number of features the state was fitted on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.data_min.len()
    }
}

/// Scales features to `[0, 1]` using training-set statistics.
///
/// The transformation is: `X_scaled = (X - X_min) / (X_max - X_min)`.
/// A dimension that is constant in the training set (`max == min`) maps to
/// exactly 0.0 for every instance. Values outside the training range are
/// not clipped.
///
/// # Example
///
/// ```
/// use simfin::prelude::*;
/// use simfin::preprocessing::MinMaxScaler;
///
/// let data = Matrix::from_vec(3, 2, vec![
///     0.0, 7.0,
///     5.0, 7.0,
///     10.0, 7.0,
/// ]).expect("valid matrix dimensions");
///
/// let mut scaler = MinMaxScaler::new();
/// let scaled = scaler.fit_transform(&data).expect("fit_transform should succeed");
///
/// assert!((scaled.get(1, 0) - 0.5).abs() < 1e-6);
/// assert_eq!(scaled.get(2, 1), 0.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    state: Option<ScalerState>,
}

impl MinMaxScaler {
    /// Creates an unfitted scaler.
    #[must_use]
    pub fn new() -> Self {
        Self { state: None }
    }

    /// Wraps a previously fitted state.
    ///
    /// # Errors
    ///
    /// Returns an error if the minima and maxima differ in length.
    pub fn from_state(state: ScalerState) -> Result<Self> {
        if state.data_min.len() != state.data_max.len() {
            return Err(SimfinError::dimension_mismatch(
                "data_max",
                state.data_min.len(),
                state.data_max.len(),
            ));
        }
        Ok(Self { state: Some(state) })
    }

    /// Returns the fitted state, if any.
    #[must_use]
    pub fn state(&self) -> Option<&ScalerState> {
        self.state.as_ref()
    }

    /// Returns true if the scaler has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    fn fitted_state(&self, n_features: usize) -> Result<&ScalerState> {
        let state = self
            .state
            .as_ref()
            .ok_or(SimfinError::NotFitted("MinMaxScaler"))?;
        if n_features != state.n_features() {
            return Err(SimfinError::dimension_mismatch(
                "scaler features",
                state.n_features(),
                n_features,
            ));
        }
        Ok(state)
    }

    /// Transforms data back to original scale.
    ///
    /// Constant dimensions come back as their training value.
    ///
    /// # Errors
    ///
    /// Returns an error if the scaler is not fitted or dimensions mismatch.
    pub fn inverse_transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let (n_samples, n_features) = x.shape();
        let state = self.fitted_state(n_features)?;

        let mut result = Matrix::zeros(n_samples, n_features);
        for i in 0..n_samples {
            for j in 0..n_features {
                let range = state.data_max[j] - state.data_min[j];
                let original = if range > 0.0 {
                    x.get(i, j) * range + state.data_min[j]
                } else {
                    state.data_min[j]
                };
                result.set(i, j, original);
            }
        }
        Ok(result)
    }

    /// Saves the fitted state to a `SafeTensors` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the scaler is unfitted or if saving fails.
    pub fn save_safetensors<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let state = self
            .state
            .as_ref()
            .ok_or(SimfinError::NotFitted("MinMaxScaler"))?;

        let n = state.n_features();
        let mut tensors = TensorMap::new();
        tensors.insert("data_min".to_string(), (state.data_min.clone(), vec![n]));
        tensors.insert("data_max".to_string(), (state.data_max.clone(), vec![n]));

        let mut meta = UserMetadata::new();
        meta.insert("n_features".to_string(), n.to_string());

        safetensors::save_safetensors(path, &tensors, &meta)
    }

    /// Loads a scaler from a `SafeTensors` file.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or if the file format is invalid.
    pub fn load_safetensors<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = safetensors::load_safetensors(path)?;
        let (data_min, _) = file.tensor("data_min")?;
        let (data_max, _) = file.tensor("data_max")?;
        if data_min.len() != data_max.len() {
            return Err("data_min and data_max have different lengths".into());
        }
        Self::from_state(ScalerState { data_min, data_max })
    }
}

impl Transformer for MinMaxScaler {
    /// Computes the min and max of each feature.
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()> {
        let (n_samples, n_features) = x.shape();
        if n_samples == 0 {
            return Err(SimfinError::empty_input("cannot fit scaler with zero samples"));
        }

        let mut data_min = vec![f32::INFINITY; n_features];
        let mut data_max = vec![f32::NEG_INFINITY; n_features];
        for row in x.rows() {
            for (j, &val) in row.iter().enumerate() {
                data_min[j] = data_min[j].min(val);
                data_max[j] = data_max[j].max(val);
            }
        }

        self.state = Some(ScalerState { data_min, data_max });
        Ok(())
    }

    /// Scales the data with the fitted statistics.
    fn transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let (n_samples, n_features) = x.shape();
        let state = self.fitted_state(n_features)?;

        let mut result = Matrix::zeros(n_samples, n_features);
        for i in 0..n_samples {
            for j in 0..n_features {
                let range = state.data_max[j] - state.data_min[j];
                if range > 0.0 {
                    result.set(i, j, (x.get(i, j) - state.data_min[j]) / range);
                }
            }
        }
        Ok(result)
    }
}
