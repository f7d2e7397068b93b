//! Dense autoencoder whose encoder half produces latent vectors.
//!
//! ```text
//! input(d) -> hidden[0] -> ... -> hidden[n-1] -> latent     (encoder, ReLU)
//! latent -> hidden[n-1] -> ... -> hidden[0] -> output(d)    (decoder, ReLU / sigmoid)
//! ```
//!
//! Training minimizes binary cross-entropy between the input and its
//! reconstruction. Only the [`Encoder`] outlives training.

use super::activation::Activation;
use super::linear::Linear;
use super::loss::BCELoss;
use super::optim::{Optimizer, OptimizerConfig};
use crate::error::{Result, SimfinError};
use crate::primitives::Matrix;
use crate::serialization::safetensors::{self, TensorMap, UserMetadata};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Hyperparameters of the autoencoder and its training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoencoderConfig {
    /// Widths of the encoder's hidden layers, input side first.
    pub hidden_dims: Vec<usize>,
    /// Width of the bottleneck layer.
    pub latent_dim: usize,
    /// Passes over the training set.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Reshuffle the training rows before every epoch.
    pub shuffle: bool,
    /// Optimizer and its hyperparameters.
    pub optimizer: OptimizerConfig,
    /// Seed for weight initialization and batch shuffling.
    pub seed: u64,
}

impl Default for AutoencoderConfig {
    fn default() -> Self {
        Self {
            hidden_dims: vec![500; 4],
            latent_dim: 500,
            epochs: 20,
            batch_size: 512,
            shuffle: true,
            optimizer: OptimizerConfig::default(),
            seed: 0,
        }
    }
}

impl AutoencoderConfig {
    /// Checks the hyperparameters.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::InvalidHyperparameter`] for zero widths, zero
    /// epochs, zero batch size or invalid optimizer settings.
    pub fn validate(&self) -> Result<()> {
        if let Some(pos) = self.hidden_dims.iter().position(|&d| d == 0) {
            return Err(SimfinError::invalid_hyperparameter(
                &format!("hidden_dims[{pos}]"),
                0,
                ">= 1",
            ));
        }
        if self.latent_dim == 0 {
            return Err(SimfinError::invalid_hyperparameter("latent_dim", 0, ">= 1"));
        }
        if self.epochs == 0 {
            return Err(SimfinError::invalid_hyperparameter("epochs", 0, ">= 1"));
        }
        if self.batch_size == 0 {
            return Err(SimfinError::invalid_hyperparameter("batch_size", 0, ">= 1"));
        }
        self.optimizer.validate()
    }
}

/// A linear layer followed by an activation.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    linear: Linear,
    activation: Activation,
}

impl Dense {
    /// Pairs a linear layer with its activation.
    #[must_use]
    pub fn new(linear: Linear, activation: Activation) -> Self {
        Self { linear, activation }
    }

    /// The linear part.
    #[must_use]
    pub fn linear(&self) -> &Linear {
        &self.linear
    }

    /// The activation.
    #[must_use]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    fn forward(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let mut out = self.linear.forward(x)?;
        self.activation.apply(out.as_mut_slice());
        Ok(out)
    }
}

/// Runs `layers` in sequence, keeping every intermediate output.
///
/// `outputs[0]` is the input itself; `outputs[i + 1]` is layer `i`'s output.
fn forward_all(layers: &[&Dense], x: &Matrix<f32>) -> Result<Vec<Matrix<f32>>> {
    let mut outputs = Vec::with_capacity(layers.len() + 1);
    outputs.push(x.clone());
    for layer in layers {
        let next = layer.forward(outputs.last().unwrap_or(x))?;
        outputs.push(next);
    }
    Ok(outputs)
}

/// The retained half of a trained autoencoder.
///
/// Maps scaled vectors of width [`Encoder::input_dim`] to latent vectors of
/// width [`Encoder::latent_dim`]. Deterministic for fixed weights.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoder {
    layers: Vec<Dense>,
}

impl Encoder {
    /// Builds an encoder from consecutive layers.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no layers or adjacent widths disagree.
    pub fn from_layers(layers: Vec<Dense>) -> Result<Self> {
        if layers.is_empty() {
            return Err(SimfinError::empty_input("encoder without layers"));
        }
        for (i, pair) in layers.windows(2).enumerate() {
            let (a, b) = (pair[0].linear.out_features(), pair[1].linear.in_features());
            if a != b {
                return Err(SimfinError::dimension_mismatch(
                    &format!("encoder layer {} input", i + 1),
                    a,
                    b,
                ));
            }
        }
        Ok(Self { layers })
    }

    /// Width of the vectors the encoder accepts.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.layers[0].linear.in_features()
    }

    /// Width of the latent vectors.
    #[must_use]
    pub fn latent_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].linear.out_features()
    }

    /// Encoder layers, input side first.
    #[must_use]
    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    /// Embeds each row of `x`.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::DimensionMismatch`] if `x` does not have
    /// `input_dim` columns.
    pub fn encode(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        if x.n_cols() != self.input_dim() {
            return Err(SimfinError::dimension_mismatch(
                "encoder input_dim",
                self.input_dim(),
                x.n_cols(),
            ));
        }
        let mut h = x.clone();
        for layer in &self.layers {
            h = layer.forward(&h)?;
        }
        Ok(h)
    }

    /// Weights as named tensors plus shape metadata.
    #[must_use]
    pub fn to_tensors(&self) -> (TensorMap, UserMetadata) {
        let mut tensors = TensorMap::new();
        for (i, layer) in self.layers.iter().enumerate() {
            let w = layer.linear.weight();
            tensors.insert(
                format!("encoder.{i}.weight"),
                (w.as_slice().to_vec(), vec![w.n_rows(), w.n_cols()]),
            );
            tensors.insert(
                format!("encoder.{i}.bias"),
                (layer.linear.bias().to_vec(), vec![layer.linear.out_features()]),
            );
        }

        let activations: Vec<&str> = self.layers.iter().map(|l| l.activation.name()).collect();
        let mut meta = UserMetadata::new();
        meta.insert("activations".to_string(), activations.join(","));
        meta.insert("input_dim".to_string(), self.input_dim().to_string());
        meta.insert("latent_dim".to_string(), self.latent_dim().to_string());
        (tensors, meta)
    }

    /// Saves the encoder to a `SafeTensors` file.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn save_safetensors<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let (tensors, meta) = self.to_tensors();
        safetensors::save_safetensors(path, &tensors, &meta)
    }

    /// Loads an encoder from a `SafeTensors` file.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::FormatError`] if tensors or metadata are missing
    /// or inconsistent.
    pub fn load_safetensors<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = safetensors::load_safetensors(path)?;
        let activations = file
            .user_metadata()
            .get("activations")
            .ok_or_else(|| SimfinError::FormatError("missing 'activations' metadata".to_string()))?
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<Activation>>>()?;

        let mut layers = Vec::with_capacity(activations.len());
        for (i, activation) in activations.into_iter().enumerate() {
            let (w, w_shape) = file.tensor(&format!("encoder.{i}.weight"))?;
            let (b, _) = file.tensor(&format!("encoder.{i}.bias"))?;
            let &[rows, cols] = w_shape.as_slice() else {
                return Err(SimfinError::FormatError(format!(
                    "encoder.{i}.weight must be 2-D, got shape {w_shape:?}"
                )));
            };
            let weight = Matrix::from_vec(rows, cols, w)?;
            layers.push(Dense::new(Linear::from_parts(weight, b)?, activation));
        }

        let encoder = Self::from_layers(layers)?;
        let input_dim: usize = file.parse_user("input_dim")?;
        let latent_dim: usize = file.parse_user("latent_dim")?;
        if input_dim != encoder.input_dim() || latent_dim != encoder.latent_dim() {
            return Err(SimfinError::FormatError(format!(
                "metadata says {input_dim} -> {latent_dim}, weights say {} -> {}",
                encoder.input_dim(),
                encoder.latent_dim()
            )));
        }
        Ok(encoder)
    }
}

/// Per-epoch reconstruction losses of a training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainHistory {
    /// Mean batch loss for each epoch, weighted by batch size.
    pub epoch_losses: Vec<f32>,
}

impl TrainHistory {
    /// Loss of the last epoch.
    #[must_use]
    pub fn final_loss(&self) -> Option<f32> {
        self.epoch_losses.last().copied()
    }
}

/// Encoder plus mirrored decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Autoencoder {
    encoder: Encoder,
    decoder: Vec<Dense>,
}

impl Autoencoder {
    /// Builds an untrained autoencoder for inputs of width `input_dim`.
    ///
    /// Layer `i` is initialized with seed `config.seed + i`.
    ///
    /// # Errors
    ///
    /// Returns an error if `input_dim` is 0 or the configuration is invalid.
    pub fn new(input_dim: usize, config: &AutoencoderConfig) -> Result<Self> {
        config.validate()?;
        if input_dim == 0 {
            return Err(SimfinError::empty_input(
                "autoencoder input dimensionality is 0",
            ));
        }

        let mut widths = vec![input_dim];
        widths.extend(&config.hidden_dims);
        widths.push(config.latent_dim);
        let mut mirrored = widths.clone();
        mirrored.reverse();

        let mut seed = config.seed;
        let mut next_linear = |fan_in, fan_out| {
            let layer = Linear::with_seed(fan_in, fan_out, seed);
            seed = seed.wrapping_add(1);
            layer
        };

        let encoder_layers = widths
            .windows(2)
            .map(|w| Dense::new(next_linear(w[0], w[1]), Activation::Relu))
            .collect();
        let n_decoder = mirrored.len() - 1;
        let decoder = mirrored
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let act = if i + 1 == n_decoder {
                    Activation::Sigmoid
                } else {
                    Activation::Relu
                };
                Dense::new(next_linear(w[0], w[1]), act)
            })
            .collect();

        Ok(Self {
            encoder: Encoder::from_layers(encoder_layers)?,
            decoder,
        })
    }

    /// The encoder half.
    #[must_use]
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// Consumes the autoencoder, keeping the encoder.
    #[must_use]
    pub fn into_encoder(self) -> Encoder {
        self.encoder
    }

    fn layers(&self) -> Vec<&Dense> {
        self.encoder.layers.iter().chain(&self.decoder).collect()
    }

    /// Reconstructs each row of `x`.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` has the wrong width.
    pub fn reconstruct(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let mut h = self.encoder.encode(x)?;
        for layer in &self.decoder {
            h = layer.forward(&h)?;
        }
        Ok(h)
    }

    /// Mean reconstruction loss over `x`.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` is empty or has the wrong width.
    pub fn loss(&self, x: &Matrix<f32>) -> Result<f32> {
        BCELoss::new().forward(&self.reconstruct(x)?, x)
    }

    /// Trains on the rows of `x` (values expected in `[0, 1]`).
    ///
    /// # Errors
    ///
    /// Returns an error if `x` is empty, has the wrong width, or the loss
    /// becomes non-finite.
    pub fn fit(&mut self, x: &Matrix<f32>, config: &AutoencoderConfig) -> Result<TrainHistory> {
        config.validate()?;
        if x.n_rows() == 0 {
            return Err(SimfinError::empty_input("autoencoder training set"));
        }
        if x.n_cols() != self.encoder.input_dim() {
            return Err(SimfinError::dimension_mismatch(
                "autoencoder input_dim",
                self.encoder.input_dim(),
                x.n_cols(),
            ));
        }

        info!(
            samples = x.n_rows(),
            input_dim = x.n_cols(),
            latent_dim = self.encoder.latent_dim(),
            epochs = config.epochs,
            batch_size = config.batch_size,
            "training autoencoder"
        );

        let mut optimizer = config.optimizer.build();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut order: Vec<usize> = (0..x.n_rows()).collect();
        let mut history = TrainHistory::default();

        for epoch in 0..config.epochs {
            if config.shuffle {
                order.shuffle(&mut rng);
            }
            let mut total = 0.0;
            for batch in order.chunks(config.batch_size) {
                let xb = x.select_rows(batch);
                total += self.train_batch(&xb, optimizer.as_mut())? * batch.len() as f32;
            }
            let epoch_loss = total / x.n_rows() as f32;
            if !epoch_loss.is_finite() {
                return Err(SimfinError::invalid_hyperparameter(
                    "optimizer",
                    format!("{:?}", config.optimizer),
                    "a setting that keeps the reconstruction loss finite",
                ));
            }
            debug!(epoch = epoch + 1, loss = epoch_loss, "epoch complete");
            history.epoch_losses.push(epoch_loss);
        }

        Ok(history)
    }

    /// One forward/backward pass and parameter update. Returns the batch loss.
    fn train_batch(&mut self, xb: &Matrix<f32>, optimizer: &mut dyn Optimizer) -> Result<f32> {
        let loss_fn = BCELoss::new();
        let (outputs, grads) = {
            let layers = self.layers();
            let outputs = forward_all(&layers, xb)?;
            let prediction = &outputs[outputs.len() - 1];

            // Sigmoid output + BCE: the gradient w.r.t. the last logits is direct.
            let mut delta = loss_fn.grad_logits(prediction, xb)?;
            let mut grads = Vec::with_capacity(layers.len());
            for l in (0..layers.len()).rev() {
                let (g, mut grad_in) = layers[l].linear.backward(&outputs[l], &delta);
                grads.push(g);
                if l > 0 {
                    let act = layers[l - 1].activation;
                    for (gi, &out) in grad_in.as_mut_slice().iter_mut().zip(outputs[l].as_slice()) {
                        *gi *= act.derivative_from_output(out);
                    }
                }
                delta = grad_in;
            }
            grads.reverse();
            (outputs, grads)
        };
        let loss = loss_fn.forward(&outputs[outputs.len() - 1], xb)?;

        let layers_mut = self
            .encoder
            .layers
            .iter_mut()
            .chain(self.decoder.iter_mut());
        for (l, (layer, g)) in layers_mut.zip(&grads).enumerate() {
            let (w, b) = layer.linear.params_mut();
            optimizer.update(2 * l, w, g.weight.as_slice());
            optimizer.update(2 * l + 1, b, &g.bias);
        }
        optimizer.step_done();

        Ok(loss)
    }
}

#[cfg(test)]
#[path = "autoencoder_tests.rs"]
mod tests;
