//! Neural network building blocks for the latent encoder.
//!
//! A small, explicit-gradient stack: dense layers with Xavier
//! initialization, ReLU/sigmoid activations, binary cross-entropy and the
//! Adadelta/Adam optimizers, assembled into an [`Autoencoder`].
//!
//! # Example
//!
//! ```
//! use simfin::nn::{Autoencoder, AutoencoderConfig};
//! use simfin::primitives::Matrix;
//!
//! let x = Matrix::from_vec(4, 3, vec![
//!     0.0, 0.5, 1.0,
//!     1.0, 0.5, 0.0,
//!     0.2, 0.2, 0.2,
//!     0.9, 0.8, 0.7,
//! ]).expect("4x3");
//!
//! let config = AutoencoderConfig {
//!     hidden_dims: vec![4],
//!     latent_dim: 2,
//!     epochs: 2,
//!     batch_size: 2,
//!     ..AutoencoderConfig::default()
//! };
//! let mut ae = Autoencoder::new(3, &config).expect("valid config");
//! ae.fit(&x, &config).expect("training succeeds");
//!
//! let latent = ae.into_encoder().encode(&x).expect("width matches");
//! assert_eq!(latent.shape(), (4, 2));
//! ```

mod activation;
mod autoencoder;
pub mod init;
mod linear;
pub mod loss;
pub mod optim;

pub use activation::Activation;
pub use autoencoder::{Autoencoder, AutoencoderConfig, Dense, Encoder, TrainHistory};
pub use linear::{Linear, LinearGrads};
pub use loss::BCELoss;
pub use optim::{Adadelta, Adam, Optimizer, OptimizerConfig};
