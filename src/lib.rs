//! Simfin: similarity ranking of historical bug fixes for automated program
//! repair.
//!
//! Given structural change vectors for a corpus of past fixes and for the
//! bugs being repaired, simfin learns a dense embedding with an autoencoder,
//! retrieves the most similar historical fixes by weighted Manhattan distance
//! and materializes their old/new source files as a candidate pool for a
//! patch-synthesis tool.
//!
//! # Quick Start
//!
//! ```
//! use simfin::prelude::*;
//!
//! let train = vec![
//!     ChangeVector::new(vec![1, 2]),
//!     ChangeVector::new(vec![1, 2, 3]),
//!     ChangeVector::new(vec![1]),
//! ];
//! let query = vec![ChangeVector::new(vec![1, 2])];
//!
//! // Pad both sets to a common length and scale with training statistics.
//! let sets = harmonize(&train, &query);
//! let mut scaler = MinMaxScaler::new();
//! let x_train = scaler.fit_transform(&sets.train_matrix()).expect("non-empty");
//! let x_query = scaler.transform(&sets.query_matrix()).expect("fitted");
//!
//! // Learn a 2-d embedding.
//! let config = AutoencoderConfig {
//!     hidden_dims: vec![4],
//!     latent_dim: 2,
//!     epochs: 5,
//!     batch_size: 2,
//!     ..AutoencoderConfig::default()
//! };
//! let mut ae = Autoencoder::new(sets.len(), &config).expect("valid config");
//! ae.fit(&x_train, &config).expect("training succeeds");
//! let encoder = ae.into_encoder();
//!
//! // Rank training fixes for the query.
//! let index = SimilarityIndex::new(encoder.encode(&x_train).expect("encode")).expect("non-empty");
//! let hits = index
//!     .query(encoder.encode(&x_query).expect("encode").row(0), 2)
//!     .expect("query");
//! assert_eq!(hits.len(), 2);
//! assert_eq!(hits[0].rank, 1);
//! assert!(hits[0].distance <= hits[1].distance);
//! ```
//!
//! # Modules
//!
//! - [`ingest`]: Change-vector and label ingestion, fallback data sources
//! - [`preprocessing`]: Length harmonization and min-max scaling
//! - [`nn`]: Dense layers, optimizers and the autoencoder
//! - [`index`]: Exact k-nearest-neighbor search with stable ranking
//! - [`pool`]: Candidate pool materialization from git history
//! - [`report`]: Ranked-result CSV and latent dumps
//! - [`artifact`]: Versioned scaler/encoder store
//! - [`serialization`]: SafeTensors files and atomic writes
//! - [`config`]: YAML pipeline configuration
//! - [`pipeline`]: Train and predict runs

pub mod artifact;
pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod nn;
pub mod pipeline;
pub mod pool;
pub mod prelude;
pub mod preprocessing;
pub mod primitives;
pub mod report;
pub mod serialization;
pub mod traits;

pub use error::{Result, SimfinError};
pub use primitives::Matrix;
pub use traits::Transformer;
