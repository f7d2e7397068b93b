//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use simfin::prelude::*;
//! ```

pub use crate::artifact::{ArtifactManifest, ArtifactStore};
pub use crate::config::PipelineConfig;
pub use crate::error::{Result, SimfinError, Stage};
pub use crate::index::{DistanceMetric, NeighborMatch, SimilarityIndex};
pub use crate::ingest::{ChangeVector, Dataset, InstanceLabel, VectorSource};
pub use crate::nn::{Autoencoder, AutoencoderConfig, Encoder};
pub use crate::pipeline::Pipeline;
pub use crate::pool::{CandidatePool, CandidatePoolBuilder, GitSourceProvider, SourceProvider};
pub use crate::preprocessing::{harmonize, MinMaxScaler};
pub use crate::primitives::Matrix;
pub use crate::traits::Transformer;
