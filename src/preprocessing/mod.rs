//! Preprocessing: length harmonization and min-max feature scaling.
//!
//! # Example
//!
//! ```
//! use simfin::ingest::ChangeVector;
//! use simfin::preprocessing::{harmonize, MinMaxScaler};
//! use simfin::traits::Transformer;
//!
//! let train = vec![
//!     ChangeVector::new(vec![1, 2]),
//!     ChangeVector::new(vec![1, 2, 3]),
//!     ChangeVector::new(vec![1]),
//! ];
//! let query = vec![ChangeVector::new(vec![1, 2])];
//!
//! let sets = harmonize(&train, &query);
//! assert_eq!(sets.len(), 3);
//!
//! let mut scaler = MinMaxScaler::new();
//! scaler.fit(&sets.train_matrix()).expect("non-empty training set");
//! let scaled = scaler.transform(&sets.query_matrix()).expect("fitted");
//! assert_eq!(scaled.row(0), &[0.0, 1.0, 0.0]);
//! ```

mod harmonize;
mod scaler;

pub use harmonize::{harmonize, pad_all, vectors_to_matrix, HarmonizedSets};
pub use scaler::{MinMaxScaler, ScalerState};

#[cfg(test)]
mod tests;
