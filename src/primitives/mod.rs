//! Core compute primitives.
//!
//! Every numeric stage of the pipeline (scaling, encoding, ranking) works on
//! a dense row-major [`Matrix`], one row per instance.

mod matrix;

pub use matrix::Matrix;
