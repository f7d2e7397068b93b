//! Weight initialization functions.
//!
//! # References
//!
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of training
//!   deep feedforward neural networks. AISTATS.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Xavier uniform initialization (Glorot & Bengio, 2010).
///
/// Samples `numel` values from U(-a, a) where a = sqrt(6 / (`fan_in` + `fan_out`)).
/// The same seed always yields the same values.
#[must_use]
pub fn xavier_uniform(numel: usize, fan_in: usize, fan_out: usize, seed: u64) -> Vec<f32> {
    let a = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
    uniform(numel, -a, a, seed)
}

/// Samples `numel` values from U(low, high).
pub(crate) fn uniform(numel: usize, low: f32, high: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..numel).map(|_| rng.gen_range(low..high)).collect()
}
