//! Gradient-based optimizers.
//!
//! Parameters are addressed by slot: each trainable buffer (a layer's
//! weight or bias) is given a stable index and the optimizer keeps its
//! per-element state under that index.

use crate::error::{Result, SimfinError};
use serde::{Deserialize, Serialize};

/// Updates parameter buffers from their gradients.
pub trait Optimizer {
    /// Applies one update to the buffer at `slot`.
    fn update(&mut self, slot: usize, params: &mut [f32], grads: &[f32]);

    /// Marks the end of an optimization step (one mini-batch).
    fn step_done(&mut self) {}

    /// Get current learning rate.
    fn lr(&self) -> f32;

    /// Set learning rate.
    fn set_lr(&mut self, lr: f32);
}

fn ensure_slot(state: &mut Vec<Vec<f32>>, slot: usize, len: usize) {
    if slot >= state.len() {
        state.resize(slot + 1, Vec::new());
    }
    if state[slot].len() != len {
        state[slot] = vec![0.0; len];
    }
}

/// Adadelta optimizer (Zeiler, 2012).
///
/// Update rule:
/// ```text
/// E[g²]  = ρ E[g²] + (1 - ρ) g²
/// Δ      = sqrt(E[Δ²] + ε) / sqrt(E[g²] + ε) * g
/// param  = param - lr * Δ
/// E[Δ²]  = ρ E[Δ²] + (1 - ρ) Δ²
/// ```
#[derive(Debug, Clone)]
pub struct Adadelta {
    lr: f32,
    rho: f32,
    eps: f32,
    /// Running average of squared gradients
    acc_grad: Vec<Vec<f32>>,
    /// Running average of squared updates
    acc_delta: Vec<Vec<f32>>,
}

impl Adadelta {
    /// Creates Adadelta with ρ=0.95, ε=1e-7.
    #[must_use]
    pub fn new(lr: f32) -> Self {
        Self {
            lr,
            rho: 0.95,
            eps: 1e-7,
            acc_grad: Vec::new(),
            acc_delta: Vec::new(),
        }
    }

    /// Set decay rate ρ.
    #[must_use]
    pub fn rho(mut self, rho: f32) -> Self {
        self.rho = rho;
        self
    }

    /// Set epsilon for numerical stability.
    #[must_use]
    pub fn eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }
}

impl Optimizer for Adadelta {
    fn update(&mut self, slot: usize, params: &mut [f32], grads: &[f32]) {
        let (rho, eps, lr) = (self.rho, self.eps, self.lr);
        ensure_slot(&mut self.acc_grad, slot, params.len());
        ensure_slot(&mut self.acc_delta, slot, params.len());
        let eg = &mut self.acc_grad[slot];
        let edx = &mut self.acc_delta[slot];

        for i in 0..params.len() {
            let g = grads[i];
            eg[i] = rho * eg[i] + (1.0 - rho) * g * g;
            let delta = (edx[i] + eps).sqrt() / (eg[i] + eps).sqrt() * g;
            params[i] -= lr * delta;
            edx[i] = rho * edx[i] + (1.0 - rho) * delta * delta;
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

/// Adam optimizer (Kingma & Ba, 2015).
///
/// Default: β₁=0.9, β₂=0.999, ε=1e-8
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    /// First moment estimates
    m: Vec<Vec<f32>>,
    /// Second moment estimates
    v: Vec<Vec<f32>>,
    /// Current timestep for bias correction
    t: usize,
}

impl Adam {
    /// Create a new Adam optimizer with default hyperparameters.
    #[must_use]
    pub fn new(lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            m: Vec::new(),
            v: Vec::new(),
            t: 1,
        }
    }

    /// Set beta parameters.
    #[must_use]
    pub fn betas(mut self, beta1: f32, beta2: f32) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    /// Set epsilon for numerical stability.
    #[must_use]
    pub fn eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }
}

impl Optimizer for Adam {
    fn update(&mut self, slot: usize, params: &mut [f32], grads: &[f32]) {
        let (beta1, beta2) = (self.beta1, self.beta2);
        let bias_correction1 = 1.0 - beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - beta2.powi(self.t as i32);

        ensure_slot(&mut self.m, slot, params.len());
        ensure_slot(&mut self.v, slot, params.len());
        let m = &mut self.m[slot];
        let v = &mut self.v[slot];

        for i in 0..params.len() {
            let g = grads[i];
            m[i] = beta1 * m[i] + (1.0 - beta1) * g;
            v[i] = beta2 * v[i] + (1.0 - beta2) * g * g;
            let m_hat = m[i] / bias_correction1;
            let v_hat = v[i] / bias_correction2;
            params[i] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }

    fn step_done(&mut self) {
        self.t += 1;
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

/// Optimizer selection as it appears in configuration.
///
/// ```yaml
/// optimizer:
///   kind: adadelta
///   learning_rate: 1.0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OptimizerConfig {
    /// Adadelta with decay `rho`.
    Adadelta {
        /// Step multiplier
        #[serde(default = "default_adadelta_lr")]
        learning_rate: f32,
        /// Decay rate of the running averages
        #[serde(default = "default_rho")]
        rho: f32,
        /// Numerical stability term
        #[serde(default = "default_adadelta_eps")]
        eps: f32,
    },
    /// Adam with default betas.
    Adam {
        /// Step size
        #[serde(default = "default_adam_lr")]
        learning_rate: f32,
    },
}

fn default_adadelta_lr() -> f32 {
    1.0
}

fn default_rho() -> f32 {
    0.95
}

fn default_adadelta_eps() -> f32 {
    1e-7
}

fn default_adam_lr() -> f32 {
    0.001
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adadelta {
            learning_rate: default_adadelta_lr(),
            rho: default_rho(),
            eps: default_adadelta_eps(),
        }
    }
}

impl OptimizerConfig {
    /// Checks the hyperparameters.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::InvalidHyperparameter`] for a non-positive
    /// learning rate, `rho` outside `[0, 1)` or a non-positive `eps`.
    pub fn validate(&self) -> Result<()> {
        let lr = match *self {
            Self::Adadelta {
                learning_rate,
                rho,
                eps,
            } => {
                if !(0.0..1.0).contains(&rho) {
                    return Err(SimfinError::invalid_hyperparameter("rho", rho, "in [0, 1)"));
                }
                if !(eps > 0.0) {
                    return Err(SimfinError::invalid_hyperparameter("eps", eps, "> 0"));
                }
                learning_rate
            }
            Self::Adam { learning_rate } => learning_rate,
        };
        if !(lr > 0.0 && lr.is_finite()) {
            return Err(SimfinError::invalid_hyperparameter(
                "learning_rate",
                lr,
                "finite and > 0",
            ));
        }
        Ok(())
    }

    /// Builds a fresh optimizer.
    #[must_use]
    pub fn build(&self) -> Box<dyn Optimizer> {
        match *self {
            Self::Adadelta {
                learning_rate,
                rho,
                eps,
            } => Box::new(Adadelta::new(learning_rate).rho(rho).eps(eps)),
            Self::Adam { learning_rate } => Box::new(Adam::new(learning_rate)),
        }
    }
}
