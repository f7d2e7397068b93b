//! Element-wise activation functions.

use crate::error::SimfinError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Activation applied after a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// max(0, x)
    Relu,
    /// 1 / (1 + e^-x); bounded to (0, 1)
    Sigmoid,
}

impl Activation {
    /// Applies the activation in place.
    pub fn apply(self, values: &mut [f32]) {
        match self {
            Self::Relu => {
                for v in values {
                    *v = v.max(0.0);
                }
            }
            Self::Sigmoid => {
                for v in values {
                    *v = 1.0 / (1.0 + (-*v).exp());
                }
            }
        }
    }

    /// Derivative expressed in terms of the activation's output.
    #[must_use]
    pub fn derivative_from_output(self, output: f32) -> f32 {
        match self {
            Self::Relu => {
                if output > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Sigmoid => output * (1.0 - output),
        }
    }

    /// Lowercase name used in stored model metadata.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = SimfinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "relu" => Ok(Self::Relu),
            "sigmoid" => Ok(Self::Sigmoid),
            other => Err(SimfinError::FormatError(format!(
                "unknown activation '{other}'"
            ))),
        }
    }
}
