//! Error types for simfin operations.
//!
//! Every fallible operation in the crate returns [`Result`]. Pipeline stages
//! wrap the underlying error in [`SimfinError::StageFailed`] so the caller can
//! tell which stage stopped the run.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage in which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading change vectors and label rows.
    Ingest,
    /// Padding train and query vectors to a common length.
    Harmonize,
    /// Fitting or applying the min-max scaler.
    Scale,
    /// Training the autoencoder.
    Train,
    /// Writing a new artifact version.
    Persist,
    /// Reading a stored artifact version.
    LoadArtifact,
    /// Embedding scaled vectors with the stored encoder.
    Encode,
    /// Building and querying the similarity index.
    Rank,
    /// Writing the ranked-result CSV and latent dumps.
    Report,
    /// Materializing candidate pools.
    Pool,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingest => "ingest",
            Stage::Harmonize => "harmonize",
            Stage::Scale => "scale",
            Stage::Train => "train",
            Stage::Persist => "persist",
            Stage::LoadArtifact => "load-artifact",
            Stage::Encode => "encode",
            Stage::Rank => "rank",
            Stage::Report => "report",
            Stage::Pool => "pool",
        };
        f.write_str(name)
    }
}

/// Main error type for simfin operations.
///
/// # Examples
///
/// ```
/// use simfin::error::SimfinError;
///
/// let err = SimfinError::DimensionMismatch {
///     expected: "input_dim=12".to_string(),
///     actual: "10".to_string(),
/// };
/// assert!(err.to_string().contains("dimension mismatch"));
/// ```
#[derive(Debug, Error)]
pub enum SimfinError {
    /// A vector or label row could not be parsed.
    #[error("malformed input in {} at row {row}: {message}", path.display())]
    MalformedInput {
        /// File being read
        path: PathBuf,
        /// Zero-based row index
        row: usize,
        /// What was wrong with the row
        message: String,
    },

    /// Matrix/vector dimensions don't match for the operation.
    #[error("Matrix dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions description
        expected: String,
        /// Actual dimensions found
        actual: String,
    },

    /// Invalid hyperparameter value provided.
    #[error("Invalid hyperparameter: {param} = {value}, expected {constraint}")]
    InvalidHyperparameter {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// An operation received no data to work on.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// A transformer or model was used before being fitted.
    #[error("{0} not fitted")]
    NotFitted(&'static str),

    /// No trained artifact exists where one was expected.
    #[error("no trained model found at {}", path.display())]
    ModelNotFound {
        /// Directory or file that was searched
        path: PathBuf,
    },

    /// Data dimensionality differs from what the stored model expects.
    #[error("training data shape mismatch: model expects input dimensionality {expected}, data has {actual}")]
    ModelShapeMismatch {
        /// Dimensionality recorded in the artifact
        expected: usize,
        /// Dimensionality of the harmonized data
        actual: usize,
    },

    /// Stored artifact was produced from different training data.
    #[error("artifact mismatch: {0}")]
    ArtifactMismatch(String),

    /// Invalid or corrupt tensor/artifact file.
    #[error("Invalid model format: {0}")]
    FormatError(String),

    /// Source content for a matched commit could not be retrieved.
    #[error("cannot retrieve {path} at {commit} from {repository}: {message}")]
    SourceRetrieval {
        /// Repository identifier
        repository: String,
        /// Commit identifier
        commit: String,
        /// File path inside the repository
        path: String,
        /// Underlying failure
        message: String,
    },

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader/writer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A pipeline stage failed.
    #[error("stage '{stage}' failed: {source}")]
    StageFailed {
        /// Stage that failed
        stage: Stage,
        /// Underlying error
        #[source]
        source: Box<SimfinError>,
    },
}

impl From<&str> for SimfinError {
    fn from(msg: &str) -> Self {
        SimfinError::FormatError(msg.to_string())
    }
}

impl From<serde_json::Error> for SimfinError {
    fn from(err: serde_json::Error) -> Self {
        SimfinError::Serialization(err.to_string())
    }
}

impl SimfinError {
    /// Create a dimension mismatch error with descriptive context
    #[must_use]
    pub fn dimension_mismatch(context: &str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            expected: format!("{context}={expected}"),
            actual: format!("{actual}"),
        }
    }

    /// Create an empty input error
    #[must_use]
    pub fn empty_input(context: &str) -> Self {
        Self::EmptyInput(context.to_string())
    }

    /// Create an invalid hyperparameter error
    #[must_use]
    pub fn invalid_hyperparameter(param: &str, value: impl fmt::Display, constraint: &str) -> Self {
        Self::InvalidHyperparameter {
            param: param.to_string(),
            value: value.to_string(),
            constraint: constraint.to_string(),
        }
    }

    /// Returns the stage this error was raised in, if it came out of a pipeline run.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns the innermost error, unwrapping stage context.
    #[must_use]
    pub fn root(&self) -> &SimfinError {
        match self {
            Self::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Attaches a pipeline [`Stage`] to an error.
pub trait StageContext<T> {
    /// Wraps an error in [`SimfinError::StageFailed`] for `stage`.
    ///
    /// # Errors
    ///
    /// Returns the wrapped error when `self` is an error.
    fn in_stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn in_stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| match e {
            already @ SimfinError::StageFailed { .. } => already,
            other => SimfinError::StageFailed {
                stage,
                source: Box::new(other),
            },
        })
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, SimfinError>;
