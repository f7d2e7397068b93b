//! Pipeline configuration.
//!
//! Loaded from YAML. Relative paths in a configuration file are resolved
//! against the directory containing that file, never against the process
//! working directory.
//!
//! ```yaml
//! train:
//!   vectors: data/X_train.csv
//!   labels: data/Y_train.csv
//! query:
//!   vectors: data/X_test.csv
//!   labels: data/Y_test.csv
//!   fallback:
//!     vectors: offline/X_test.csv
//!     labels: offline/Y_test.csv
//! artifacts:
//!   root: models
//!   model_name: train_all
//! encoder:
//!   epochs: 20
//!   seed: 0
//!   optimizer:
//!     kind: adadelta
//!     learning_rate: 1.0
//! index:
//!   k: 10
//!   metric: manhattan
//! output:
//!   result_csv: out/result.csv
//!   pool_dir: out/pool
//!   neighbor_dump: out/kneighbors.txt
//! sources:
//!   repositories_root: repositories
//! ```

use crate::error::{Result, SimfinError};
use crate::index::IndexConfig;
use crate::nn::AutoencoderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A change-vector file and its parallel label file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetPaths {
    /// Headerless CSV of ragged integer rows.
    pub vectors: PathBuf,
    /// Headerless 12-column label CSV.
    pub labels: PathBuf,
}

impl DatasetPaths {
    fn resolve(&mut self, base: &Path) {
        resolve(&mut self.vectors, base);
        resolve(&mut self.labels, base);
    }
}

/// Query dataset, optionally backed by an offline copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// Change-vector file.
    pub vectors: PathBuf,
    /// Label file.
    pub labels: PathBuf,
    /// Dataset used when the primary files cannot be loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<DatasetPaths>,
}

impl QueryConfig {
    /// The primary dataset paths.
    #[must_use]
    pub fn primary(&self) -> DatasetPaths {
        DatasetPaths {
            vectors: self.vectors.clone(),
            labels: self.labels.clone(),
        }
    }
}

/// Where trained artifacts are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactConfig {
    /// Root of the artifact store.
    pub root: PathBuf,
    /// Model name; versions live under `root/model_name`.
    pub model_name: String,
}

/// Where results are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Ranked-result CSV.
    pub result_csv: PathBuf,
    /// Parent directory of the per-query candidate pools.
    pub pool_dir: PathBuf,
    /// Directory for latent dumps; none are written when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latent_dump_dir: Option<PathBuf>,
    /// Text dump of every query's neighbor distances and training rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighbor_dump: Option<PathBuf>,
    /// Distance-weighted label prediction per query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_predictions: Option<PathBuf>,
}

/// Where origin repositories are cloned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    /// Directory holding one clone per repository identifier.
    pub repositories_root: PathBuf,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Training corpus.
    pub train: DatasetPaths,
    /// Query set.
    pub query: QueryConfig,
    /// Artifact store location.
    pub artifacts: ArtifactConfig,
    /// Autoencoder architecture and training.
    #[serde(default)]
    pub encoder: AutoencoderConfig,
    /// Neighbor search.
    #[serde(default)]
    pub index: IndexConfig,
    /// Output locations.
    pub output: OutputConfig,
    /// Repository clones for pool building.
    pub sources: SourcesConfig,
}

impl PipelineConfig {
    /// Parses and validates a YAML configuration.
    ///
    /// Relative paths are kept as written.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::Config`] if the YAML does not parse, or the
    /// validation error.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| SimfinError::Config(format!("failed to parse YAML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML configuration file.
    ///
    /// Relative paths are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::Config`] if the file cannot be read or parsed,
    /// or the validation error.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|e| {
            SimfinError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        let mut config = Self::from_yaml_str(&yaml)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Serializes the configuration back to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::Serialization`] on failure.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| SimfinError::Serialization(e.to_string()))
    }

    /// Checks value ranges and cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::Config`] for an unusable model name or
    /// [`SimfinError::InvalidHyperparameter`] for bad encoder/index settings.
    pub fn validate(&self) -> Result<()> {
        let name = self.artifacts.model_name.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(SimfinError::Config(format!(
                "artifacts.model_name '{name}' must be a single non-empty path component"
            )));
        }
        if self.query.fallback.as_ref() == Some(&self.query.primary()) {
            return Err(SimfinError::Config(
                "query.fallback must differ from the primary query dataset".to_string(),
            ));
        }
        self.encoder.validate()?;
        self.index.validate()
    }

    /// Makes every relative path absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        self.train.resolve(base);
        resolve(&mut self.query.vectors, base);
        resolve(&mut self.query.labels, base);
        if let Some(fallback) = &mut self.query.fallback {
            fallback.resolve(base);
        }
        resolve(&mut self.artifacts.root, base);
        resolve(&mut self.output.result_csv, base);
        resolve(&mut self.output.pool_dir, base);
        for path in [
            &mut self.output.latent_dump_dir,
            &mut self.output.neighbor_dump,
            &mut self.output.label_predictions,
        ]
        .into_iter()
        .flatten()
        {
            resolve(path, base);
        }
        resolve(&mut self.sources.repositories_root, base);
    }
}

fn resolve(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::DistanceMetric;
    use crate::nn::OptimizerConfig;

    const MINIMAL: &str = "
train:
  vectors: X_train.csv
  labels: Y_train.csv
query:
  vectors: X_test.csv
  labels: Y_test.csv
artifacts:
  root: models
  model_name: train_all
output:
  result_csv: out/result.csv
  pool_dir: out/pool
sources:
  repositories_root: repos
";

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = PipelineConfig::from_yaml_str(MINIMAL).expect("valid");
        assert_eq!(config.encoder, AutoencoderConfig::default());
        assert_eq!(config.index.k, 10);
        assert_eq!(config.index.metric, DistanceMetric::Manhattan);
        assert!(config.query.fallback.is_none());
        assert!(config.output.latent_dump_dir.is_none());
        assert!(config.output.neighbor_dump.is_none());
        assert!(config.output.label_predictions.is_none());
        assert_eq!(config.train.vectors, PathBuf::from("X_train.csv"));
    }

    #[test]
    fn test_full_config_overrides() {
        let yaml = format!(
            "{MINIMAL}encoder:\n  hidden_dims: [32, 16]\n  latent_dim: 8\n  seed: 7\n  optimizer:\n    kind: adam\n    learning_rate: 0.01\nindex:\n  k: 1\n"
        );
        let config = PipelineConfig::from_yaml_str(&yaml).expect("valid");
        assert_eq!(config.encoder.hidden_dims, vec![32, 16]);
        assert_eq!(config.encoder.latent_dim, 8);
        assert_eq!(config.encoder.seed, 7);
        assert_eq!(config.encoder.epochs, 20);
        assert_eq!(
            config.encoder.optimizer,
            OptimizerConfig::Adam { learning_rate: 0.01 }
        );
        assert_eq!(config.index.k, 1);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = format!("{MINIMAL}extra: 1\n");
        assert!(matches!(
            PipelineConfig::from_yaml_str(&yaml),
            Err(SimfinError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_k = format!("{MINIMAL}index:\n  k: 0\n");
        assert!(matches!(
            PipelineConfig::from_yaml_str(&zero_k),
            Err(SimfinError::InvalidHyperparameter { .. })
        ));

        let bad_name = MINIMAL.replace("model_name: train_all", "model_name: a/b");
        assert!(matches!(
            PipelineConfig::from_yaml_str(&bad_name),
            Err(SimfinError::Config(_))
        ));
    }

    #[test]
    fn test_fallback_must_differ() {
        let yaml = MINIMAL.replace(
            "  labels: Y_test.csv\n",
            "  labels: Y_test.csv\n  fallback:\n    vectors: X_test.csv\n    labels: Y_test.csv\n",
        );
        assert!(PipelineConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_file_paths_resolved_against_config_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("simfin.yaml");
        fs::write(&path, MINIMAL).expect("write");

        let config = PipelineConfig::from_yaml_file(&path).expect("load");
        assert_eq!(config.train.vectors, dir.path().join("X_train.csv"));
        assert_eq!(config.artifacts.root, dir.path().join("models"));
        assert_eq!(config.output.pool_dir, dir.path().join("out/pool"));
        assert_eq!(config.sources.repositories_root, dir.path().join("repos"));
    }

    #[test]
    fn test_optional_outputs_resolved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("simfin.yaml");
        let yaml = MINIMAL.replace(
            "  pool_dir: out/pool\n",
            "  pool_dir: out/pool\n  neighbor_dump: out/kn.txt\n  label_predictions: out/predict.txt\n",
        );
        fs::write(&path, yaml).expect("write");

        let config = PipelineConfig::from_yaml_file(&path).expect("load");
        assert_eq!(config.output.neighbor_dump, Some(dir.path().join("out/kn.txt")));
        assert_eq!(
            config.output.label_predictions,
            Some(dir.path().join("out/predict.txt"))
        );
        assert!(config.output.latent_dump_dir.is_none());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            PipelineConfig::from_yaml_file(dir.path().join("absent.yaml")),
            Err(SimfinError::Config(_))
        ));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = PipelineConfig::from_yaml_str(MINIMAL).expect("valid");
        let yaml = config.to_yaml().expect("serialize");
        assert_eq!(PipelineConfig::from_yaml_str(&yaml).expect("reparse"), config);
    }
}
