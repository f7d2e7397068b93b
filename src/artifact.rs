//! Versioned store for trained scaler and encoder artifacts.
//!
//! ```text
//! <root>/<model_name>/
//!   v1/
//!     manifest.json
//!     scaler.safetensors
//!     encoder.safetensors
//!   v2/
//!     ...
//! ```
//!
//! Versions are immutable. A new version is written into a staging
//! directory next to the versions and renamed into place once complete, so
//! readers only ever see whole versions and a failed write leaves earlier
//! versions untouched. Concurrent writers for the same model are not
//! supported.

use crate::error::{Result, SimfinError};
use crate::nn::Encoder;
use crate::preprocessing::MinMaxScaler;
use crate::serialization::atomic_write;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Manifest layout written by this crate.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const SCALER_FILE: &str = "scaler.safetensors";
const ENCODER_FILE: &str = "encoder.safetensors";

/// Description of one stored version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// Manifest layout version.
    pub format_version: u32,
    /// Model the version belongs to.
    pub model_name: String,
    /// Version number, starting at 1.
    pub version: u32,
    /// Harmonized input dimensionality the scaler and encoder expect.
    pub input_dim: usize,
    /// Width of the encoder output.
    pub latent_dim: usize,
    /// Seed used for initialization and shuffling.
    pub seed: u64,
    /// Number of training instances.
    pub train_instances: usize,
    /// SHA-256 fingerprint of the training change vectors.
    pub train_fingerprint: String,
    /// Reconstruction loss after the last epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_loss: Option<f32>,
}

impl ArtifactManifest {
    /// Checks that data with `input_dim` columns and training fingerprint
    /// `train_fingerprint` can be used with this version.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::ModelShapeMismatch`] if the dimensionality
    /// differs and [`SimfinError::ArtifactMismatch`] if the fingerprint does.
    pub fn check_compatible(&self, input_dim: usize, train_fingerprint: &str) -> Result<()> {
        if input_dim != self.input_dim {
            return Err(SimfinError::ModelShapeMismatch {
                expected: self.input_dim,
                actual: input_dim,
            });
        }
        if train_fingerprint != self.train_fingerprint {
            return Err(SimfinError::ArtifactMismatch(format!(
                "{} v{} was trained on data with fingerprint {}, current training data has {}",
                self.model_name, self.version, self.train_fingerprint, train_fingerprint
            )));
        }
        Ok(())
    }
}

/// A version read back from the store.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    /// Version directory.
    pub dir: PathBuf,
    /// Stored manifest.
    pub manifest: ArtifactManifest,
    /// Fitted scaler.
    pub scaler: MinMaxScaler,
    /// Trained encoder.
    pub encoder: Encoder,
}

/// File-system artifact store rooted at one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `root`. Nothing is created on disk yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every version of `model_name`.
    #[must_use]
    pub fn model_dir(&self, model_name: &str) -> PathBuf {
        self.root.join(model_name)
    }

    /// Directory of one version.
    #[must_use]
    pub fn version_dir(&self, model_name: &str, version: u32) -> PathBuf {
        self.model_dir(model_name).join(format!("v{version}"))
    }

    /// Stored versions of `model_name`, ascending. Empty if none exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the model directory exists but cannot be listed.
    pub fn versions(&self, model_name: &str) -> Result<Vec<u32>> {
        let dir = self.model_dir(model_name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(v) = name
                .to_str()
                .and_then(|n| n.strip_prefix('v'))
                .and_then(|n| n.parse::<u32>().ok())
            {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Newest stored version of `model_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model directory cannot be listed.
    pub fn latest_version(&self, model_name: &str) -> Result<Option<u32>> {
        Ok(self.versions(model_name)?.last().copied())
    }

    /// Writes a new version and returns its manifest.
    ///
    /// `manifest.version` and `manifest.format_version` are assigned by the
    /// store.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::NotFitted`] for an unfitted scaler,
    /// [`SimfinError::ArtifactMismatch`] if the scaler, encoder and manifest
    /// disagree on dimensions, or an I/O error. On error no version is added.
    pub fn save(
        &self,
        mut manifest: ArtifactManifest,
        scaler: &MinMaxScaler,
        encoder: &Encoder,
    ) -> Result<ArtifactManifest> {
        check_parts(&manifest, scaler, encoder)?;

        let model_dir = self.model_dir(&manifest.model_name);
        fs::create_dir_all(&model_dir)?;
        let version = self.latest_version(&manifest.model_name)?.map_or(1, |v| v + 1);
        manifest.version = version;
        manifest.format_version = MANIFEST_FORMAT_VERSION;

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&model_dir)?;
        scaler.save_safetensors(staging.path().join(SCALER_FILE))?;
        encoder.save_safetensors(staging.path().join(ENCODER_FILE))?;
        let json = serde_json::to_vec_pretty(&manifest)?;
        atomic_write(staging.path().join(MANIFEST_FILE), &json)?;
        debug!(staging = %staging.path().display(), "artifact staged");

        let target = self.version_dir(&manifest.model_name, version);
        if target.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            )
            .into());
        }
        fs::rename(staging.path(), &target)?;

        info!(
            model = %manifest.model_name,
            version,
            dir = %target.display(),
            input_dim = manifest.input_dim,
            latent_dim = manifest.latent_dim,
            "artifact version written"
        );
        Ok(manifest)
    }

    /// Loads `version` of `model_name`, or the newest when `version` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::ModelNotFound`] if no such version exists,
    /// [`SimfinError::ArtifactMismatch`] if the stored parts disagree, or a
    /// format error for corrupt files.
    pub fn load(&self, model_name: &str, version: Option<u32>) -> Result<LoadedArtifact> {
        let version = match version {
            Some(v) => v,
            None => self
                .latest_version(model_name)?
                .ok_or_else(|| SimfinError::ModelNotFound {
                    path: self.model_dir(model_name),
                })?,
        };
        let dir = self.version_dir(model_name, version);
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(SimfinError::ModelNotFound { path: dir });
        }

        let manifest: ArtifactManifest = serde_json::from_slice(&fs::read(&manifest_path)?)?;
        if manifest.format_version != MANIFEST_FORMAT_VERSION {
            return Err(SimfinError::FormatError(format!(
                "unsupported manifest format version {} in {}",
                manifest.format_version,
                manifest_path.display()
            )));
        }
        if manifest.model_name != model_name || manifest.version != version {
            return Err(SimfinError::ArtifactMismatch(format!(
                "{} describes {} v{}",
                manifest_path.display(),
                manifest.model_name,
                manifest.version
            )));
        }

        let scaler = MinMaxScaler::load_safetensors(dir.join(SCALER_FILE))?;
        let encoder = Encoder::load_safetensors(dir.join(ENCODER_FILE))?;
        check_parts(&manifest, &scaler, &encoder)?;

        info!(model = model_name, version, dir = %dir.display(), "artifact version loaded");
        Ok(LoadedArtifact {
            dir,
            manifest,
            scaler,
            encoder,
        })
    }
}

fn check_parts(manifest: &ArtifactManifest, scaler: &MinMaxScaler, encoder: &Encoder) -> Result<()> {
    let scaler_dim = scaler
        .state()
        .ok_or(SimfinError::NotFitted("MinMaxScaler"))?
        .n_features();
    let mismatch = |what: &str, actual: usize, expected: usize| {
        SimfinError::ArtifactMismatch(format!(
            "{what} is {actual} but the manifest records {expected}"
        ))
    };
    if scaler_dim != manifest.input_dim {
        return Err(mismatch("scaler width", scaler_dim, manifest.input_dim));
    }
    if encoder.input_dim() != manifest.input_dim {
        return Err(mismatch("encoder input width", encoder.input_dim(), manifest.input_dim));
    }
    if encoder.latent_dim() != manifest.latent_dim {
        return Err(mismatch("encoder latent width", encoder.latent_dim(), manifest.latent_dim));
    }
    Ok(())
}
