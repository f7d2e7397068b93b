//! Change-vector ingestion.
//!
//! Reads the structural-diff collaborator's output: a headerless CSV of
//! ragged integer rows (one change vector per instance) and a parallel
//! 12-column label file describing where each change came from.
//!
//! ```text
//! X_train.csv                  Y_train.csv
//! 3,0,12,7                     0,a/Foo.java,a/Foo.java,<sha>,<sha>,...,Math,Math-85
//! 5,,2                         1,b/Bar.java,...
//! ```
//!
//! Empty fields are read as zero. Any other token that is not a non-negative
//! integer aborts the read with [`SimfinError::MalformedInput`].

use crate::config::DatasetPaths;
use crate::error::{Result, SimfinError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Marker the collector writes into the index column of a placeholder row.
pub const PLACEHOLDER_LABEL: &str = "dummy";

/// Value of a label column the collector could not fill.
pub const MISSING_FIELD: &str = "-";

/// Discretized structural-edit tokens for one code change.
///
/// Variable length per instance; every value is a non-negative token code.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangeVector(Vec<u32>);

impl ChangeVector {
    /// Wraps a token sequence.
    #[must_use]
    pub fn new(tokens: Vec<u32>) -> Self {
        Self(tokens)
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the vector has no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Token codes in order.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// Returns a copy right-padded with zeros to `len`.
    ///
    /// Never truncates: a vector already longer than `len` is returned whole.
    #[must_use]
    pub fn padded(&self, len: usize) -> Self {
        let mut tokens = self.0.clone();
        if tokens.len() < len {
            tokens.resize(len, 0);
        }
        Self(tokens)
    }

    /// Token codes widened to `f32` for the numeric stages.
    #[must_use]
    pub fn to_f32(&self) -> Vec<f32> {
        self.0.iter().map(|&t| t as f32).collect()
    }
}

impl From<Vec<u32>> for ChangeVector {
    fn from(tokens: Vec<u32>) -> Self {
        Self(tokens)
    }
}

/// Metadata row from a label file.
///
/// Columns, in file order: index, before-BIC path, BIC path, before-BIC SHA,
/// BIC SHA, before-BFC path, BFC path, before-BFC SHA, BFC SHA, grouping key,
/// origin project, ground-truth label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceLabel {
    /// Row index as written by the collector.
    pub index: String,
    /// File path before the bug-inducing commit.
    pub before_bic_path: String,
    /// File path at the bug-inducing commit.
    pub bic_path: String,
    /// Parent of the bug-inducing commit.
    pub before_bic_sha: String,
    /// Bug-inducing commit.
    pub bic_sha: String,
    /// File path before the bug-fixing commit.
    pub before_bfc_path: String,
    /// File path at the bug-fixing commit.
    pub bfc_path: String,
    /// Parent of the bug-fixing commit.
    pub before_bfc_sha: String,
    /// Bug-fixing commit.
    pub bfc_sha: String,
    /// Grouping key.
    pub key: String,
    /// Origin project / repository identifier.
    pub project: String,
    /// Ground-truth label (`Project-BugId`), or `dummy` for placeholders.
    pub label: String,
}

impl InstanceLabel {
    /// Number of columns in a label row.
    pub const COLUMNS: usize = 12;

    /// True for placeholder query rows that must not produce results.
    ///
    /// The collector appends `dummy,-,-,...,-` for inference-only runs; a row
    /// with `dummy` as index or label, or a missing label, is a placeholder.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.index == PLACEHOLDER_LABEL
            || self.label == PLACEHOLDER_LABEL
            || self.label == MISSING_FIELD
    }

    /// True when the row names the bug-inducing commit of the query.
    ///
    /// Rows without one are ranked but get no candidate pool.
    #[must_use]
    pub fn has_bic_commit(&self) -> bool {
        !self.before_bic_sha.is_empty() && self.before_bic_sha != MISSING_FIELD
    }

    /// Splits the label into `(project, bug_id)` at the last `-`.
    ///
    /// A label without a dash yields the whole label and a `-` bug id.
    #[must_use]
    pub fn bug_identity(&self) -> (&str, &str) {
        match self.label.rsplit_once('-') {
            Some((project, bug)) if !project.is_empty() && !bug.is_empty() => (project, bug),
            _ => (self.label.as_str(), "-"),
        }
    }
}

/// One change vector together with its metadata.
#[derive(Debug, Clone, Copy)]
pub struct LabeledInstance<'a> {
    /// Position in the dataset.
    pub index: usize,
    /// The change vector.
    pub vector: &'a ChangeVector,
    /// Its metadata row.
    pub label: &'a InstanceLabel,
}

/// A training corpus or query set: vectors and labels, row-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    vectors: Vec<ChangeVector>,
    labels: Vec<InstanceLabel>,
}

impl Dataset {
    /// Pairs vectors with labels.
    ///
    /// # Errors
    ///
    /// Returns an error if the two sequences differ in length.
    pub fn new(vectors: Vec<ChangeVector>, labels: Vec<InstanceLabel>) -> Result<Self> {
        if vectors.len() != labels.len() {
            return Err(SimfinError::dimension_mismatch(
                "label rows",
                vectors.len(),
                labels.len(),
            ));
        }
        Ok(Self { vectors, labels })
    }

    /// Reads a vector file and its label file.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::MalformedInput`] for unparsable rows or when the
    /// files have different row counts.
    pub fn from_files(vectors: impl AsRef<Path>, labels: impl AsRef<Path>) -> Result<Self> {
        let labels_path = labels.as_ref();
        let vectors = read_change_vectors(vectors)?;
        let labels = read_labels(labels_path)?;
        if vectors.len() != labels.len() {
            return Err(SimfinError::MalformedInput {
                path: labels_path.to_path_buf(),
                row: vectors.len().min(labels.len()),
                message: format!(
                    "{} label rows for {} change vectors",
                    labels.len(),
                    vectors.len()
                ),
            });
        }
        Ok(Self { vectors, labels })
    }

    /// Number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns true if the dataset has no instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Change vectors in row order.
    #[must_use]
    pub fn vectors(&self) -> &[ChangeVector] {
        &self.vectors
    }

    /// Label rows in row order.
    #[must_use]
    pub fn labels(&self) -> &[InstanceLabel] {
        &self.labels
    }

    /// Instance at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<LabeledInstance<'_>> {
        Some(LabeledInstance {
            index,
            vector: self.vectors.get(index)?,
            label: self.labels.get(index)?,
        })
    }

    /// Iterates over instances in row order.
    pub fn instances(&self) -> impl Iterator<Item = LabeledInstance<'_>> + '_ {
        self.vectors
            .iter()
            .zip(&self.labels)
            .enumerate()
            .map(|(index, (vector, label))| LabeledInstance {
                index,
                vector,
                label,
            })
    }

    /// Longest vector length in the dataset (0 when empty).
    #[must_use]
    pub fn max_len(&self) -> usize {
        self.vectors.iter().map(ChangeVector::len).max().unwrap_or(0)
    }

    /// SHA-256 over the vectors, each zero-padded to the dataset's own
    /// maximum length, so the digest ignores trailing-field raggedness.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let width = self.max_len();
        let mut hasher = Sha256::new();
        hasher.update((self.vectors.len() as u64).to_le_bytes());
        hasher.update((width as u64).to_le_bytes());
        for vector in &self.vectors {
            for &token in vector.padded(width).as_slice() {
                hasher.update(token.to_le_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Reads a headerless CSV of ragged integer rows.
///
/// Row `i` of the file becomes element `i` of the result.
///
/// # Errors
///
/// Returns [`SimfinError::MalformedInput`] naming the file and row for any
/// token that is neither empty nor a non-negative integer.
pub fn read_change_vectors(path: impl AsRef<Path>) -> Result<Vec<ChangeVector>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| malformed(path, 0, format!("cannot open vector file: {e}")))?;

    let mut vectors = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| malformed(path, row, e.to_string()))?;
        let mut tokens = Vec::with_capacity(record.len());
        for (column, field) in record.iter().enumerate() {
            tokens.push(parse_token(field).ok_or_else(|| {
                malformed(
                    path,
                    row,
                    format!("column {column}: token '{field}' is not a non-negative integer"),
                )
            })?);
        }
        vectors.push(ChangeVector(tokens));
    }
    Ok(vectors)
}

/// Reads a headerless 12-column label file.
///
/// # Errors
///
/// Returns [`SimfinError::MalformedInput`] naming the file and row when a
/// row has missing columns or cannot be read.
pub fn read_labels(path: impl AsRef<Path>) -> Result<Vec<InstanceLabel>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| malformed(path, 0, format!("cannot open label file: {e}")))?;

    let mut labels = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| malformed(path, row, e.to_string()))?;
        if record.len() < InstanceLabel::COLUMNS {
            return Err(malformed(
                path,
                row,
                format!(
                    "expected {} label columns, found {}",
                    InstanceLabel::COLUMNS,
                    record.len()
                ),
            ));
        }
        let label: InstanceLabel = record
            .deserialize(None)
            .map_err(|e| malformed(path, row, e.to_string()))?;
        labels.push(label);
    }
    Ok(labels)
}

fn parse_token(field: &str) -> Option<u32> {
    if field.is_empty() {
        return Some(0);
    }
    field.parse::<u32>().ok()
}

fn malformed(path: &Path, row: usize, message: String) -> SimfinError {
    SimfinError::MalformedInput {
        path: path.to_path_buf(),
        row,
        message,
    }
}

/// Supplier of a labeled dataset.
///
/// The ingest stage only sees this interface, so an offline copy of the data
/// can stand in for the live extractor without the pipeline knowing.
pub trait VectorSource {
    /// Loads the dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be read or parsed.
    fn load(&self) -> Result<Dataset>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// A vector file plus its label file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvVectorSource {
    vectors: PathBuf,
    labels: PathBuf,
}

impl CsvVectorSource {
    /// Creates a source reading `vectors` and `labels`.
    #[must_use]
    pub fn new(vectors: impl Into<PathBuf>, labels: impl Into<PathBuf>) -> Self {
        Self {
            vectors: vectors.into(),
            labels: labels.into(),
        }
    }
}

impl From<&DatasetPaths> for CsvVectorSource {
    fn from(paths: &DatasetPaths) -> Self {
        Self::new(&paths.vectors, &paths.labels)
    }
}

impl VectorSource for CsvVectorSource {
    fn load(&self) -> Result<Dataset> {
        let dataset = Dataset::from_files(&self.vectors, &self.labels)?;
        info!(
            source = %self.describe(),
            instances = dataset.len(),
            max_len = dataset.max_len(),
            "loaded change vectors"
        );
        Ok(dataset)
    }

    fn describe(&self) -> String {
        format!("{} + {}", self.vectors.display(), self.labels.display())
    }
}

/// Uses `primary`, or `fallback` when `primary` fails to load.
#[derive(Debug, Clone)]
pub struct FallbackVectorSource<P, F> {
    primary: P,
    fallback: F,
}

impl<P: VectorSource, F: VectorSource> FallbackVectorSource<P, F> {
    /// Creates a source that falls back from `primary` to `fallback`.
    #[must_use]
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: VectorSource, F: VectorSource> VectorSource for FallbackVectorSource<P, F> {
    fn load(&self) -> Result<Dataset> {
        match self.primary.load() {
            Ok(dataset) => Ok(dataset),
            Err(err) => {
                warn!(
                    primary = %self.primary.describe(),
                    fallback = %self.fallback.describe(),
                    error = %err,
                    "primary vector source failed, using fallback"
                );
                self.fallback.load()
            }
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} (fallback: {})",
            self.primary.describe(),
            self.fallback.describe()
        )
    }
}

#[cfg(test)]
mod tests;
