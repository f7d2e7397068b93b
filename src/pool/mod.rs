//! Candidate pools: old/new source snapshots of the matched historical fixes.
//!
//! For every neighbor of a query, the file is read at the matched
//! bug-inducing commit (`old`) and at the matched bug-fixing commit (`new`)
//! from the origin repository, and both are written to the pool directory:
//!
//! ```text
//! pool/
//!   Math_rank-1_old.java
//!   Math_rank-1_new.java
//!   Math_rank-3_old.java     <- rank 2 could not be retrieved
//!   Math_rank-3_new.java
//! ```
//!
//! A match whose source cannot be retrieved is dropped and logged; the rest
//! of the pool is still built.

use crate::config::SourcesConfig;
use crate::error::{Result, SimfinError};
use crate::index::NeighborMatch;
use crate::ingest::InstanceLabel;
use crate::serialization::atomic_write;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Extension used when the matched path has none.
pub const DEFAULT_EXTENSION: &str = "java";

/// Supplies file content at a given commit of a repository.
pub trait SourceProvider {
    /// Returns the bytes of `path` as of `commit` in `repository`.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::SourceRetrieval`] if the file, commit or
    /// repository is unavailable.
    fn fetch(&self, repository: &str, commit: &str, path: &str) -> Result<Vec<u8>>;
}

/// Reads files from local git clones laid out as `<root>/<repository>`.
///
/// Uses `git show <commit>:<path>`, so the working tree is never checked
/// out or modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSourceProvider {
    repositories_root: PathBuf,
}

impl GitSourceProvider {
    /// Creates a provider over clones under `repositories_root`.
    #[must_use]
    pub fn new(repositories_root: impl Into<PathBuf>) -> Self {
        Self {
            repositories_root: repositories_root.into(),
        }
    }

    /// Directory holding one clone per repository.
    #[must_use]
    pub fn repositories_root(&self) -> &Path {
        &self.repositories_root
    }

    /// Directory holding the clone of `repository`.
    #[must_use]
    pub fn repository_dir(&self, repository: &str) -> PathBuf {
        self.repositories_root.join(repository)
    }
}

impl From<&SourcesConfig> for GitSourceProvider {
    fn from(config: &SourcesConfig) -> Self {
        Self::new(&config.repositories_root)
    }
}

impl SourceProvider for GitSourceProvider {
    fn fetch(&self, repository: &str, commit: &str, path: &str) -> Result<Vec<u8>> {
        let failure = |message: String| SimfinError::SourceRetrieval {
            repository: repository.to_string(),
            commit: commit.to_string(),
            path: path.to_string(),
            message,
        };

        let repo_dir = self.repository_dir(repository);
        if !repo_dir.is_dir() {
            return Err(failure(format!(
                "repository clone {} does not exist",
                repo_dir.display()
            )));
        }

        let object = format!("{commit}:{}", path.trim_start_matches("./"));
        let output = Command::new("git")
            .arg("show")
            .arg(&object)
            .current_dir(&repo_dir)
            .output()
            .map_err(|e| failure(format!("failed to execute git: {e}")))?;

        if !output.status.success() {
            return Err(failure(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

/// Where a matched training instance came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOrigin {
    /// Origin repository identifier.
    pub project: String,
    /// Matched bug-inducing commit.
    pub bic_sha: String,
    /// File path read at the bug-inducing commit.
    pub bic_path: String,
    /// Matched bug-fixing commit.
    pub bfc_sha: String,
    /// File path read at the bug-fixing commit.
    pub bfc_path: String,
}

impl From<&InstanceLabel> for MatchOrigin {
    fn from(label: &InstanceLabel) -> Self {
        Self {
            project: label.project.clone(),
            bic_sha: label.bic_sha.clone(),
            bic_path: label.before_bic_path.clone(),
            bfc_sha: label.bfc_sha.clone(),
            bfc_path: label.before_bfc_path.clone(),
        }
    }
}

impl MatchOrigin {
    /// Extension of the matched file, or [`DEFAULT_EXTENSION`].
    #[must_use]
    pub fn extension(&self) -> &str {
        [&self.bfc_path, &self.bic_path]
            .into_iter()
            .find_map(|p| Path::new(p).extension().and_then(|e| e.to_str()))
            .unwrap_or(DEFAULT_EXTENSION)
    }
}

/// One materialized old/new pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    /// Rank of the match that produced the pair.
    pub rank: usize,
    /// Training row of the match.
    pub train_index: usize,
    /// Origin of the pair.
    pub origin: MatchOrigin,
    /// File with the content at the bug-inducing commit.
    pub old_file: PathBuf,
    /// File with the content at the bug-fixing commit.
    pub new_file: PathBuf,
}

/// A match that could not be materialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolFailure {
    /// Rank of the dropped match.
    pub rank: usize,
    /// Training row of the dropped match.
    pub train_index: usize,
    /// Why retrieval failed.
    pub reason: String,
}

/// The pool handed to the repair tool, possibly partial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePool {
    /// Directory holding the pool files.
    pub dir: PathBuf,
    /// Materialized pairs in rank order.
    pub entries: Vec<PoolEntry>,
    /// Dropped matches in rank order.
    pub failures: Vec<PoolFailure>,
}

impl CandidatePool {
    /// Number of materialized pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no pair could be materialized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Materializes candidate pools through a [`SourceProvider`].
pub struct CandidatePoolBuilder<'a> {
    provider: &'a dyn SourceProvider,
}

impl<'a> CandidatePoolBuilder<'a> {
    /// Creates a builder reading sources through `provider`.
    #[must_use]
    pub fn new(provider: &'a dyn SourceProvider) -> Self {
        Self { provider }
    }

    /// Builds the pool for one query.
    ///
    /// `origin_of` maps a match's training index to its origin; a match
    /// without an origin is dropped like a failed retrieval. Pool files from
    /// an earlier build in `out_dir` are removed first.
    ///
    /// # Errors
    ///
    /// Only fails if `out_dir` cannot be prepared. Retrieval and per-file
    /// write failures are recorded in [`CandidatePool::failures`].
    pub fn build<F>(
        &self,
        query_project: &str,
        matches: &[NeighborMatch],
        origin_of: F,
        out_dir: &Path,
    ) -> Result<CandidatePool>
    where
        F: Fn(usize) -> Option<MatchOrigin>,
    {
        fs::create_dir_all(out_dir)?;
        remove_stale_pool_files(out_dir)?;

        let mut pool = CandidatePool {
            dir: out_dir.to_path_buf(),
            ..CandidatePool::default()
        };

        for m in matches {
            let outcome = origin_of(m.train_index)
                .ok_or_else(|| {
                    SimfinError::FormatError(format!(
                        "no origin recorded for training row {}",
                        m.train_index
                    ))
                })
                .and_then(|origin| self.materialize(query_project, m, origin, out_dir));

            match outcome {
                Ok(entry) => {
                    debug!(rank = m.rank, project = %entry.origin.project, "pool entry written");
                    pool.entries.push(entry);
                }
                Err(err) => {
                    warn!(
                        rank = m.rank,
                        train_index = m.train_index,
                        error = %err,
                        "dropping match from candidate pool"
                    );
                    pool.failures.push(PoolFailure {
                        rank: m.rank,
                        train_index: m.train_index,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            dir = %out_dir.display(),
            entries = pool.entries.len(),
            dropped = pool.failures.len(),
            "candidate pool built"
        );
        Ok(pool)
    }

    fn materialize(
        &self,
        query_project: &str,
        m: &NeighborMatch,
        origin: MatchOrigin,
        out_dir: &Path,
    ) -> Result<PoolEntry> {
        // Fetch both sides before writing so a failed match leaves no files.
        let old = self
            .provider
            .fetch(&origin.project, &origin.bic_sha, &origin.bic_path)?;
        let new = self
            .provider
            .fetch(&origin.project, &origin.bfc_sha, &origin.bfc_path)?;

        let ext = origin.extension();
        let old_file = out_dir.join(pool_file_name(query_project, m.rank, "old", ext));
        let new_file = out_dir.join(pool_file_name(query_project, m.rank, "new", ext));
        atomic_write(&old_file, &old)?;
        if let Err(err) = atomic_write(&new_file, &new) {
            let _ = fs::remove_file(&old_file);
            return Err(err);
        }

        Ok(PoolEntry {
            rank: m.rank,
            train_index: m.train_index,
            origin,
            old_file,
            new_file,
        })
    }
}

/// `{project}_rank-{rank}_{side}.{ext}`
#[must_use]
pub fn pool_file_name(query_project: &str, rank: usize, side: &str, ext: &str) -> String {
    format!("{query_project}_rank-{rank}_{side}.{ext}")
}

fn remove_stale_pool_files(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
        if name.contains("_rank-")
            && (stem.ends_with("_old") || stem.ends_with("_new"))
            && entry.file_type()?.is_file()
        {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
