//! Ranked-result CSV, latent and neighbor dumps, and label predictions.
//!
//! The result file has one row per (query, neighbor) pair, in query order and
//! then rank order, under the header expected by the downstream pool and
//! repair tooling:
//!
//! ```text
//! Y_BIC_SHA,Y_BIC_Path,Y_Project,Y_BugId,Rank,Sim-Score,Y^_Project,Y^_BIC_SHA,Y^_BIC_Path,Y^_BFC_SHA,Y^_BFC_Path,Y^_BFC_Hunk
//! ```

use crate::error::{Result, SimfinError};
use crate::index::NeighborMatch;
use crate::ingest::InstanceLabel;
use crate::pool::MatchOrigin;
use crate::primitives::Matrix;
use crate::serialization::atomic_write;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

/// Distance below which a rank-1 neighbor counts as an exact match.
pub const EXACT_MATCH_THRESHOLD: f32 = 0.001;

/// Value written to the hunk column, which is not computed.
pub const NO_HUNK: &str = "-";

/// One row of the ranked-result CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborRecord {
    /// Query bug-inducing commit.
    #[serde(rename = "Y_BIC_SHA")]
    pub query_bic_sha: String,
    /// Query file path.
    #[serde(rename = "Y_BIC_Path")]
    pub query_bic_path: String,
    /// Query project.
    #[serde(rename = "Y_Project")]
    pub query_project: String,
    /// Query bug id.
    #[serde(rename = "Y_BugId")]
    pub query_bug_id: String,
    /// 1-based neighbor rank.
    #[serde(rename = "Rank")]
    pub rank: usize,
    /// Latent distance to the neighbor.
    #[serde(rename = "Sim-Score")]
    pub distance: f32,
    /// Matched origin repository.
    #[serde(rename = "Y^_Project")]
    pub match_project: String,
    /// Matched bug-inducing commit.
    #[serde(rename = "Y^_BIC_SHA")]
    pub match_bic_sha: String,
    /// Matched file path at the bug-inducing commit.
    #[serde(rename = "Y^_BIC_Path")]
    pub match_bic_path: String,
    /// Matched bug-fixing commit.
    #[serde(rename = "Y^_BFC_SHA")]
    pub match_bfc_sha: String,
    /// Matched file path at the bug-fixing commit.
    #[serde(rename = "Y^_BFC_Path")]
    pub match_bfc_path: String,
    /// Always [`NO_HUNK`].
    #[serde(rename = "Y^_BFC_Hunk")]
    pub match_bfc_hunk: String,
}

impl NeighborRecord {
    /// Builds the row for `query` and one of its neighbors.
    #[must_use]
    pub fn new(query: &InstanceLabel, neighbor: &NeighborMatch, origin: &MatchOrigin) -> Self {
        let (project, bug_id) = query.bug_identity();
        Self {
            query_bic_sha: query.before_bic_sha.clone(),
            query_bic_path: query.before_bic_path.clone(),
            query_project: project.to_string(),
            query_bug_id: bug_id.to_string(),
            rank: neighbor.rank,
            distance: neighbor.distance,
            match_project: origin.project.clone(),
            match_bic_sha: origin.bic_sha.clone(),
            match_bic_path: origin.bic_path.clone(),
            match_bfc_sha: origin.bfc_sha.clone(),
            match_bfc_path: origin.bfc_path.clone(),
            match_bfc_hunk: NO_HUNK.to_string(),
        }
    }
}

/// Writes `records` with a header row, replacing `path` atomically.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_results(path: impl AsRef<Path>, records: &[NeighborRecord]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_writer(Vec::new());
    if records.is_empty() {
        writer.write_record(RESULT_HEADER)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    atomic_write(path, &bytes)?;
    info!(path = %path.display(), rows = records.len(), "ranked results written");
    Ok(())
}

/// Reads a result file written by [`write_results`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or a row does not parse.
pub fn read_results(path: impl AsRef<Path>) -> Result<Vec<NeighborRecord>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    reader
        .deserialize::<NeighborRecord>()
        .map(|row| row.map_err(SimfinError::from))
        .collect()
}

/// Column names of the result file.
pub const RESULT_HEADER: [&str; 12] = [
    "Y_BIC_SHA",
    "Y_BIC_Path",
    "Y_Project",
    "Y_BugId",
    "Rank",
    "Sim-Score",
    "Y^_Project",
    "Y^_BIC_SHA",
    "Y^_BIC_Path",
    "Y^_BFC_SHA",
    "Y^_BFC_Path",
    "Y^_BFC_Hunk",
];

/// Writes latent vectors as CSV: an unnamed index column, then `f0..fN`.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn write_latent_csv(path: impl AsRef<Path>, latents: &Matrix<f32>) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = Vec::with_capacity(latents.n_cols() + 1);
    header.push(String::new());
    header.extend((0..latents.n_cols()).map(|i| format!("f{i}")));
    writer.write_record(&header)?;

    for (i, row) in latents.rows().enumerate() {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(i.to_string());
        record.extend(row.iter().map(f32::to_string));
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    atomic_write(path, &bytes)?;
    info!(path = %path.display(), rows = latents.n_rows(), "latent vectors written");
    Ok(())
}

/// Writes one line per query: `<query>: [<distances>] [<training rows>]`.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn write_neighbor_dump<'a, I>(path: impl AsRef<Path>, results: I) -> Result<()>
where
    I: IntoIterator<Item = (usize, &'a [NeighborMatch])>,
{
    let path = path.as_ref();
    let mut text = String::new();
    let mut rows = 0;
    for (query_index, matches) in results {
        let distances: Vec<String> = matches.iter().map(|m| m.distance.to_string()).collect();
        let indices: Vec<String> = matches.iter().map(|m| m.train_index.to_string()).collect();
        // Writing to a String cannot fail.
        let _ = writeln!(
            text,
            "{query_index}: [{}] [{}]",
            distances.join(" "),
            indices.join(" ")
        );
        rows += 1;
    }
    atomic_write(path, text.as_bytes())?;
    info!(path = %path.display(), rows, "neighbor dump written");
    Ok(())
}

/// Distance-weighted vote over `matches`, keyed by training label.
///
/// Each neighbor votes with weight `1 / distance`. If any neighbor sits at
/// distance zero, only those neighbors vote. Equal totals go to the
/// lexicographically smaller label. Returns `None` when no neighbor has a
/// label.
#[must_use]
pub fn predict_label<'a, F>(matches: &[NeighborMatch], label_of: F) -> Option<&'a str>
where
    F: Fn(usize) -> Option<&'a str>,
{
    let exact = matches.iter().any(|m| m.distance == 0.0);
    let mut votes: BTreeMap<&str, f64> = BTreeMap::new();
    for m in matches {
        let Some(label) = label_of(m.train_index) else {
            continue;
        };
        let weight = match (exact, m.distance == 0.0) {
            (true, true) => 1.0,
            (true, false) => 0.0,
            (false, _) => 1.0 / f64::from(m.distance),
        };
        *votes.entry(label).or_insert(0.0) += weight;
    }
    votes
        .into_iter()
        .fold(None, |best: Option<(&str, f64)>, (label, weight)| match best {
            Some((_, top)) if top >= weight => best,
            _ => Some((label, weight)),
        })
        .map(|(label, _)| label)
}

/// Writes one predicted label per query, each followed by a blank line.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn write_label_predictions<S: AsRef<str>>(path: impl AsRef<Path>, labels: &[S]) -> Result<()> {
    let path = path.as_ref();
    let text: String = labels
        .iter()
        .map(|label| format!("{}\n\n", label.as_ref()))
        .collect();
    atomic_write(path, text.as_bytes())?;
    info!(path = %path.display(), rows = labels.len(), "label predictions written");
    Ok(())
}

/// Number of queries whose nearest neighbor lies within
/// [`EXACT_MATCH_THRESHOLD`].
#[must_use]
pub fn exact_match_count<'a, I>(results: I) -> usize
where
    I: IntoIterator<Item = &'a [NeighborMatch]>,
{
    results
        .into_iter()
        .filter(|matches| {
            matches
                .first()
                .is_some_and(|m| m.distance < EXACT_MATCH_THRESHOLD)
        })
        .count()
}
