//! Train and predict runs over a [`PipelineConfig`].
//!
//! Training fits the scaler and the autoencoder on the training corpus and
//! stores them as a new artifact version. Prediction loads the newest
//! version, embeds training and query vectors with the stored weights, ranks
//! neighbors, writes the result CSV and builds one candidate pool per query
//! that names its bug-inducing commit.
//! The two runs are independent and may happen in different processes.
//!
//! Stages run strictly in sequence. Any failure is returned as
//! [`SimfinError::StageFailed`] naming the stage; files written by earlier
//! stages are left in place.

use crate::artifact::{ArtifactManifest, ArtifactStore, LoadedArtifact};
use crate::config::PipelineConfig;
use crate::error::{Result, SimfinError, Stage, StageContext};
use crate::index::{NeighborMatch, SimilarityIndex};
use crate::ingest::{CsvVectorSource, Dataset, FallbackVectorSource, InstanceLabel, VectorSource};
use crate::nn::Autoencoder;
use crate::pool::{
    CandidatePool, CandidatePoolBuilder, GitSourceProvider, MatchOrigin, SourceProvider,
};
use crate::preprocessing::{harmonize, HarmonizedSets, MinMaxScaler};
use crate::primitives::Matrix;
use crate::report::{self, NeighborRecord};
use crate::traits::Transformer;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};

/// Outcome of [`Pipeline::train`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainReport {
    /// Manifest of the stored version.
    pub manifest: ArtifactManifest,
    /// Directory of the stored version.
    pub artifact_dir: PathBuf,
    /// Reconstruction loss per epoch.
    pub epoch_losses: Vec<f32>,
}

/// Neighbors found for one query row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Row of the query in the query set.
    pub query_index: usize,
    /// Ground-truth label of the query.
    pub label: String,
    /// Neighbors, nearest first.
    pub matches: Vec<NeighborMatch>,
    /// Distance-weighted vote over the neighbors' training labels.
    pub predicted_label: Option<String>,
}

/// Outcome of [`Pipeline::predict`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictReport {
    /// Artifact version used for embedding.
    pub version: u32,
    /// One entry per non-placeholder query, in query order.
    pub results: Vec<QueryResult>,
    /// One pool per entry of `results` whose query names its bug-inducing
    /// commit, same order.
    pub pools: Vec<CandidatePool>,
    /// Results that got no pool because the query has no bug-inducing commit.
    pub pools_skipped: usize,
    /// Queries skipped as placeholders.
    pub placeholders_skipped: usize,
    /// Queries whose nearest neighbor is an exact match.
    pub exact_matches: usize,
    /// Written result CSV.
    pub result_csv: PathBuf,
}

/// Runs the similarity-ranking stages for one configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Creates a pipeline after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns the validation error.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Artifact store named by the configuration.
    #[must_use]
    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.config.artifacts.root)
    }

    /// Source provider over the clones named by `sources.repositories_root`.
    #[must_use]
    pub fn git_sources(&self) -> GitSourceProvider {
        GitSourceProvider::from(&self.config.sources)
    }

    /// Trains the scaler and encoder and stores them as a new version.
    ///
    /// The harmonized length covers the query set too, so a later predict
    /// run over the same data sees the dimensionality the model was built for.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::StageFailed`] for the first failing stage.
    pub fn train(&self) -> Result<TrainReport> {
        info!(model = %self.config.artifacts.model_name, "training run started");
        let (train, query) = self.ingest().in_stage(Stage::Ingest)?;
        let sets = harmonize(train.vectors(), query.vectors());
        info!(input_dim = sets.len(), "vectors harmonized");

        let mut scaler = MinMaxScaler::new();
        let scaled = scaler
            .fit_transform(&sets.train_matrix())
            .in_stage(Stage::Scale)?;

        let encoder_config = &self.config.encoder;
        let (encoder, history) = Autoencoder::new(sets.len(), encoder_config)
            .and_then(|mut ae| {
                let history = ae.fit(&scaled, encoder_config)?;
                Ok((ae.into_encoder(), history))
            })
            .in_stage(Stage::Train)?;

        let manifest = ArtifactManifest {
            format_version: 0,
            model_name: self.config.artifacts.model_name.clone(),
            version: 0,
            input_dim: sets.len(),
            latent_dim: encoder.latent_dim(),
            seed: encoder_config.seed,
            train_instances: train.len(),
            train_fingerprint: train.fingerprint(),
            final_loss: history.final_loss(),
        };
        let store = self.store();
        let manifest = store
            .save(manifest, &scaler, &encoder)
            .in_stage(Stage::Persist)?;

        let artifact_dir = store.version_dir(&manifest.model_name, manifest.version);
        info!(
            version = manifest.version,
            final_loss = ?manifest.final_loss,
            "training run finished"
        );
        Ok(TrainReport {
            manifest,
            artifact_dir,
            epoch_losses: history.epoch_losses,
        })
    }

    /// Ranks historical fixes for every query and builds candidate pools,
    /// reading matched sources through `sources`.
    ///
    /// # Errors
    ///
    /// Returns [`SimfinError::StageFailed`] for the first failing stage.
    /// Per-match source retrieval failures are not errors; they appear in
    /// [`CandidatePool::failures`].
    pub fn predict(&self, sources: &dyn SourceProvider) -> Result<PredictReport> {
        info!(model = %self.config.artifacts.model_name, "prediction run started");
        let (train, query) = self.ingest().in_stage(Stage::Ingest)?;

        let artifact = self
            .store()
            .load(&self.config.artifacts.model_name, None)
            .in_stage(Stage::LoadArtifact)?;

        let sets = harmonize(train.vectors(), query.vectors());
        artifact
            .manifest
            .check_compatible(sets.len(), &train.fingerprint())
            .in_stage(Stage::Harmonize)?;

        let (train_latent, query_latent) = embed(&artifact, &sets)?;

        if let Some(dir) = &self.config.output.latent_dump_dir {
            report::write_latent_csv(dir.join("train_latent.csv"), &train_latent)
                .and_then(|()| report::write_latent_csv(dir.join("query_latent.csv"), &query_latent))
                .in_stage(Stage::Report)?;
        }

        let index = SimilarityIndex::new(train_latent)
            .map(|index| index.with_metric(self.config.index.metric))
            .in_stage(Stage::Rank)?;

        let train_label = |train_index: usize| {
            train
                .labels()
                .get(train_index)
                .map(|label| label.label.as_str())
        };
        let mut results = Vec::new();
        let mut placeholders_skipped = 0;
        for (i, q) in query_latent.rows().enumerate() {
            let label = &query.labels()[i];
            if label.is_placeholder() {
                warn!(query_index = i, "skipping placeholder query row");
                placeholders_skipped += 1;
                continue;
            }
            let matches = index.query(q, self.config.index.k).in_stage(Stage::Rank)?;
            let predicted_label = report::predict_label(&matches, train_label).map(str::to_string);
            results.push(QueryResult {
                query_index: i,
                label: label.label.clone(),
                matches,
                predicted_label,
            });
        }
        let exact_matches = report::exact_match_count(results.iter().map(|r| r.matches.as_slice()));
        info!(
            queries = results.len(),
            placeholders = placeholders_skipped,
            exact_matches,
            "neighbors ranked"
        );

        let origin_of = |train_index: usize| train.labels().get(train_index).map(MatchOrigin::from);

        let records: Vec<NeighborRecord> = results
            .iter()
            .flat_map(|r| {
                let query_label = &query.labels()[r.query_index];
                r.matches.iter().filter_map(move |m| {
                    origin_of(m.train_index).map(|o| NeighborRecord::new(query_label, m, &o))
                })
            })
            .collect();
        let result_csv = self.config.output.result_csv.clone();
        report::write_results(&result_csv, &records).in_stage(Stage::Report)?;
        self.write_extra_reports(&results).in_stage(Stage::Report)?;

        let builder = CandidatePoolBuilder::new(sources);
        let mut dir_names = HashSet::new();
        let mut pools = Vec::new();
        let mut pools_skipped = 0;
        for r in &results {
            let query_label = &query.labels()[r.query_index];
            if !query_label.has_bic_commit() {
                warn!(
                    query_index = r.query_index,
                    "query has no bug-inducing commit, no pool built"
                );
                pools_skipped += 1;
                continue;
            }
            let name = unique_pool_dir_name(query_label, r.query_index, &mut dir_names);
            let out_dir = self.config.output.pool_dir.join(name);
            let (project, _) = query_label.bug_identity();
            let pool = builder
                .build(project, &r.matches, origin_of, &out_dir)
                .in_stage(Stage::Pool)?;
            pools.push(pool);
        }

        info!(
            version = artifact.manifest.version,
            pools = pools.len(),
            "prediction run finished"
        );
        Ok(PredictReport {
            version: artifact.manifest.version,
            results,
            pools,
            pools_skipped,
            placeholders_skipped,
            exact_matches,
            result_csv,
        })
    }

    /// [`Pipeline::predict`] reading matched sources from the configured
    /// git clones.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::predict`].
    pub fn predict_from_git(&self) -> Result<PredictReport> {
        self.predict(&self.git_sources())
    }

    fn write_extra_reports(&self, results: &[QueryResult]) -> Result<()> {
        if let Some(path) = &self.config.output.neighbor_dump {
            report::write_neighbor_dump(
                path,
                results.iter().map(|r| (r.query_index, r.matches.as_slice())),
            )?;
        }
        if let Some(path) = &self.config.output.label_predictions {
            let labels: Vec<&str> = results
                .iter()
                .map(|r| r.predicted_label.as_deref().unwrap_or(NO_PREDICTION))
                .collect();
            report::write_label_predictions(path, &labels)?;
        }
        Ok(())
    }

    fn ingest(&self) -> Result<(Dataset, Dataset)> {
        let train = CsvVectorSource::from(&self.config.train).load()?;
        if train.is_empty() {
            return Err(SimfinError::empty_input("training corpus has no instances"));
        }
        let primary = CsvVectorSource::from(&self.config.query.primary());
        let query = match &self.config.query.fallback {
            Some(fallback) => {
                FallbackVectorSource::new(primary, CsvVectorSource::from(fallback)).load()?
            }
            None => primary.load()?,
        };
        Ok((train, query))
    }
}

fn embed(
    artifact: &LoadedArtifact,
    sets: &HarmonizedSets,
) -> Result<(Matrix<f32>, Matrix<f32>)> {
    let train_scaled = artifact
        .scaler
        .transform(&sets.train_matrix())
        .in_stage(Stage::Scale)?;
    let query_scaled = artifact
        .scaler
        .transform(&sets.query_matrix())
        .in_stage(Stage::Scale)?;

    let train_latent = artifact.encoder.encode(&train_scaled).in_stage(Stage::Encode)?;
    let query_latent = artifact.encoder.encode(&query_scaled).in_stage(Stage::Encode)?;
    info!(
        train = train_latent.n_rows(),
        query = query_latent.n_rows(),
        latent_dim = train_latent.n_cols(),
        "vectors embedded"
    );
    Ok((train_latent, query_latent))
}

/// Written to the label predictions for a query without a labelled neighbor.
const NO_PREDICTION: &str = "-";

/// Per-query pool directory name: the query label with path separators
/// replaced. Labels that would not name a child directory fall back to
/// `query-<index>`.
fn pool_dir_name(label: &InstanceLabel, query_index: usize) -> String {
    let name = label.label.replace(['/', '\\'], "_");
    match name.as_str() {
        "" | "." | ".." => format!("query-{query_index}"),
        _ => name,
    }
}

/// [`pool_dir_name`], suffixed with the query index when an earlier query
/// already took the name.
fn unique_pool_dir_name(
    label: &InstanceLabel,
    query_index: usize,
    taken: &mut HashSet<String>,
) -> String {
    let mut name = pool_dir_name(label, query_index);
    while !taken.insert(name.clone()) {
        name = format!("{name}_{query_index}");
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(text: &str) -> InstanceLabel {
        InstanceLabel {
            index: "0".into(),
            before_bic_path: String::new(),
            bic_path: String::new(),
            before_bic_sha: String::new(),
            bic_sha: String::new(),
            before_bfc_path: String::new(),
            bfc_path: String::new(),
            before_bfc_sha: String::new(),
            bfc_sha: String::new(),
            key: String::new(),
            project: "p".into(),
            label: text.into(),
        }
    }

    #[test]
    fn test_pool_dir_name_is_single_component() {
        assert_eq!(pool_dir_name(&label("a/b\\c-1"), 0), "a_b_c-1");
    }

    #[test]
    fn test_pool_dir_name_rejects_relative_components() {
        assert_eq!(pool_dir_name(&label(".."), 4), "query-4");
        assert_eq!(pool_dir_name(&label("."), 2), "query-2");
        assert_eq!(pool_dir_name(&label(""), 0), "query-0");
        assert_eq!(pool_dir_name(&label("..."), 1), "...");
    }

    #[test]
    fn test_repeated_labels_get_distinct_pool_dirs() {
        let mut taken = HashSet::new();
        let lang = label("Lang-7");
        assert_eq!(unique_pool_dir_name(&lang, 0, &mut taken), "Lang-7");
        assert_eq!(unique_pool_dir_name(&lang, 3, &mut taken), "Lang-7_3");
        assert_eq!(unique_pool_dir_name(&label("Lang-7_3"), 5, &mut taken), "Lang-7_3_5");
    }
}
