// Shared on-disk fixture: a small corpus, a query set, a YAML configuration
// and an in-memory source provider.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use simfin::error::SimfinError;
use simfin::pool::SourceProvider;

/// Training vectors: ragged rows, one with an empty field.
const TRAIN_VECTORS: &str = "1,2\n1,2,3\n1\n3,,3\n0,2,1\n";

/// Query vectors: one real query and one placeholder.
const QUERY_VECTORS: &str = "1,2\n0,0,1\n";

fn label_row(i: usize, project: &str, label: &str) -> String {
    format!(
        "{i},src/F{i}.java,src/F{i}.java,pbic{i},bic{i},src/G{i}.java,src/G{i}.java,pbfc{i},bfc{i},key{i},{project},{label}\n"
    )
}

fn train_labels() -> String {
    (0..5)
        .map(|i| label_row(i, &format!("proj{i}"), &format!("Proj{i}-{i}")))
        .collect()
}

fn query_labels() -> String {
    format!("{}{}", label_row(0, "lang", "Lang-7"), label_row(1, "lang", "dummy"))
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new(k: usize) -> Self {
        Self::with_extra(k, "")
    }

    /// Writes the data files and a config; `extra_output` is appended to the
    /// `output` section.
    fn with_extra(k: usize, extra_output: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("data")).expect("data dir");
        fs::write(root.join("data/X_train.csv"), TRAIN_VECTORS).expect("write");
        fs::write(root.join("data/Y_train.csv"), train_labels()).expect("write");
        fs::write(root.join("data/X_test.csv"), QUERY_VECTORS).expect("write");
        fs::write(root.join("data/Y_test.csv"), query_labels()).expect("write");

        let yaml = format!(
            "train:
  vectors: data/X_train.csv
  labels: data/Y_train.csv
query:
  vectors: data/X_test.csv
  labels: data/Y_test.csv
artifacts:
  root: models
  model_name: train_all
encoder:
  hidden_dims: [6]
  latent_dim: 3
  epochs: 15
  batch_size: 2
  seed: 11
  optimizer:
    kind: adam
    learning_rate: 0.01
index:
  k: {k}
output:
  result_csv: out/result.csv
  pool_dir: out/pool
{extra_output}sources:
  repositories_root: repos
"
        );
        fs::write(root.join("simfin.yaml"), yaml).expect("write config");
        Self { dir }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn config_path(&self) -> PathBuf {
        self.path("simfin.yaml")
    }

    fn pipeline(&self) -> simfin::pipeline::Pipeline {
        let config = simfin::config::PipelineConfig::from_yaml_file(self.config_path())
            .expect("valid config");
        simfin::pipeline::Pipeline::new(config).expect("valid pipeline")
    }
}

/// Serves `"<repository>@<commit>:<path>"` for every request except those
/// for repositories in `unreachable`.
#[derive(Default)]
struct FakeSources {
    unreachable: BTreeSet<String>,
}

impl FakeSources {
    fn failing(repositories: &[&str]) -> Self {
        Self {
            unreachable: repositories.iter().map(|r| r.to_string()).collect(),
        }
    }
}

impl SourceProvider for FakeSources {
    fn fetch(&self, repository: &str, commit: &str, path: &str) -> simfin::Result<Vec<u8>> {
        if self.unreachable.contains(repository) {
            return Err(SimfinError::SourceRetrieval {
                repository: repository.to_string(),
                commit: commit.to_string(),
                path: path.to_string(),
                message: "repository unreachable".to_string(),
            });
        }
        Ok(format!("{repository}@{commit}:{path}").into_bytes())
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}
