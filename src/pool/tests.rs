use super::*;
use std::collections::HashMap;

/// Serves file content from memory, keyed by `(repository, commit, path)`.
#[derive(Default)]
struct MemorySource {
    files: HashMap<(String, String, String), Vec<u8>>,
}

impl MemorySource {
    fn with(mut self, repository: &str, commit: &str, path: &str, body: &str) -> Self {
        self.files.insert(
            (repository.to_string(), commit.to_string(), path.to_string()),
            body.as_bytes().to_vec(),
        );
        self
    }
}

impl SourceProvider for MemorySource {
    fn fetch(&self, repository: &str, commit: &str, path: &str) -> Result<Vec<u8>> {
        self.files
            .get(&(repository.to_string(), commit.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| SimfinError::SourceRetrieval {
                repository: repository.to_string(),
                commit: commit.to_string(),
                path: path.to_string(),
                message: "unknown object".to_string(),
            })
    }
}

fn origin(project: &str, n: usize) -> MatchOrigin {
    MatchOrigin {
        project: project.to_string(),
        bic_sha: format!("bic{n}"),
        bic_path: format!("src/F{n}.java"),
        bfc_sha: format!("bfc{n}"),
        bfc_path: format!("src/F{n}.java"),
    }
}

fn matches(n: usize) -> Vec<NeighborMatch> {
    (0..n)
        .map(|i| NeighborMatch {
            train_index: i,
            distance: i as f32,
            rank: i + 1,
        })
        .collect()
}

fn source_for(origins: &[MatchOrigin]) -> MemorySource {
    origins.iter().fold(MemorySource::default(), |src, o| {
        src.with(&o.project, &o.bic_sha, &o.bic_path, &format!("old {}", o.bic_sha))
            .with(&o.project, &o.bfc_sha, &o.bfc_path, &format!("new {}", o.bfc_sha))
    })
}

#[test]
fn test_pool_writes_old_and_new_per_match() {
    let dir = tempfile::tempdir().expect("tempdir");
    let origins = vec![origin("lang", 0), origin("math", 1)];
    let source = source_for(&origins);

    let pool = CandidatePoolBuilder::new(&source)
        .build("Closure", &matches(2), |i| origins.get(i).cloned(), dir.path())
        .expect("build");

    assert_eq!(pool.len(), 2);
    assert!(pool.failures.is_empty());
    let first = &pool.entries[0];
    assert_eq!(first.old_file, dir.path().join("Closure_rank-1_old.java"));
    assert_eq!(first.new_file, dir.path().join("Closure_rank-1_new.java"));
    assert_eq!(fs::read_to_string(&first.old_file).expect("old"), "old bic0");
    assert_eq!(fs::read_to_string(&first.new_file).expect("new"), "new bfc0");
    assert_eq!(pool.entries[1].origin.project, "math");
}

#[test]
fn test_failed_retrieval_drops_only_that_match() {
    let dir = tempfile::tempdir().expect("tempdir");
    let origins = vec![origin("a", 0), origin("b", 1), origin("c", 2)];
    // The second match's repository has nothing to serve.
    let source = source_for(&[origins[0].clone(), origins[2].clone()]);

    let pool = CandidatePoolBuilder::new(&source)
        .build("Q", &matches(3), |i| origins.get(i).cloned(), dir.path())
        .expect("partial pool is still a pool");

    assert_eq!(pool.len(), 2);
    assert_eq!(pool.entries.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(pool.failures.len(), 1);
    assert_eq!(pool.failures[0].rank, 2);
    assert!(pool.failures[0].reason.contains("bic1"));
    assert!(!dir.path().join("Q_rank-2_old.java").exists());
    assert!(!dir.path().join("Q_rank-2_new.java").exists());
}

#[test]
fn test_missing_new_side_writes_no_old_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let o = origin("a", 0);
    let source = MemorySource::default().with(&o.project, &o.bic_sha, &o.bic_path, "old");

    let pool = CandidatePoolBuilder::new(&source)
        .build("Q", &matches(1), |_| Some(o.clone()), dir.path())
        .expect("build");

    assert!(pool.is_empty());
    assert!(!dir.path().join("Q_rank-1_old.java").exists());
}

#[test]
fn test_unknown_origin_is_recorded_as_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = MemorySource::default();
    let pool = CandidatePoolBuilder::new(&source)
        .build("Q", &matches(1), |_| None, dir.path())
        .expect("build");
    assert!(pool.is_empty());
    assert!(pool.failures[0].reason.contains("no origin"));
}

#[test]
fn test_stale_pool_files_are_replaced() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("Q_rank-7_old.java"), "stale").expect("seed");
    fs::write(dir.path().join("notes.txt"), "keep").expect("seed");

    let origins = vec![origin("a", 0)];
    let source = source_for(&origins);
    CandidatePoolBuilder::new(&source)
        .build("Q", &matches(1), |i| origins.get(i).cloned(), dir.path())
        .expect("build");

    assert!(!dir.path().join("Q_rank-7_old.java").exists());
    assert!(dir.path().join("notes.txt").exists());
    assert!(dir.path().join("Q_rank-1_old.java").exists());
}

#[test]
fn test_origin_from_label_uses_matched_commits() {
    let label = InstanceLabel {
        index: "0".into(),
        before_bic_path: "src/Old.kt".into(),
        bic_path: "src/New.kt".into(),
        before_bic_sha: "p1".into(),
        bic_sha: "c1".into(),
        before_bfc_path: "src/Fix.kt".into(),
        bfc_path: "src/Fixed.kt".into(),
        before_bfc_sha: "p2".into(),
        bfc_sha: "c2".into(),
        key: "k".into(),
        project: "repo".into(),
        label: "Repo-3".into(),
    };
    let o = MatchOrigin::from(&label);
    assert_eq!(o.project, "repo");
    assert_eq!((o.bic_sha.as_str(), o.bic_path.as_str()), ("c1", "src/Old.kt"));
    assert_eq!((o.bfc_sha.as_str(), o.bfc_path.as_str()), ("c2", "src/Fix.kt"));
    assert_eq!(o.extension(), "kt");
}

#[test]
fn test_extension_defaults_to_java() {
    let o = MatchOrigin {
        bic_path: "Makefile".into(),
        bfc_path: "Makefile".into(),
        ..origin("a", 0)
    };
    assert_eq!(o.extension(), DEFAULT_EXTENSION);
    assert_eq!(pool_file_name("Lang", 4, "new", "java"), "Lang_rank-4_new.java");
}

#[test]
fn test_git_provider_reports_missing_clone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = GitSourceProvider::new(dir.path());
    assert_eq!(provider.repository_dir("lang"), dir.path().join("lang"));
    let err = provider.fetch("lang", "abc", "A.java").unwrap_err();
    assert!(matches!(err, SimfinError::SourceRetrieval { .. }));
    assert!(err.to_string().contains("abc"));
}

#[test]
fn test_git_provider_from_sources_config() {
    let config = SourcesConfig {
        repositories_root: PathBuf::from("/srv/clones"),
    };
    let provider = GitSourceProvider::from(&config);
    assert_eq!(provider.repositories_root(), Path::new("/srv/clones"));
    assert_eq!(provider.repository_dir("math"), Path::new("/srv/clones/math"));
}
