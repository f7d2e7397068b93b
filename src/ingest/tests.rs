use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write");
    file.flush().expect("flush");
    file
}

fn label_row(index: usize, project: &str, label: &str) -> String {
    format!(
        "{index},old/A.java,new/A.java,bbic{index},bic{index},old/B.java,new/B.java,bbfc{index},bfc{index},key{index},{project},{label}\n"
    )
}

#[test]
fn test_read_ragged_vectors_preserves_order_and_lengths() {
    let file = write_temp("3,0,12,7\n5,2\n1\n");
    let vectors = read_change_vectors(file.path()).expect("parse");
    assert_eq!(vectors.len(), 3);
    assert_eq!(vectors[0].as_slice(), &[3, 0, 12, 7]);
    assert_eq!(vectors[1].as_slice(), &[5, 2]);
    assert_eq!(vectors[2].as_slice(), &[1]);
}

#[test]
fn test_read_empty_file_yields_no_vectors() {
    let file = write_temp("");
    let vectors = read_change_vectors(file.path()).expect("parse");
    assert!(vectors.is_empty());
}

#[test]
fn test_empty_fields_read_as_zero() {
    let file = write_temp("4,,9\n");
    let vectors = read_change_vectors(file.path()).expect("parse");
    assert_eq!(vectors[0].as_slice(), &[4, 0, 9]);
}

#[test]
fn test_non_integer_token_is_malformed_with_row() {
    let file = write_temp("1,2\n3,abc,4\n");
    let err = read_change_vectors(file.path()).unwrap_err();
    match err {
        SimfinError::MalformedInput { row, message, .. } => {
            assert_eq!(row, 1);
            assert!(message.contains("abc"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_negative_token_is_malformed() {
    let file = write_temp("1,-2\n");
    assert!(matches!(
        read_change_vectors(file.path()),
        Err(SimfinError::MalformedInput { row: 0, .. })
    ));
}

#[test]
fn test_missing_vector_file_is_malformed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = read_change_vectors(dir.path().join("absent.csv")).unwrap_err();
    assert!(matches!(err, SimfinError::MalformedInput { .. }));
}

#[test]
fn test_read_labels_twelve_columns() {
    let file = write_temp(&(label_row(0, "Math", "Math-85") + &label_row(1, "Lang", "Lang-6")));
    let labels = read_labels(file.path()).expect("parse");
    assert_eq!(labels.len(), 2);
    assert_eq!(labels[0].bic_sha, "bic0");
    assert_eq!(labels[0].before_bic_path, "old/A.java");
    assert_eq!(labels[0].bfc_sha, "bfc0");
    assert_eq!(labels[0].before_bfc_path, "old/B.java");
    assert_eq!(labels[1].project, "Lang");
    assert_eq!(labels[1].label, "Lang-6");
}

#[test]
fn test_read_labels_short_row_is_malformed() {
    let file = write_temp("0,a,b,c\n");
    let err = read_labels(file.path()).unwrap_err();
    match err {
        SimfinError::MalformedInput { row, message, .. } => {
            assert_eq!(row, 0);
            assert!(message.contains("12"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_bug_identity_splits_at_last_dash() {
    let file = write_temp(&label_row(0, "commons-math", "commons-math-85"));
    let labels = read_labels(file.path()).expect("parse");
    assert_eq!(labels[0].bug_identity(), ("commons-math", "85"));
}

#[test]
fn test_bug_identity_without_dash() {
    let file = write_temp(&label_row(0, "x", "dummy"));
    let labels = read_labels(file.path()).expect("parse");
    assert!(labels[0].is_placeholder());
    assert_eq!(labels[0].bug_identity(), ("dummy", "-"));
}

#[test]
fn test_collector_placeholder_row() {
    let file = write_temp("dummy,-,-,-,-,-,-,-,-,-,-,-\n");
    let labels = read_labels(file.path()).expect("parse");
    assert!(labels[0].is_placeholder());
    assert!(!labels[0].has_bic_commit());
}

#[test]
fn test_missing_label_is_placeholder() {
    let file = write_temp(&(label_row(0, "x", "-") + &label_row(1, "Math", "Math-1")));
    let labels = read_labels(file.path()).expect("parse");
    assert!(labels[0].is_placeholder());
    assert!(!labels[1].is_placeholder());
    assert!(labels[1].has_bic_commit());
}

#[test]
fn test_dataset_from_files_rejects_row_count_mismatch() {
    let vectors = write_temp("1,2\n3\n");
    let labels = write_temp(&label_row(0, "Math", "Math-1"));
    let err = Dataset::from_files(vectors.path(), labels.path()).unwrap_err();
    assert!(matches!(err, SimfinError::MalformedInput { .. }));
}

#[test]
fn test_dataset_instances_pair_rows() {
    let vectors = write_temp("1,2\n3\n");
    let labels = write_temp(&(label_row(0, "Math", "Math-1") + &label_row(1, "Lang", "Lang-2")));
    let dataset = Dataset::from_files(vectors.path(), labels.path()).expect("load");
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.max_len(), 2);

    let pairs: Vec<_> = dataset
        .instances()
        .map(|i| (i.index, i.vector.len(), i.label.project.clone()))
        .collect();
    assert_eq!(
        pairs,
        vec![(0, 2, "Math".to_string()), (1, 1, "Lang".to_string())]
    );
    assert!(dataset.get(2).is_none());
}

#[test]
fn test_fingerprint_ignores_trailing_padding_but_not_values() {
    let label = |i: i32| InstanceLabel {
        index: i.to_string(),
        before_bic_path: String::new(),
        bic_path: String::new(),
        before_bic_sha: String::new(),
        bic_sha: String::new(),
        before_bfc_path: String::new(),
        bfc_path: String::new(),
        before_bfc_sha: String::new(),
        bfc_sha: String::new(),
        key: String::new(),
        project: "P".to_string(),
        label: format!("P-{i}"),
    };
    let a = Dataset::new(
        vec![ChangeVector::new(vec![1, 2]), ChangeVector::new(vec![3])],
        vec![label(0), label(1)],
    )
    .expect("aligned");
    let b = Dataset::new(
        vec![ChangeVector::new(vec![1, 2]), ChangeVector::new(vec![3, 0])],
        vec![label(0), label(1)],
    )
    .expect("aligned");
    let c = Dataset::new(
        vec![ChangeVector::new(vec![1, 2]), ChangeVector::new(vec![4])],
        vec![label(0), label(1)],
    )
    .expect("aligned");

    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.fingerprint(), c.fingerprint());
    assert_eq!(a.fingerprint().len(), 64);
}

#[test]
fn test_padded_never_truncates() {
    let v = ChangeVector::new(vec![1, 2, 3]);
    assert_eq!(v.padded(5).as_slice(), &[1, 2, 3, 0, 0]);
    assert_eq!(v.padded(2).as_slice(), &[1, 2, 3]);
}

struct FailingSource;

impl VectorSource for FailingSource {
    fn load(&self) -> Result<Dataset> {
        Err(SimfinError::empty_input("extractor offline"))
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

#[test]
fn test_fallback_source_used_when_primary_fails() {
    let vectors = write_temp("7\n");
    let labels = write_temp(&label_row(0, "Math", "Math-1"));
    let source =
        FallbackVectorSource::new(FailingSource, CsvVectorSource::new(vectors.path(), labels.path()));
    let dataset = source.load().expect("fallback loads");
    assert_eq!(dataset.vectors()[0].as_slice(), &[7]);
    assert!(source.describe().contains("fallback"));
}

#[test]
fn test_fallback_source_propagates_when_both_fail() {
    let source = FallbackVectorSource::new(FailingSource, FailingSource);
    assert!(matches!(source.load(), Err(SimfinError::EmptyInput(_))));
}
