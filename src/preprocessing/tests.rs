//! Tests for preprocessing module.

use super::*;
use crate::error::SimfinError;
use crate::ingest::ChangeVector;
use crate::primitives::Matrix;
use crate::traits::Transformer;

fn cv(tokens: &[u32]) -> ChangeVector {
    ChangeVector::new(tokens.to_vec())
}

// Harmonization

#[test]
fn test_harmonize_uses_max_of_both_sets() {
    let sets = harmonize(&[cv(&[1, 2])], &[cv(&[4, 5, 6, 7])]);
    assert_eq!(sets.len(), 4);
    assert_eq!(sets.train()[0].as_slice(), &[1, 2, 0, 0]);
    assert_eq!(sets.query()[0].as_slice(), &[4, 5, 6, 7]);
}

#[test]
fn test_harmonize_scenario_a() {
    let train = [cv(&[1, 2]), cv(&[1, 2, 3]), cv(&[1])];
    let query = [cv(&[1, 2])];
    let sets = harmonize(&train, &query);

    assert_eq!(sets.len(), 3);
    assert_eq!(sets.train()[0].as_slice(), &[1, 2, 0]);
    assert_eq!(sets.train()[1].as_slice(), &[1, 2, 3]);
    assert_eq!(sets.train()[2].as_slice(), &[1, 0, 0]);
    assert_eq!(sets.query()[0].as_slice(), &[1, 2, 0]);
}

#[test]
fn test_harmonize_empty_collections() {
    let sets = harmonize(&[], &[]);
    assert!(sets.is_empty());
    assert_eq!(sets.train_matrix().shape(), (0, 0));
}

#[test]
fn test_harmonize_empty_query_keeps_train_length() {
    let sets = harmonize(&[cv(&[1, 2, 3])], &[]);
    assert_eq!(sets.len(), 3);
    assert_eq!(sets.query_matrix().shape(), (0, 3));
}

#[test]
fn test_vectors_to_matrix_values() {
    let m = vectors_to_matrix(&[cv(&[3, 0, 9]), cv(&[1])], 3);
    assert_eq!(m.shape(), (2, 3));
    assert_eq!(m.row(0), &[3.0, 0.0, 9.0]);
    assert_eq!(m.row(1), &[1.0, 0.0, 0.0]);
}

// MinMaxScaler

#[test]
fn test_minmax_new() {
    let scaler = MinMaxScaler::new();
    assert!(!scaler.is_fitted());
    assert!(scaler.state().is_none());
}

#[test]
fn test_minmax_fit_scenario_a() {
    let train = [cv(&[1, 2]), cv(&[1, 2, 3]), cv(&[1])];
    let sets = harmonize(&train, &[cv(&[1, 2])]);

    let mut scaler = MinMaxScaler::new();
    scaler
        .fit(&sets.train_matrix())
        .expect("fit should succeed with valid data");

    let state = scaler.state().expect("fitted");
    assert_eq!(state.data_min, vec![1.0, 0.0, 0.0]);
    assert_eq!(state.data_max, vec![1.0, 2.0, 3.0]);

    let scaled = scaler
        .transform(&sets.query_matrix())
        .expect("transform should succeed after fit");
    assert_eq!(scaled.row(0), &[0.0, 1.0, 0.0]);
}

#[test]
fn test_minmax_transform_basic() {
    let data = Matrix::from_vec(3, 1, vec![0.0, 5.0, 10.0]).expect("valid matrix dimensions");

    let mut scaler = MinMaxScaler::new();
    let transformed = scaler
        .fit_transform(&data)
        .expect("fit_transform should succeed");

    assert!((transformed.get(0, 0) - 0.0).abs() < 1e-6);
    assert!((transformed.get(1, 0) - 0.5).abs() < 1e-6);
    assert!((transformed.get(2, 0) - 1.0).abs() < 1e-6);
}

#[test]
fn test_minmax_constant_column_is_zero() {
    let data = Matrix::from_vec(3, 2, vec![4.0, 1.0, 4.0, 2.0, 4.0, 3.0])
        .expect("valid matrix dimensions");

    let mut scaler = MinMaxScaler::new();
    let transformed = scaler.fit_transform(&data).expect("fit_transform");
    for i in 0..3 {
        assert_eq!(transformed.get(i, 0), 0.0);
    }

    // Unseen values in a constant column also map to 0.0.
    let query = Matrix::from_vec(1, 2, vec![99.0, 2.0]).expect("1x2");
    assert_eq!(scaler.transform(&query).expect("transform").get(0, 0), 0.0);
}

#[test]
fn test_minmax_query_not_refit_or_clipped() {
    let train = Matrix::from_vec(3, 1, vec![0.0, 5.0, 10.0]).expect("valid matrix dimensions");
    let query = Matrix::from_vec(2, 1, vec![15.0, -5.0]).expect("valid matrix dimensions");

    let mut scaler = MinMaxScaler::new();
    scaler.fit(&train).expect("fit");
    let before = scaler.state().cloned();
    let transformed = scaler.transform(&query).expect("transform");

    assert!((transformed.get(0, 0) - 1.5).abs() < 1e-6);
    assert!((transformed.get(1, 0) + 0.5).abs() < 1e-6);
    assert_eq!(scaler.state().cloned(), before);
}

#[test]
fn test_minmax_inverse_transform() {
    let data = Matrix::from_vec(3, 2, vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0])
        .expect("valid matrix dimensions");

    let mut scaler = MinMaxScaler::new();
    let transformed = scaler.fit_transform(&data).expect("fit_transform");
    let recovered = scaler
        .inverse_transform(&transformed)
        .expect("inverse_transform should succeed");

    assert!(recovered.max_abs_diff(&data).expect("same shape") < 1e-5);
}

#[test]
fn test_minmax_transform_not_fitted() {
    let scaler = MinMaxScaler::new();
    let data = Matrix::from_vec(1, 1, vec![1.0]).expect("1x1");
    assert!(matches!(
        scaler.transform(&data),
        Err(SimfinError::NotFitted(_))
    ));
}

#[test]
fn test_minmax_dimension_mismatch() {
    let mut scaler = MinMaxScaler::new();
    scaler
        .fit(&Matrix::from_vec(1, 2, vec![1.0, 2.0]).expect("1x2"))
        .expect("fit");
    let err = scaler
        .transform(&Matrix::from_vec(1, 3, vec![1.0, 2.0, 3.0]).expect("1x3"))
        .unwrap_err();
    assert!(matches!(err, SimfinError::DimensionMismatch { .. }));
}

#[test]
fn test_minmax_fit_empty_fails() {
    let mut scaler = MinMaxScaler::new();
    let data = Matrix::from_vec(0, 3, vec![]).expect("0x3");
    assert!(matches!(scaler.fit(&data), Err(SimfinError::EmptyInput(_))));
}

#[test]
fn test_minmax_from_state_rejects_ragged() {
    let err = MinMaxScaler::from_state(ScalerState {
        data_min: vec![0.0],
        data_max: vec![1.0, 2.0],
    })
    .unwrap_err();
    assert!(matches!(err, SimfinError::DimensionMismatch { .. }));
}

#[test]
fn test_minmax_safetensors_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scaler.safetensors");

    let data = Matrix::from_vec(2, 3, vec![1.0, 0.0, 5.0, 3.0, 0.0, 9.0]).expect("2x3");
    let mut scaler = MinMaxScaler::new();
    scaler.fit(&data).expect("fit");
    scaler.save_safetensors(&path).expect("save");

    let loaded = MinMaxScaler::load_safetensors(&path).expect("load");
    assert_eq!(loaded, scaler);
}

#[test]
fn test_minmax_save_unfitted_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = MinMaxScaler::new()
        .save_safetensors(dir.path().join("s.safetensors"))
        .unwrap_err();
    assert!(matches!(err, SimfinError::NotFitted(_)));
}
