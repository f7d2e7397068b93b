pub(crate) use super::*;

#[test]
fn test_from_vec() {
    let m = Matrix::from_vec(2, 3, vec![1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0])
        .expect("test data has correct dimensions: 2*3=6 elements");
    assert_eq!(m.shape(), (2, 3));
    assert!((m.get(0, 0) - 1.0).abs() < 1e-6);
    assert!((m.get(1, 2) - 6.0).abs() < 1e-6);
}

#[test]
fn test_from_vec_error() {
    let result = Matrix::from_vec(2, 3, vec![1.0_f32, 2.0, 3.0]);
    assert!(result.is_err());
}

#[test]
fn test_zeros() {
    let m = Matrix::zeros(2, 3);
    assert_eq!(m.shape(), (2, 3));
    assert!(m.as_slice().iter().all(|&x| x == 0.0));
}

#[test]
fn test_from_rows_rejects_ragged() {
    let ok = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).expect("uniform rows");
    assert_eq!(ok.shape(), (2, 2));
    assert!(Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
}

#[test]
fn test_from_rows_empty() {
    let m = Matrix::from_rows(&[]).expect("no rows is valid");
    assert_eq!(m.shape(), (0, 0));
    assert!(m.is_empty());
}

#[test]
fn test_row_and_row_mut() {
    let mut m = Matrix::from_vec(2, 2, vec![1.0_f32, 2.0, 3.0, 4.0]).expect("2x2");
    assert_eq!(m.row(1), &[3.0, 4.0]);
    m.row_mut(0)[1] = 9.0;
    assert!((m.get(0, 1) - 9.0).abs() < 1e-6);
}

#[test]
fn test_select_rows_keeps_requested_order() {
    let m = Matrix::from_vec(3, 2, vec![0.0_f32, 0.0, 1.0, 1.0, 2.0, 2.0]).expect("3x2");
    let picked = m.select_rows(&[2, 0]);
    assert_eq!(picked.shape(), (2, 2));
    assert_eq!(picked.row(0), &[2.0, 2.0]);
    assert_eq!(picked.row(1), &[0.0, 0.0]);
}

#[test]
fn test_transpose() {
    let m = Matrix::from_vec(2, 3, vec![1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0])
        .expect("test data has correct dimensions: 2*3=6 elements");
    let t = m.transpose();
    assert_eq!(t.shape(), (3, 2));
    assert!((t.get(0, 1) - 4.0).abs() < 1e-6);
    assert!((t.get(2, 0) - 3.0).abs() < 1e-6);
}

#[test]
fn test_max_abs_diff() {
    let a = Matrix::from_vec(1, 3, vec![1.0_f32, 2.0, 3.0]).expect("1x3");
    let b = Matrix::from_vec(1, 3, vec![1.0_f32, 2.5, 2.0]).expect("1x3");
    let diff = a.max_abs_diff(&b).expect("same shape");
    assert!((diff - 1.0).abs() < 1e-6);
    let c = Matrix::zeros(3, 1);
    assert!(a.max_abs_diff(&c).is_err());
}

#[test]
fn test_rows_iterator() {
    let m = Matrix::from_vec(3, 1, vec![1.0_f32, 2.0, 3.0]).expect("3x1");
    let collected: Vec<f32> = m.rows().map(|r| r[0]).collect();
    assert_eq!(collected, vec![1.0, 2.0, 3.0]);
}
