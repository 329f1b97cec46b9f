use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::errors::TensorError;
use crate::tensor::Tensor;

#[test]
fn test_new_and_try_new() {
    let tensor = Tensor::new(&[1., 2., 3., 4.], &[2, 2]);
    assert_eq!(tensor.shape(), &[2, 2]);
    assert_eq!(tensor.size(), 4);
    assert_eq!(tensor.dimension(), 2);

    let err = Tensor::try_new(&[1., 2., 3.], &[2, 2]).unwrap_err();
    assert_eq!(
        err,
        TensorError::DataLengthMismatch {
            data_len: 3,
            shape: vec![2, 2],
            expected: 4
        }
    );
}

#[test]
#[should_panic]
fn test_new_with_wrong_len_panics() {
    let _ = Tensor::new(&[1., 2., 3.], &[2, 2]);
}

#[test]
fn test_broadcast_arithmetic() {
    let a = Tensor::new(&[1., 2., 3., 4., 5., 6.], &[2, 3]);
    let b = Tensor::new(&[10., 20., 30.], &[1, 3]);
    let c = &a + &b;
    assert_eq!(c.to_vec(), vec![11., 22., 33., 14., 25., 36.]);
    let d = &a * 2.0;
    assert_eq!(d.to_vec(), vec![2., 4., 6., 8., 10., 12.]);
    let e = 1.0 - &a;
    assert_eq!(e.to_vec(), vec![0., -1., -2., -3., -4., -5.]);
}

#[test]
#[should_panic]
fn test_incompatible_shapes_panic() {
    let a = Tensor::zeros(&[2, 3]);
    let b = Tensor::zeros(&[2, 2]);
    let _ = &a + &b;
}

#[test]
fn test_assign_ops() {
    let mut a = Tensor::ones(&[2, 2]);
    a *= 3.0;
    a -= &Tensor::new(&[1., 1., 1., 1.], &[2, 2]);
    assert_eq!(a.to_vec(), vec![2., 2., 2., 2.]);
}

#[test]
fn test_mat_mul() {
    let a = Tensor::new(&[1., 2., 3., 4., 5., 6.], &[2, 3]);
    let b = Tensor::new(&[1., 0., 0., 1., 1., 1.], &[3, 2]);
    let c = a.mat_mul(&b).unwrap();
    assert_eq!(c.shape(), &[2, 2]);
    assert_eq!(c.to_vec(), vec![4., 5., 10., 11.]);

    // 列数与行数不一致
    assert!(a.mat_mul(&a).is_err());
    // 非二阶
    assert!(Tensor::zeros(&[2, 2, 2]).mat_mul(&b).is_err());
}

#[test]
fn test_reshape_and_transpose() {
    let a = Tensor::new(&[1., 2., 3., 4., 5., 6.], &[2, 3]);
    let t = a.transpose();
    assert_eq!(t.shape(), &[3, 2]);
    assert_eq!(t.to_vec(), vec![1., 4., 2., 5., 3., 6.]);
    // 转置后重塑须按逻辑顺序
    let r = t.reshape(&[6]).unwrap();
    assert_eq!(r.to_vec(), vec![1., 4., 2., 5., 3., 6.]);
    assert!(a.reshape(&[4]).is_err());
}

#[test]
fn test_concat_and_split() {
    let a = Tensor::new(&[1., 2., 3., 4.], &[2, 2]);
    let b = Tensor::new(&[5., 6.], &[2, 1]);
    let c = Tensor::concat(&[&a, &b], 1).unwrap();
    assert_eq!(c.shape(), &[2, 3]);
    assert_eq!(c.to_vec(), vec![1., 2., 5., 3., 4., 6.]);

    let parts = c.split(1, &[2, 1]).unwrap();
    assert_eq!(parts[0], a);
    assert_eq!(parts[1], b);

    assert_eq!(Tensor::concat(&[], 0).unwrap_err(), TensorError::EmptyList);
}

#[test]
fn test_sum_to_shape() {
    let grad = Tensor::new(&[1., 2., 3., 4., 5., 6.], &[2, 3]);
    let bias_grad = grad.sum_to_shape(&[3]).unwrap();
    assert_eq!(bias_grad.to_vec(), vec![5., 7., 9.]);
    let row_grad = grad.sum_to_shape(&[1, 3]).unwrap();
    assert_eq!(row_grad.shape(), &[1, 3]);
}

#[test]
fn test_softmax_last_axis() {
    let logits = Tensor::new(&[1., 2., 3., 1., 1., 1.], &[2, 3]);
    let probs = logits.softmax_last_axis();
    let v = probs.to_vec();
    assert_abs_diff_eq!(v[0] + v[1] + v[2], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(v[2], 0.665_240_9, epsilon = 1e-6);
    assert_abs_diff_eq!(v[3], 1.0 / 3.0, epsilon = 1e-6);
}

#[test]
fn test_argmax_rows() {
    let t = Tensor::new(&[0.1, 0.7, 0.2, 0.9, 0.05, 0.05], &[2, 3]);
    assert_eq!(t.argmax_rows(), vec![1, 0]);
    assert_eq!(t.argmax(), 3);
}

#[test]
fn test_seeded_random_is_reproducible() {
    let mut rng_1 = StdRng::seed_from_u64(42);
    let mut rng_2 = StdRng::seed_from_u64(42);
    let a = Tensor::normal_with_rng(0.0, 1.0, &[3, 3], &mut rng_1);
    let b = Tensor::normal_with_rng(0.0, 1.0, &[3, 3], &mut rng_2);
    assert_eq!(a, b);

    let u = Tensor::uniform_with_rng(-0.5, 0.5, &[100], &mut rng_1);
    assert!(u.to_vec().iter().all(|&x| (-0.5..=0.5).contains(&x)));
}

#[test]
fn test_flatten_batch() {
    let t = Tensor::zeros(&[4, 2, 3, 5]);
    let f = t.flatten_batch().unwrap();
    assert_eq!(f.shape(), &[4, 30]);
}
