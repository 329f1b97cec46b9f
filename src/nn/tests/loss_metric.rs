use approx::assert_abs_diff_eq;

use crate::nn::{Activation, Loss, Metric, NnError, Regularizer};
use crate::tensor::Tensor;

fn assert_close(actual: &Tensor, expected: &[f32]) {
    for (a, e) in actual.to_vec().iter().zip(expected) {
        assert_abs_diff_eq!(*a, *e, epsilon = 1e-5);
    }
}

// ==================== Loss ====================

#[test]
fn test_softmax_cross_entropy() {
    let logits = Tensor::new(&[0.0, 0.0], &[1, 2]);
    let labels = Tensor::new(&[1.0, 0.0], &[1, 2]);
    let (value, grad) = Loss::SoftmaxCrossEntropyWithLogits
        .value_and_gradient(&logits, &labels)
        .unwrap();
    assert_abs_diff_eq!(value, std::f32::consts::LN_2, epsilon = 1e-6);
    assert_close(&grad, &[-0.5, 0.5]);

    // 预测时做softmax
    let prediction = Loss::SoftmaxCrossEntropyWithLogits.prediction(&logits);
    assert_close(&prediction, &[0.5, 0.5]);
    assert_eq!(Loss::MSE.prediction(&logits), logits);
}

#[test]
fn test_regression_losses() {
    let pred = Tensor::new(&[1.0, 2.0], &[1, 2]);
    let zeros = Tensor::zeros(&[1, 2]);
    let (value, grad) = Loss::MSE.value_and_gradient(&pred, &zeros).unwrap();
    assert_abs_diff_eq!(value, 2.5);
    assert_close(&grad, &[1.0, 2.0]);

    let pred = Tensor::new(&[1.0, -2.0], &[1, 2]);
    let (value, grad) = Loss::MAE.value_and_gradient(&pred, &zeros).unwrap();
    assert_abs_diff_eq!(value, 1.5);
    assert_close(&grad, &[0.5, -0.5]);

    // 误差0.5落在二次区，误差3落在线性区
    let pred = Tensor::new(&[0.5, 3.0], &[1, 2]);
    let (value, grad) = Loss::Huber.value_and_gradient(&pred, &zeros).unwrap();
    assert_abs_diff_eq!(value, 1.3125);
    assert_close(&grad, &[0.25, 0.5]);
}

#[test]
fn test_binary_cross_entropy() {
    let pred = Tensor::new(&[0.5], &[1, 1]);
    let label = Tensor::new(&[1.0], &[1, 1]);
    let (value, grad) = Loss::BinaryCrossEntropy
        .value_and_gradient(&pred, &label)
        .unwrap();
    assert_abs_diff_eq!(value, std::f32::consts::LN_2, epsilon = 1e-6);
    assert_close(&grad, &[-2.0]);

    // 概率为0时不产生无穷大
    let (value, _) = Loss::BinaryCrossEntropy
        .value_and_gradient(&Tensor::zeros(&[1, 1]), &label)
        .unwrap();
    assert!(value.is_finite());
}

#[test]
fn test_loss_shape_mismatch() {
    let result = Loss::MSE.value_and_gradient(&Tensor::zeros(&[2, 3]), &Tensor::zeros(&[2, 4]));
    assert!(matches!(result, Err(NnError::Shape { .. })));
}

// ==================== Metric ====================

#[test]
fn test_accuracy() {
    let pred = Tensor::new(&[0.9, 0.1, 0.2, 0.8, 0.6, 0.4], &[3, 2]);
    let labels = Tensor::new(&[1.0, 0.0, 1.0, 0.0, 0.0, 1.0], &[3, 2]);
    assert_abs_diff_eq!(Metric::Accuracy.compute(&pred, &labels).unwrap(), 1.0 / 3.0);

    // 单列输出以0.5为阈值
    let pred = Tensor::new(&[0.7, 0.2], &[2, 1]);
    let labels = Tensor::new(&[1.0, 1.0], &[2, 1]);
    assert_abs_diff_eq!(Metric::Accuracy.compute(&pred, &labels).unwrap(), 0.5);
}

#[test]
fn test_regression_metrics() {
    let pred = Tensor::new(&[1.0, -3.0], &[2, 1]);
    let labels = Tensor::zeros(&[2, 1]);
    assert_abs_diff_eq!(Metric::MSE.compute(&pred, &labels).unwrap(), 5.0);
    assert_abs_diff_eq!(Metric::MAE.compute(&pred, &labels).unwrap(), 2.0);
    assert!(Metric::MAE.compute(&pred, &Tensor::zeros(&[1, 2])).is_err());
}

#[test]
fn test_metric_names() {
    assert_eq!(Metric::Accuracy.to_string(), "accuracy");
    assert_eq!(Metric::MSE.to_string(), "mse");
    assert_eq!(Metric::MAE.to_string(), "mae");
}

// ==================== Activation / Regularizer ====================

#[test]
fn test_activations() {
    let x = Tensor::new(&[-1.0, 0.0, 2.0], &[1, 3]);
    assert_close(&Activation::Linear.apply(&x), &[-1.0, 0.0, 2.0]);
    assert_close(&Activation::Relu.apply(&x), &[0.0, 0.0, 2.0]);
    assert_close(&Activation::Elu.apply(&x), &[(-1.0f32).exp() - 1.0, 0.0, 2.0]);
    assert_close(&Activation::Tanh.apply(&x), &[(-1.0f32).tanh(), 0.0, 2.0f32.tanh()]);

    let softmax = Activation::Softmax.apply(&x);
    assert_abs_diff_eq!(softmax.sum(), 1.0, epsilon = 1e-6);
    assert_eq!(Activation::default(), Activation::Linear);
}

#[test]
fn test_activation_backward() {
    let x = Tensor::new(&[-1.0, 3.0], &[1, 2]);
    let grad = Tensor::ones(&[1, 2]);
    let relu = Activation::Relu;
    let dx = relu.backward(&x, &relu.apply(&x), &grad).unwrap();
    assert_close(&dx, &[0.0, 1.0]);

    // 均匀的softmax输出，上游梯度只在第0列
    let x = Tensor::zeros(&[1, 2]);
    let softmax = Activation::Softmax;
    let dx = softmax
        .backward(&x, &softmax.apply(&x), &Tensor::new(&[1.0, 0.0], &[1, 2]))
        .unwrap();
    assert_close(&dx, &[0.25, -0.25]);
}

#[test]
fn test_regularizers() {
    let value = Tensor::new(&[1.0, -2.0, 0.0], &[3]);
    assert_abs_diff_eq!(Regularizer::L1(0.1).loss(&value), 0.3, epsilon = 1e-6);
    assert_abs_diff_eq!(Regularizer::L2(0.1).loss(&value), 0.5, epsilon = 1e-6);
    let both = Regularizer::L1L2 { l1: 0.1, l2: 0.1 };
    assert_abs_diff_eq!(both.loss(&value), 0.8, epsilon = 1e-6);
    assert_close(&both.gradient(&value), &[0.3, -0.5, 0.0]);
}
