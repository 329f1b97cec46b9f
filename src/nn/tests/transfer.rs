/*
 * @Author       : 老董
 * @Date         : 2026-02-07
 * @Description  : 模型复制、权重快照与加载的测试
 */

use super::{classification_dataset, mlp};
use crate::nn::model::WeightSnapshot;
use crate::nn::optimizer::Adam;
use crate::nn::{Loss, Metric, Model, NnError};
use crate::tensor::Tensor;

fn trained_mlp() -> Model {
    let mut model = mlp(6, 3).with_seed(21).with_name("source");
    model
        .compile(Adam::default(), Loss::SoftmaxCrossEntropyWithLogits, &[Metric::Accuracy])
        .unwrap();
    model.fit(&classification_dataset(12, 4, 3), 2, 4).unwrap();
    model
}

fn compiled_mlp() -> Model {
    let mut model = mlp(6, 3).with_seed(99);
    model
        .compile(Adam::default(), Loss::SoftmaxCrossEntropyWithLogits, &[Metric::Accuracy])
        .unwrap();
    model
}

// ==================== copy ====================

#[test]
fn test_copy_with_weights_and_optimizer_state() {
    let mut source = trained_mlp();
    let mut copy = source.copy(true, true).unwrap();

    assert_eq!(copy.name(), "source_copy");
    assert!(copy.is_initialized());
    assert!(copy.is_optimizer_initialized());
    assert_eq!(copy.variable_names(), source.variable_names());
    assert_eq!(
        copy.weights_snapshot(true).unwrap(),
        source.weights_snapshot(true).unwrap()
    );

    // 复制后两者独立：继续训练副本不影响原模型，且两者继续训练的结果一致
    let dataset = classification_dataset(12, 4, 3);
    let before = source.weights_snapshot(true).unwrap();
    copy.fit(&dataset, 1, 4).unwrap();
    assert_eq!(source.weights_snapshot(true).unwrap(), before);
    source.fit(&dataset, 1, 4).unwrap();
    assert_eq!(
        copy.weights_snapshot(true).unwrap(),
        source.weights_snapshot(true).unwrap()
    );
}

#[test]
fn test_copy_without_optimizer_state() {
    let source = trained_mlp();
    let copy = source.copy(true, false).unwrap();
    assert!(copy.is_initialized());
    assert!(!copy.is_optimizer_initialized());

    let snapshot = copy.weights_snapshot(false).unwrap();
    assert_eq!(snapshot, source.weights_snapshot(false).unwrap());
    // 优化器变量没有被迁移
    let graph = copy.graph().unwrap();
    assert!(graph.value_by_name("beta1_power").is_err());
    assert!(graph.value_by_name("optimizer_dense_1_dense_kernel-m").is_err());
}

#[test]
fn test_copy_without_weights() {
    let source = trained_mlp();
    let copy = source.copy(false, false).unwrap();
    assert!(copy.is_compiled());
    assert!(!copy.is_initialized());
    assert_eq!(copy.layers(), source.layers());
}

#[test]
fn test_copy_requires_initialized_source() {
    let source = compiled_mlp();
    assert!(matches!(
        source.copy(true, false),
        Err(NnError::UninitializedModel(_))
    ));
    // 不复制权重时不需要初始化
    assert!(source.copy(false, false).is_ok());
    assert!(matches!(
        mlp(4, 3).copy(false, false),
        Err(NnError::Configuration(_))
    ));
}

/// 冻结层的优化器槽不随优化器状态迁移
#[test]
fn test_frozen_layer_slots_are_not_copied() {
    let mut source = trained_mlp();
    source.set_layer_trainable("dense_1", false).unwrap();

    let copy = source.copy(true, true).unwrap();
    let snapshot = copy.weights_snapshot(true).unwrap();
    let names = snapshot.names();
    assert!(names.contains(&"dense_1_dense_kernel"));
    assert!(names.contains(&"optimizer_dense_2_dense_kernel-m"));
    assert!(names.contains(&"beta1_power"));
    assert!(!names.contains(&"optimizer_dense_1_dense_kernel-m"));

    // 副本编译时该层已冻结，不再为它分配槽
    let slot = "optimizer_dense_1_dense_kernel-m".to_string();
    assert!(source.variable_names().contains(&slot));
    assert!(!copy.variable_names().contains(&slot));
    assert_eq!(copy.trainable_variables().len(), 2);
}

// ==================== 快照与加载 ====================

#[test]
fn test_weights_snapshot() {
    let model = trained_mlp();
    let layer_only = model.weights_snapshot(false).unwrap();
    assert_eq!(
        layer_only.names(),
        vec![
            "dense_1_dense_kernel",
            "dense_1_dense_bias",
            "dense_2_dense_kernel",
            "dense_2_dense_bias",
        ]
    );
    let full = model.weights_snapshot(true).unwrap();
    assert_eq!(full.len(), 4 + 8 + 2);

    assert!(matches!(
        compiled_mlp().weights_snapshot(false),
        Err(NnError::UninitializedModel(_))
    ));
}

#[test]
fn test_snapshot_serialization() {
    let snapshot = trained_mlp().weights_snapshot(true).unwrap();
    let bytes = snapshot.to_bytes().unwrap();
    assert_eq!(WeightSnapshot::from_bytes(&bytes).unwrap(), snapshot);

    let json = snapshot.to_json().unwrap();
    assert_eq!(WeightSnapshot::from_json(&json).unwrap(), snapshot);

    assert!(matches!(
        WeightSnapshot::from_bytes(&[1, 2, 3]),
        Err(NnError::Serialization(_))
    ));
}

#[test]
fn test_load_weights() {
    let mut source = trained_mlp();
    let snapshot = source.weights_snapshot(true).unwrap();

    let mut target = compiled_mlp();
    target.load_weights(&snapshot, true).unwrap();
    assert!(target.is_initialized());
    assert!(target.is_optimizer_initialized());
    assert_eq!(target.weights_snapshot(true).unwrap(), snapshot);

    let sample = Tensor::new(&[0.0, 1.0, 0.0, 0.0], &[4]);
    assert_eq!(
        target.predict_softly(&sample).unwrap(),
        source.predict_softly(&sample).unwrap()
    );

    // 只能在初始化之前加载
    assert!(matches!(
        target.load_weights(&snapshot, true),
        Err(NnError::Configuration(_))
    ));
}

#[test]
fn test_load_weights_without_optimizer_state() {
    let snapshot = trained_mlp().weights_snapshot(true).unwrap();
    let mut target = compiled_mlp();
    target.load_weights(&snapshot, false).unwrap();
    assert!(target.is_initialized());
    assert!(!target.is_optimizer_initialized());
    assert!(target.graph().unwrap().value_by_name("beta1_power").is_err());

    // 训练时补齐优化器变量
    target.fit(&classification_dataset(6, 4, 3), 1, 3).unwrap();
    assert!(target.is_optimizer_initialized());
}

#[test]
fn test_load_weights_errors() {
    let mut unknown = WeightSnapshot::new();
    unknown.push("no_such_variable", Tensor::zeros(&[1]));
    let mut target = compiled_mlp();
    assert_eq!(
        target.load_weights(&unknown, false),
        Err(NnError::MissingVariable("no_such_variable".to_string()))
    );
    assert!(!target.is_initialized());

    // 形状不一致时一个变量也不加载
    let mut wrong_shape = WeightSnapshot::new();
    wrong_shape.push("dense_1_dense_bias", Tensor::zeros(&[6]));
    wrong_shape.push("dense_2_dense_bias", Tensor::zeros(&[4]));
    assert!(matches!(
        target.load_weights(&wrong_shape, false),
        Err(NnError::Shape { .. })
    ));
    assert!(
        target
            .graph()
            .unwrap()
            .value_by_name("dense_1_dense_bias")
            .is_err()
    );
}

#[test]
fn test_partial_snapshot_fills_missing_layer_variables() {
    let mut partial = WeightSnapshot::new();
    partial.push("dense_1_dense_bias", Tensor::ones(&[6]));
    let mut target = compiled_mlp();
    target.load_weights(&partial, false).unwrap();

    let graph = target.graph().unwrap();
    assert_eq!(
        graph.value_by_name("dense_1_dense_bias").unwrap(),
        &Tensor::ones(&[6])
    );
    assert!(graph.value_by_name("dense_2_dense_kernel").is_ok());
}
