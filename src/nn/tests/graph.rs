/*
 * @Author       : 老董
 * @Date         : 2026-02-07
 * @Description  : Graph（变量注册表）单元测试
 */

use approx::assert_abs_diff_eq;

use crate::nn::graph::OPTIMIZER_PREFIX;
use crate::nn::{Gradients, Graph, Init, NnError, Regularizer, VariableId, VariableUpdate};
use crate::tensor::Tensor;

fn graph_with_dense() -> Graph {
    let mut graph = Graph::new_with_seed(42);
    let kernel = graph
        .add_layer_variable("dense_1", "dense_kernel", &[4, 3], Init::GlorotUniform, true, None)
        .unwrap();
    graph
        .add_layer_variable("dense_1", "dense_bias", &[3], Init::Zeros, true, None)
        .unwrap();
    graph.add_slot(&kernel, "m", Init::Zeros).unwrap();
    graph.add_optimizer_scalar("beta1_power", 0.9).unwrap();
    graph
}

#[test]
fn test_variable_naming() {
    let graph = graph_with_dense();
    assert_eq!(
        graph.variable_names(),
        vec![
            "dense_1_dense_kernel",
            "dense_1_dense_bias",
            "optimizer_dense_1_dense_kernel-m",
            "beta1_power",
        ]
    );
    assert!(graph.variable_names()[2].starts_with(OPTIMIZER_PREFIX));

    let slot = graph.id_by_name("optimizer_dense_1_dense_kernel-m").unwrap();
    assert!(slot.is_optimizer_variable());
    assert_eq!(slot.owner_layer(), Some("dense_1"));
    assert_eq!(VariableId::scalar("beta1_power").owner_layer(), None);
}

#[test]
fn test_name_collision() {
    let mut graph = graph_with_dense();
    assert_eq!(
        graph.add_layer_variable("dense_1", "dense_bias", &[3], Init::Zeros, true, None),
        Err(NnError::NameCollision("dense_1_dense_bias".to_string()))
    );
    assert!(matches!(
        graph.add_optimizer_scalar("beta1_power", 0.9),
        Err(NnError::NameCollision(_))
    ));
    // 只能给层变量创建槽
    assert!(matches!(
        graph.add_slot(&VariableId::scalar("beta1_power"), "m", Init::Zeros),
        Err(NnError::Configuration(_))
    ));
}

#[test]
fn test_variable_groups() {
    let mut graph = graph_with_dense();
    graph
        .add_layer_variable("bn", "moving_mean", &[3], Init::Zeros, false, None)
        .unwrap();

    assert_eq!(graph.layer_variables().len(), 3);
    assert_eq!(graph.trainable_variables().len(), 2);
    assert_eq!(graph.frozen_variables(), vec![VariableId::layer("bn", "moving_mean")]);
    assert_eq!(graph.optimizer_variables().len(), 2);
    assert_eq!(graph.variables_of_layer("dense_1").len(), 2);
}

#[test]
fn test_frozen_layers() {
    let mut graph = graph_with_dense();
    graph.freeze_layer("dense_1");
    assert!(graph.is_layer_frozen("dense_1"));
    assert!(graph.trainable_variables().is_empty());

    // 冻结关系作用于层变量和它的槽，不作用于优化器标量
    let slot = VariableId::layer("dense_1", "dense_kernel").slot("m").unwrap();
    assert!(graph.is_frozen_variable(&slot));
    assert!(!graph.is_frozen_variable(&VariableId::scalar("beta1_power")));

    let to_copy = graph.freeze(|id| id.is_optimizer_variable() && graph.is_frozen_variable(id));
    assert_eq!(
        to_copy.iter().map(VariableId::encode).collect::<Vec<_>>(),
        vec!["dense_1_dense_kernel", "dense_1_dense_bias", "beta1_power"]
    );

    graph.unfreeze_layer("dense_1");
    assert_eq!(graph.trainable_variables().len(), 2);
}

#[test]
fn test_uninitialized_value() {
    let graph = graph_with_dense();
    assert!(matches!(
        graph.value_by_name("dense_1_dense_kernel"),
        Err(NnError::UninitializedModel(_))
    ));
    assert!(matches!(
        graph.value_by_name("no_such_variable"),
        Err(NnError::MissingVariable(_))
    ));
}

#[test]
fn test_initialization() {
    let mut graph = graph_with_dense();
    graph.initialize_layer_variables();
    assert!(graph.value_by_name("dense_1_dense_kernel").is_ok());
    assert!(graph.value_by_name("beta1_power").is_err());

    // Glorot均匀分布的边界
    let limit = (6.0f32 / 7.0).sqrt();
    let kernel = graph.value_by_name("dense_1_dense_kernel").unwrap();
    assert!(kernel.to_vec().iter().all(|v| v.abs() <= limit));

    assert_eq!(graph.initialize_missing_optimizer_variables(), 2);
    assert_eq!(graph.initialize_missing_optimizer_variables(), 0);
    assert_abs_diff_eq!(
        graph.scalar_value(&VariableId::scalar("beta1_power")).unwrap(),
        0.9
    );
}

#[test]
fn test_seeded_initialization_is_reproducible() {
    let mut a = graph_with_dense();
    let mut b = graph_with_dense();
    a.initialize_layer_variables();
    b.initialize_layer_variables();
    assert_eq!(
        a.value_by_name("dense_1_dense_kernel").unwrap(),
        b.value_by_name("dense_1_dense_kernel").unwrap()
    );
}

#[test]
fn test_assign_and_run_updates() {
    let mut graph = graph_with_dense();
    graph.initialize_layer_variables();

    assert!(matches!(
        graph.assign_by_name("dense_1_dense_bias", Tensor::zeros(&[4])),
        Err(NnError::Shape { .. })
    ));

    let bias = VariableId::layer("dense_1", "dense_bias");
    graph
        .run_updates(vec![VariableUpdate::new(bias.clone(), Tensor::ones(&[3]))])
        .unwrap();
    assert_eq!(graph.value(&bias).unwrap(), &Tensor::ones(&[3]));
}

#[test]
fn test_invalid_initializer() {
    let mut graph = Graph::new();
    assert!(matches!(
        graph.add_layer_variable("dense", "kernel", &[2, 2], Init::Uniform { min: 1.0, max: -1.0 }, true, None),
        Err(NnError::Configuration(_))
    ));
    assert!(matches!(
        graph.add_layer_variable("dense", "kernel", &[2, 2], Init::Normal { mean: 0.0, std: f32::NAN }, true, None),
        Err(NnError::Configuration(_))
    ));
    assert!(matches!(
        graph.add_optimizer_scalar("beta1_power", f32::NAN),
        Err(NnError::Configuration(_))
    ));
    assert!(graph.is_empty());
}

/// 一次运行中只要有一个更新不合法，所有更新都不写入
#[test]
fn test_run_updates_is_all_or_nothing() {
    let mut graph = graph_with_dense();
    graph.initialize_layer_variables();
    graph.initialize_optimizer_variables();

    let bias = VariableId::layer("dense_1", "dense_bias");
    let power = VariableId::scalar("beta1_power");
    let result = graph.run_updates(vec![
        VariableUpdate::new(bias.clone(), Tensor::ones(&[3])),
        VariableUpdate::new(power.clone(), Tensor::ones(&[2])),
    ]);
    assert!(matches!(result, Err(NnError::Shape { .. })));
    assert_eq!(graph.value(&bias).unwrap(), &Tensor::zeros(&[3]));
    assert_abs_diff_eq!(graph.scalar_value(&power).unwrap(), 0.9);

    // 未知变量同样使整次运行失败
    let result = graph.run_updates(vec![
        VariableUpdate::new(bias.clone(), Tensor::ones(&[3])),
        VariableUpdate::new(VariableId::layer("dense_9", "dense_bias"), Tensor::ones(&[3])),
    ]);
    assert!(matches!(result, Err(NnError::MissingVariable(_))));
    assert_eq!(graph.value(&bias).unwrap(), &Tensor::zeros(&[3]));
}

#[test]
fn test_copy_is_independent() {
    let mut graph = graph_with_dense();
    graph.initialize_layer_variables();
    let mut copy = graph.copy();

    assert_eq!(copy.variable_names(), graph.variable_names());
    copy.assign_by_name("dense_1_dense_bias", Tensor::ones(&[3]))
        .unwrap();
    assert_eq!(
        graph.value_by_name("dense_1_dense_bias").unwrap(),
        &Tensor::zeros(&[3])
    );
}

#[test]
fn test_regularization() {
    let mut graph = Graph::new_with_seed(0);
    let id = graph
        .add_layer_variable("dense", "kernel", &[2], Init::Zeros, true, Some(Regularizer::L2(0.5)))
        .unwrap();
    graph.initialize_layer_variables();
    graph.assign(&id, Tensor::new(&[1.0, -2.0], &[2])).unwrap();

    // 0.5 * (1 + 4)
    assert_abs_diff_eq!(graph.regularization_loss().unwrap(), 2.5);

    let mut grads = Gradients::new();
    grads.accumulate(&id, Tensor::new(&[0.1, 0.1], &[2]));
    graph.accumulate_regularization_gradients(&mut grads).unwrap();
    let grad = grads.get(&id).unwrap().to_vec();
    assert_abs_diff_eq!(grad[0], 1.1, epsilon = 1e-6);
    assert_abs_diff_eq!(grad[1], -1.9, epsilon = 1e-6);
}

#[test]
fn test_gradients_ordered_fills_zeros() {
    let a = VariableId::layer("l", "a");
    let b = VariableId::layer("l", "b");
    let mut grads = Gradients::new();
    grads.accumulate(&a, Tensor::ones(&[2]));
    grads.accumulate(&a, Tensor::ones(&[2]));

    let ordered = grads.ordered(&[b.clone(), a.clone()], |_| vec![2]);
    assert_eq!(ordered[0], Tensor::zeros(&[2]));
    assert_eq!(ordered[1], Tensor::full(2.0, &[2]));
}
