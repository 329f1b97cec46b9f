/*
 * @Author       : 老董
 * @Date         : 2024-01-31 20:23:53
 * @LastEditors  : 老董
 * @LastEditTime : 2026-02-06 10:12:40
 * @Description  : 负责神经网络（neural network）的构建：声明式的层、变量注册表、优化器与可训练模型
 */

pub mod activation;
pub mod error;
pub mod graph;
pub mod init;
pub mod layer;
pub mod loss;
pub mod metric;
pub mod model;
pub mod optimizer;
pub mod shape;

pub use activation::Activation;
pub use error::{NnError, NnResult};
pub use graph::{Gradients, Graph, Variable, VariableId, VariableUpdate};
pub use init::{Init, Regularizer};
pub use layer::{Layer, LayerKind, LayerOps};
pub use loss::Loss;
pub use metric::Metric;
pub use model::{
    Callback, EarlyStopping, EvaluationResult, Model, Topology, TrainingHistory, WeightSnapshot,
};
pub use optimizer::{Optimizer, OptimizerOps};
pub use shape::{Dim, ShapeSpec};

#[cfg(test)]
mod tests;
