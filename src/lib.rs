//! # Only Keras
//!
//! `only_keras`是一个用纯rust实现的声明式神经网络训练引擎：
//! 用层的列表描述模型，编译时推导形状、在变量注册表中分配变量与优化器槽，
//! 之后以小批量梯度下降训练，并支持评估、推理、模型复制与权重迁移。
//!

pub mod data;
pub mod errors;
pub mod nn;
pub mod tensor;
