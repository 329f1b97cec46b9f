/*
 * @Author       : 老董
 * @Date         : 2026-01-27
 * @Description  : 变量与变量标识
 *
 * 变量以结构化的 `VariableId`（层名, 用途）为键，
 * 只有在与外部交互（快照、加载）时才编码成字符串：
 * - 层变量：`{layer}_{purpose}`，如 `dense_1_dense_kernel`
 * - 优化器槽：`optimizer_{layer}_{purpose}-{slot}`，如 `optimizer_dense_1_dense_kernel-m`
 * - 优化器标量：原名，如 `beta1_power`
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::nn::init::{Init, Regularizer};
use crate::tensor::Tensor;

/// 优化器变量名前缀
pub const OPTIMIZER_PREFIX: &str = "optimizer_";

/// 变量的结构化标识
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariableId {
    /// 层变量
    Layer { layer: String, purpose: String },
    /// 优化器为某个层变量创建的槽
    Slot {
        layer: String,
        purpose: String,
        slot: String,
    },
    /// 优化器自身的标量状态（不隶属于任何层）
    OptimizerScalar { name: String },
}

impl VariableId {
    pub fn layer(layer: &str, purpose: &str) -> Self {
        Self::Layer {
            layer: layer.to_string(),
            purpose: purpose.to_string(),
        }
    }

    pub fn scalar(name: &str) -> Self {
        Self::OptimizerScalar {
            name: name.to_string(),
        }
    }

    /// 本变量（须为层变量）的某个槽的标识
    pub fn slot(&self, slot: &str) -> Option<Self> {
        match self {
            Self::Layer { layer, purpose } => Some(Self::Slot {
                layer: layer.clone(),
                purpose: purpose.clone(),
                slot: slot.to_string(),
            }),
            _ => None,
        }
    }

    /// 所属层名；优化器标量不属于任何层
    pub fn owner_layer(&self) -> Option<&str> {
        match self {
            Self::Layer { layer, .. } | Self::Slot { layer, .. } => Some(layer),
            Self::OptimizerScalar { .. } => None,
        }
    }

    pub fn is_optimizer_variable(&self) -> bool {
        !matches!(self, Self::Layer { .. })
    }

    /// 编码成外部可见的字符串名
    pub fn encode(&self) -> String {
        match self {
            Self::Layer { layer, purpose } => format!("{layer}_{purpose}"),
            Self::Slot {
                layer,
                purpose,
                slot,
            } => format!("{OPTIMIZER_PREFIX}{layer}_{purpose}-{slot}"),
            Self::OptimizerScalar { name } => name.clone(),
        }
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// 注册表中的一个变量：带初始化器的具名、定形张量存储
#[derive(Debug, Clone)]
pub struct Variable {
    pub(super) id: VariableId,
    pub(super) name: String,
    pub(super) shape: Vec<usize>,
    pub(super) initializer: Init,
    pub(super) regularizer: Option<Regularizer>,
    pub(super) trainable: bool,
    pub(super) value: Option<Tensor>,
}

impl Variable {
    pub fn id(&self) -> &VariableId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn initializer(&self) -> &Init {
        &self.initializer
    }

    pub fn regularizer(&self) -> Option<&Regularizer> {
        self.regularizer.as_ref()
    }

    /// 变量自身是否可训练（BatchNorm的滑动统计量、冻结层的变量为false）
    pub fn is_trainable(&self) -> bool {
        self.trainable
    }

    pub fn value(&self) -> Option<&Tensor> {
        self.value.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.value.is_some()
    }
}

/// 一次更新运算：把`value`写入`id`
#[derive(Debug, Clone)]
pub struct VariableUpdate {
    pub id: VariableId,
    pub value: Tensor,
}

impl VariableUpdate {
    pub fn new(id: VariableId, value: Tensor) -> Self {
        Self { id, value }
    }
}
