/*
 * @Author       : 老董
 * @Date         : 2026-02-02
 * @Description  : 优化器模块
 *
 * 所有优化器共享两阶段约定：
 * 1. `allocate_slots`：编译时为每个可训练变量创建槽（及优化器自身的标量），每个 Graph 只调用一次；
 * 2. `apply_gradients`：按可训练变量的顺序接收梯度，返回一组更新运算，由模型在一次运行中统一执行。
 *
 * 优化器本身只保存超参数，所有可变状态都是 Graph 中的变量。
 */

mod adagrad;
mod adam;
mod ftrl;
mod rmsprop;
mod sgd;

pub use adagrad::{AdaDelta, AdaGrad, AdaGradDA};
pub use adam::{Adam, Adamax, Nadam};
pub use ftrl::Ftrl;
pub use rmsprop::RMSProp;
pub use sgd::{Momentum, SGD};

use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

use crate::nn::graph::{Graph, VariableId, VariableUpdate};
use crate::nn::init::Init;
use crate::nn::{NnError, NnResult};
use crate::tensor::Tensor;

#[enum_dispatch]
pub trait OptimizerOps {
    fn name(&self) -> &'static str;

    fn learning_rate(&self) -> f32;

    /// 为每个可训练变量创建槽；每个编译后的 Graph 只能调用一次
    fn allocate_slots(&self, graph: &mut Graph, trainable: &[VariableId]) -> NnResult<()>;

    /// 由梯度（与`trainable`一一对应）生成更新运算，不修改`graph`
    fn apply_gradients(
        &self,
        graph: &Graph,
        trainable: &[VariableId],
        gradients: &[Tensor],
    ) -> NnResult<Vec<VariableUpdate>>;
}

/// 所有优化器的闭集
#[enum_dispatch(OptimizerOps)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Optimizer {
    SGD,
    Momentum,
    Adam,
    Adamax,
    Nadam,
    RMSProp,
    AdaGrad,
    AdaDelta,
    AdaGradDA,
    Ftrl,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::Adam(Adam::default())
    }
}

// ========== 各优化器共用的辅助函数 ==========

/// 为每个可训练变量按`slots`依次创建槽
pub(super) fn add_slots(
    graph: &mut Graph,
    trainable: &[VariableId],
    slots: &[(&str, Init)],
) -> NnResult<()> {
    for variable in trainable {
        for (slot, init) in slots {
            graph.add_slot(variable, slot, init.clone())?;
        }
    }
    Ok(())
}

pub(super) fn slot_id(variable: &VariableId, slot: &str) -> NnResult<VariableId> {
    variable.slot(slot).ok_or_else(|| {
        NnError::Configuration(format!("`{variable}`不是层变量，没有优化器槽"))
    })
}

pub(super) fn check_gradients(
    optimizer: &str,
    trainable: &[VariableId],
    gradients: &[Tensor],
) -> NnResult<()> {
    if trainable.len() != gradients.len() {
        return Err(NnError::Configuration(format!(
            "{optimizer}收到{}个梯度，但有{}个可训练变量",
            gradients.len(),
            trainable.len()
        )));
    }
    Ok(())
}

// ========== 超参数校验 ==========

pub(super) fn non_negative(optimizer: &str, name: &str, value: f32) -> NnResult<()> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(NnError::Configuration(format!(
            "{optimizer}的{name}须>=0，实际为{value}"
        )))
    }
}

/// 须在开区间(0, 1)内
pub(super) fn in_unit_interval(optimizer: &str, name: &str, value: f32) -> NnResult<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(NnError::Configuration(format!(
            "{optimizer}的{name}须在(0, 1)内，实际为{value}"
        )))
    }
}
