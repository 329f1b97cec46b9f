/*
 * @Author       : 老董
 * @Date         : 2026-02-02
 * @Description  : SGD 与 Momentum 优化器
 */

use serde::{Deserialize, Serialize};

use super::{OptimizerOps, add_slots, check_gradients, non_negative, slot_id};
use crate::nn::graph::{Graph, VariableId, VariableUpdate};
use crate::nn::init::Init;
use crate::nn::NnResult;
use crate::tensor::Tensor;

const MOMENTUM: &str = "momentum";

/// 随机梯度下降：θ = θ - α * g
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SGD {
    learning_rate: f32,
}

impl SGD {
    pub fn new(learning_rate: f32) -> NnResult<Self> {
        non_negative("SGD", "learning_rate", learning_rate)?;
        Ok(Self { learning_rate })
    }
}

impl Default for SGD {
    fn default() -> Self {
        Self { learning_rate: 0.2 }
    }
}

impl OptimizerOps for SGD {
    fn name(&self) -> &'static str {
        "SGD"
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn allocate_slots(&self, _graph: &mut Graph, _trainable: &[VariableId]) -> NnResult<()> {
        Ok(())
    }

    fn apply_gradients(
        &self,
        graph: &Graph,
        trainable: &[VariableId],
        gradients: &[Tensor],
    ) -> NnResult<Vec<VariableUpdate>> {
        check_gradients(self.name(), trainable, gradients)?;
        trainable
            .iter()
            .zip(gradients)
            .map(|(id, grad)| {
                let value = graph.value(id)? - grad * self.learning_rate;
                Ok(VariableUpdate::new(id.clone(), value))
            })
            .collect()
    }
}

/// 动量法：
/// - accum = momentum * accum + g
/// - θ = θ - α * accum（nesterov时为θ - α * (g + momentum * accum)）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Momentum {
    learning_rate: f32,
    momentum: f32,
    nesterov: bool,
}

impl Momentum {
    pub fn new(learning_rate: f32, momentum: f32, nesterov: bool) -> NnResult<Self> {
        non_negative("Momentum", "learning_rate", learning_rate)?;
        non_negative("Momentum", "momentum", momentum)?;
        Ok(Self {
            learning_rate,
            momentum,
            nesterov,
        })
    }
}

impl Default for Momentum {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            momentum: 0.99,
            nesterov: false,
        }
    }
}

impl OptimizerOps for Momentum {
    fn name(&self) -> &'static str {
        "Momentum"
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn allocate_slots(&self, graph: &mut Graph, trainable: &[VariableId]) -> NnResult<()> {
        add_slots(graph, trainable, &[(MOMENTUM, Init::Zeros)])
    }

    fn apply_gradients(
        &self,
        graph: &Graph,
        trainable: &[VariableId],
        gradients: &[Tensor],
    ) -> NnResult<Vec<VariableUpdate>> {
        check_gradients(self.name(), trainable, gradients)?;
        let mut updates = Vec::with_capacity(trainable.len() * 2);
        for (id, grad) in trainable.iter().zip(gradients) {
            let accum_id = slot_id(id, MOMENTUM)?;
            let accum = graph.value(&accum_id)? * self.momentum + grad;
            let step = if self.nesterov {
                grad + &accum * self.momentum
            } else {
                accum.clone()
            };
            let value = graph.value(id)? - step * self.learning_rate;
            updates.push(VariableUpdate::new(id.clone(), value));
            updates.push(VariableUpdate::new(accum_id, accum));
        }
        Ok(updates)
    }
}
