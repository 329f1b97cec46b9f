/*
 * @Author       : 老董
 * @Date         : 2026-02-04
 * @Description  : AdaGrad 系优化器：AdaGrad、AdaDelta、AdaGradDA
 */

use serde::{Deserialize, Serialize};

use super::{OptimizerOps, add_slots, check_gradients, non_negative, slot_id};
use crate::nn::graph::{Graph, VariableId, VariableUpdate};
use crate::nn::init::Init;
use crate::nn::NnResult;
use crate::tensor::Tensor;

const ACCUMULATOR: &str = "accumulator";
const ACCUM: &str = "accum";
const ACCUM_UPDATE: &str = "accum_update";
const GRADIENT_ACCUMULATOR: &str = "gradient_accumulator";
const SQUARED_ACCUMULATOR: &str = "gradient_squared_accumulator";
const GLOBAL_STEP: &str = "adagrad_da_global_step";

// ==================== AdaGrad ====================

/// accum = accum + g²；θ = θ - lr * g / √accum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaGrad {
    learning_rate: f32,
    initial_accumulator_value: f32,
}

impl AdaGrad {
    pub fn new(learning_rate: f32, initial_accumulator_value: f32) -> NnResult<Self> {
        non_negative("AdaGrad", "learning_rate", learning_rate)?;
        non_negative("AdaGrad", "initial_accumulator_value", initial_accumulator_value)?;
        Ok(Self {
            learning_rate,
            initial_accumulator_value,
        })
    }
}

impl Default for AdaGrad {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            initial_accumulator_value: 0.01,
        }
    }
}

impl OptimizerOps for AdaGrad {
    fn name(&self) -> &'static str {
        "AdaGrad"
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn allocate_slots(&self, graph: &mut Graph, trainable: &[VariableId]) -> NnResult<()> {
        add_slots(
            graph,
            trainable,
            &[(ACCUMULATOR, Init::Constant(self.initial_accumulator_value))],
        )
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
            let accum_id = slot_id(id, ACCUMULATOR)?;
            let accum = graph.value(&accum_id)? + grad.square();
            let value = graph.value(id)? - grad / accum.sqrt() * self.learning_rate;
            updates.push(VariableUpdate::new(id.clone(), value));
            updates.push(VariableUpdate::new(accum_id, accum));
        }
        Ok(updates)
    }
}

// ==================== AdaDelta ====================

/// - accum = ρ * accum + (1 - ρ) * g²
/// - Δ = √(accum_update + ε) / √(accum + ε) * g
/// - accum_update = ρ * accum_update + (1 - ρ) * Δ²
/// - θ = θ - lr * Δ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaDelta {
    learning_rate: f32,
    rho: f32,
    epsilon: f32,
}

impl AdaDelta {
    pub fn new(learning_rate: f32, rho: f32, epsilon: f32) -> NnResult<Self> {
        non_negative("AdaDelta", "learning_rate", learning_rate)?;
        non_negative("AdaDelta", "rho", rho)?;
        non_negative("AdaDelta", "epsilon", epsilon)?;
        Ok(Self {
            learning_rate,
            rho,
            epsilon,
        })
    }
}

impl Default for AdaDelta {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            rho: 0.95,
            epsilon: 1e-8,
        }
    }
}

impl OptimizerOps for AdaDelta {
    fn name(&self) -> &'static str {
        "AdaDelta"
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn allocate_slots(&self, graph: &mut Graph, trainable: &[VariableId]) -> NnResult<()> {
        add_slots(
            graph,
            trainable,
            &[(ACCUM, Init::Zeros), (ACCUM_UPDATE, Init::Zeros)],
        )
    }

    fn apply_gradients(
        &self,
        graph: &Graph,
        trainable: &[VariableId],
        gradients: &[Tensor],
    ) -> NnResult<Vec<VariableUpdate>> {
        check_gradients(self.name(), trainable, gradients)?;
        let mut updates = Vec::with_capacity(trainable.len() * 3);
        for (id, grad) in trainable.iter().zip(gradients) {
            let accum_id = slot_id(id, ACCUM)?;
            let update_id = slot_id(id, ACCUM_UPDATE)?;

            let accum = graph.value(&accum_id)? * self.rho + grad.square() * (1.0 - self.rho);
            let accum_update = graph.value(&update_id)?;
            let delta = (accum_update + self.epsilon).sqrt() / (&accum + self.epsilon).sqrt() * grad;
            let accum_update = accum_update * self.rho + delta.square() * (1.0 - self.rho);
            let value = graph.value(id)? - &delta * self.learning_rate;

            updates.push(VariableUpdate::new(id.clone(), value));
            updates.push(VariableUpdate::new(accum_id, accum));
            updates.push(VariableUpdate::new(update_id, accum_update));
        }
        Ok(updates)
    }
}

// ==================== AdaGradDA ====================

/// AdaGrad对偶平均法，适合训练稀疏的线性模型
///
/// - grad_accum += g；grad_sq_accum += g²
/// - tmp = sign(grad_accum) * max(|grad_accum| - l1 * step, 0)
/// - θ = -tmp * lr / (step * l2 * lr + √grad_sq_accum)
///
/// 全局步数由所有变量共享，每次`apply_gradients`在全部变量更新之后恰好加1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaGradDA {
    learning_rate: f32,
    initial_accumulator_value: f32,
    l1_strength: f32,
    l2_strength: f32,
}

impl AdaGradDA {
    pub fn new(
        learning_rate: f32,
        initial_accumulator_value: f32,
        l1_strength: f32,
        l2_strength: f32,
    ) -> NnResult<Self> {
        non_negative("AdaGradDA", "learning_rate", learning_rate)?;
        non_negative("AdaGradDA", "initial_accumulator_value", initial_accumulator_value)?;
        non_negative("AdaGradDA", "l1_strength", l1_strength)?;
        non_negative("AdaGradDA", "l2_strength", l2_strength)?;
        Ok(Self {
            learning_rate,
            initial_accumulator_value,
            l1_strength,
            l2_strength,
        })
    }
}

impl Default for AdaGradDA {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            initial_accumulator_value: 0.01,
            l1_strength: 0.01,
            l2_strength: 0.01,
        }
    }
}

impl OptimizerOps for AdaGradDA {
    fn name(&self) -> &'static str {
        "AdaGradDA"
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn allocate_slots(&self, graph: &mut Graph, trainable: &[VariableId]) -> NnResult<()> {
        add_slots(
            graph,
            trainable,
            &[
                (GRADIENT_ACCUMULATOR, Init::Zeros),
                (
                    SQUARED_ACCUMULATOR,
                    Init::Constant(self.initial_accumulator_value),
                ),
            ],
        )?;
        graph.add_optimizer_scalar(GLOBAL_STEP, 0.0)?;
        Ok(())
    }

    fn apply_gradients(
        &self,
        graph: &Graph,
        trainable: &[VariableId],
        gradients: &[Tensor],
    ) -> NnResult<Vec<VariableUpdate>> {
        check_gradients(self.name(), trainable, gradients)?;
        let step_id = VariableId::scalar(GLOBAL_STEP);
        let step = graph.scalar_value(&step_id)?;
        let (lr, l1, l2) = (self.learning_rate, self.l1_strength, self.l2_strength);

        let mut updates = Vec::with_capacity(trainable.len() * 3 + 1);
        for (id, grad) in trainable.iter().zip(gradients) {
            let accum_id = slot_id(id, GRADIENT_ACCUMULATOR)?;
            let squared_id = slot_id(id, SQUARED_ACCUMULATOR)?;

            let accum = graph.value(&accum_id)? + grad;
            let squared = graph.value(&squared_id)? + grad.square();
            let shrunk = if l1 > 0.0 {
                accum.map(|a| a.signum() * (a.abs() - l1 * step).max(0.0))
            } else {
                accum.clone()
            };
            let value = -(&shrunk * lr) / (squared.sqrt() + step * l2 * lr);

            updates.push(VariableUpdate::new(id.clone(), value));
            updates.push(VariableUpdate::new(accum_id, accum));
            updates.push(VariableUpdate::new(squared_id, squared));
        }
        updates.push(VariableUpdate::new(step_id, Tensor::scalar(step + 1.0)));
        Ok(updates)
    }
}
