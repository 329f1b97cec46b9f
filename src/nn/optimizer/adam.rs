/*
 * @Author       : 老董
 * @Date         : 2026-02-03
 * @Description  : Adam 系优化器：Adam、Adamax、Nadam
 *
 * 偏差修正所需的 β^t 不用整数步数计算，而是作为优化器标量保存在 Graph 中
 * （初值为 β，每步乘一次 β），因此迁移优化器状态时步数信息也随之迁移。
 */

use serde::{Deserialize, Serialize};

use super::{OptimizerOps, add_slots, check_gradients, in_unit_interval, non_negative, slot_id};
use crate::nn::graph::{Graph, VariableId, VariableUpdate};
use crate::nn::init::Init;
use crate::nn::NnResult;
use crate::tensor::Tensor;

const FIRST_MOMENT: &str = "m";
const SECOND_MOMENT: &str = "v";
const BETA1_POWER: &str = "beta1_power";
const BETA2_POWER: &str = "beta2_power";
const M_SCHEDULE: &str = "m_schedule";
const NADAM_ITERATIONS: &str = "nadam_iterations";

fn validate(name: &str, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> NnResult<()> {
    non_negative(name, "learning_rate", learning_rate)?;
    in_unit_interval(name, "beta1", beta1)?;
    in_unit_interval(name, "beta2", beta2)?;
    non_negative(name, "epsilon", epsilon)
}

// ==================== Adam ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    nesterov: bool,
}

impl Adam {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> NnResult<Self> {
        validate("Adam", learning_rate, beta1, beta2, epsilon)?;
        Ok(Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            nesterov: false,
        })
    }

    pub fn with_nesterov(mut self, nesterov: bool) -> Self {
        self.nesterov = nesterov;
        self
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            nesterov: false,
        }
    }
}

impl OptimizerOps for Adam {
    fn name(&self) -> &'static str {
        "Adam"
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn allocate_slots(&self, graph: &mut Graph, trainable: &[VariableId]) -> NnResult<()> {
        add_slots(
            graph,
            trainable,
            &[(FIRST_MOMENT, Init::Zeros), (SECOND_MOMENT, Init::Zeros)],
        )?;
        graph.add_optimizer_scalar(BETA1_POWER, self.beta1)?;
        graph.add_optimizer_scalar(BETA2_POWER, self.beta2)?;
        Ok(())
    }

    fn apply_gradients(
        &self,
        graph: &Graph,
        trainable: &[VariableId],
        gradients: &[Tensor],
    ) -> NnResult<Vec<VariableUpdate>> {
        check_gradients(self.name(), trainable, gradients)?;
        let beta1_power_id = VariableId::scalar(BETA1_POWER);
        let beta2_power_id = VariableId::scalar(BETA2_POWER);
        let beta1_power = graph.scalar_value(&beta1_power_id)?;
        let beta2_power = graph.scalar_value(&beta2_power_id)?;

        // 偏差修正合并进学习率：lr_t = lr * √(1 - β2^t) / (1 - β1^t)
        let lr_t = self.learning_rate * (1.0 - beta2_power).sqrt() / (1.0 - beta1_power);

        let mut updates = Vec::with_capacity(trainable.len() * 3 + 2);
        for (id, grad) in trainable.iter().zip(gradients) {
            let m_id = slot_id(id, FIRST_MOMENT)?;
            let v_id = slot_id(id, SECOND_MOMENT)?;

            // m = β1 * m + (1 - β1) * g
            let m = graph.value(&m_id)? * self.beta1 + grad * (1.0 - self.beta1);
            // v = β2 * v + (1 - β2) * g²
            let v = graph.value(&v_id)? * self.beta2 + grad.square() * (1.0 - self.beta2);

            let numerator = if self.nesterov {
                &m * self.beta1 + grad * (1.0 - self.beta1)
            } else {
                m.clone()
            };
            let value = graph.value(id)? - numerator / (v.sqrt() + self.epsilon) * lr_t;

            updates.push(VariableUpdate::new(id.clone(), value));
            updates.push(VariableUpdate::new(m_id, m));
            updates.push(VariableUpdate::new(v_id, v));
        }
        updates.push(VariableUpdate::new(
            beta1_power_id,
            Tensor::scalar(beta1_power * self.beta1),
        ));
        updates.push(VariableUpdate::new(
            beta2_power_id,
            Tensor::scalar(beta2_power * self.beta2),
        ));
        Ok(updates)
    }
}

// ==================== Adamax ====================

/// 基于无穷范数的Adam变体：v = max(β2 * v, |g|)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adamax {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
}

impl Adamax {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> NnResult<Self> {
        validate("Adamax", learning_rate, beta1, beta2, epsilon)?;
        Ok(Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        })
    }
}

impl Default for Adamax {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

impl OptimizerOps for Adamax {
    fn name(&self) -> &'static str {
        "Adamax"
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn allocate_slots(&self, graph: &mut Graph, trainable: &[VariableId]) -> NnResult<()> {
        add_slots(
            graph,
            trainable,
            &[(FIRST_MOMENT, Init::Zeros), (SECOND_MOMENT, Init::Zeros)],
        )?;
        graph.add_optimizer_scalar(BETA1_POWER, self.beta1)?;
        Ok(())
    }

    fn apply_gradients(
        &self,
        graph: &Graph,
        trainable: &[VariableId],
        gradients: &[Tensor],
    ) -> NnResult<Vec<VariableUpdate>> {
        check_gradients(self.name(), trainable, gradients)?;
        let beta1_power_id = VariableId::scalar(BETA1_POWER);
        let beta1_power = graph.scalar_value(&beta1_power_id)?;
        let lr_t = self.learning_rate / (1.0 - beta1_power);

        let mut updates = Vec::with_capacity(trainable.len() * 3 + 1);
        for (id, grad) in trainable.iter().zip(gradients) {
            let m_id = slot_id(id, FIRST_MOMENT)?;
            let v_id = slot_id(id, SECOND_MOMENT)?;

            let m = graph.value(&m_id)? * self.beta1 + grad * (1.0 - self.beta1);
            let v = (graph.value(&v_id)? * self.beta2).maximum(&grad.abs())?;
            let value = graph.value(id)? - &m / (&v + self.epsilon) * lr_t;

            updates.push(VariableUpdate::new(id.clone(), value));
            updates.push(VariableUpdate::new(m_id, m));
            updates.push(VariableUpdate::new(v_id, v));
        }
        updates.push(VariableUpdate::new(
            beta1_power_id,
            Tensor::scalar(beta1_power * self.beta1),
        ));
        Ok(updates)
    }
}

// ==================== Nadam ====================

/// Nesterov动量版的Adam，动量系数按
/// μ_t = β1 * (1 - 0.5 * decay_base^(t * decay)) 逐步变化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nadam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    decay_base: f32,
    decay: f32,
}

impl Nadam {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> NnResult<Self> {
        validate("Nadam", learning_rate, beta1, beta2, epsilon)?;
        Ok(Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            ..Self::default()
        })
    }

    pub fn with_schedule(mut self, decay_base: f32, decay: f32) -> NnResult<Self> {
        in_unit_interval(self.name(), "decay_base", decay_base)?;
        non_negative(self.name(), "decay", decay)?;
        self.decay_base = decay_base;
        self.decay = decay;
        Ok(self)
    }

    fn momentum_at(&self, step: f32) -> f32 {
        self.beta1 * (1.0 - 0.5 * self.decay_base.powf(step * self.decay))
    }
}

impl Default for Nadam {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            decay_base: 0.96,
            decay: 0.004,
        }
    }
}

impl OptimizerOps for Nadam {
    fn name(&self) -> &'static str {
        "Nadam"
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn allocate_slots(&self, graph: &mut Graph, trainable: &[VariableId]) -> NnResult<()> {
        add_slots(
            graph,
            trainable,
            &[(FIRST_MOMENT, Init::Zeros), (SECOND_MOMENT, Init::Zeros)],
        )?;
        graph.add_optimizer_scalar(BETA2_POWER, self.beta2)?;
        graph.add_optimizer_scalar(M_SCHEDULE, 1.0)?;
        graph.add_optimizer_scalar(NADAM_ITERATIONS, 0.0)?;
        Ok(())
    }

    fn apply_gradients(
        &self,
        graph: &Graph,
        trainable: &[VariableId],
        gradients: &[Tensor],
    ) -> NnResult<Vec<VariableUpdate>> {
        check_gradients(self.name(), trainable, gradients)?;
        let beta2_power_id = VariableId::scalar(BETA2_POWER);
        let schedule_id = VariableId::scalar(M_SCHEDULE);
        let iterations_id = VariableId::scalar(NADAM_ITERATIONS);
        let beta2_power = graph.scalar_value(&beta2_power_id)?;
        let m_schedule = graph.scalar_value(&schedule_id)?;
        let t = graph.scalar_value(&iterations_id)? + 1.0;

        // 本步与下一步的动量系数
        let momentum_t = self.momentum_at(t);
        let momentum_next = self.momentum_at(t + 1.0);
        let schedule_new = m_schedule * momentum_t;
        let schedule_next = schedule_new * momentum_next;

        let mut updates = Vec::with_capacity(trainable.len() * 3 + 3);
        for (id, grad) in trainable.iter().zip(gradients) {
            let m_id = slot_id(id, FIRST_MOMENT)?;
            let v_id = slot_id(id, SECOND_MOMENT)?;

            let g_prime = grad / (1.0 - schedule_new);
            let m = graph.value(&m_id)? * self.beta1 + grad * (1.0 - self.beta1);
            let m_prime = &m / (1.0 - schedule_next);
            let v = graph.value(&v_id)? * self.beta2 + grad.square() * (1.0 - self.beta2);
            let v_prime = &v / (1.0 - beta2_power);
            let m_bar = g_prime * (1.0 - momentum_t) + m_prime * momentum_next;
            let value =
                graph.value(id)? - m_bar / (v_prime.sqrt() + self.epsilon) * self.learning_rate;

            updates.push(VariableUpdate::new(id.clone(), value));
            updates.push(VariableUpdate::new(m_id, m));
            updates.push(VariableUpdate::new(v_id, v));
        }
        updates.push(VariableUpdate::new(
            beta2_power_id,
            Tensor::scalar(beta2_power * self.beta2),
        ));
        updates.push(VariableUpdate::new(schedule_id, Tensor::scalar(schedule_new)));
        updates.push(VariableUpdate::new(iterations_id, Tensor::scalar(t)));
        Ok(updates)
    }
}
