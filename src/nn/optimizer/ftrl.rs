/*
 * @Author       : 老董
 * @Date         : 2026-02-04
 * @Description  : FTRL-Proximal 优化器
 *
 * g_s        = g + 2 * l2_shrinkage * θ
 * accum_new  = accum + g²
 * linear    += g_s - (accum_new^(-p) - accum^(-p)) / lr * θ
 * quadratic  = accum_new^(-p) / lr + 2 * l2
 * θ          = |linear| > l1 ? (sign(linear) * l1 - linear) / quadratic : 0
 *
 * 其中 p 为 learning_rate_power（默认 -0.5）。
 */

use serde::{Deserialize, Serialize};

use super::{OptimizerOps, add_slots, check_gradients, non_negative, slot_id};
use crate::nn::graph::{Graph, VariableId, VariableUpdate};
use crate::nn::init::Init;
use crate::nn::{NnError, NnResult};
use crate::tensor::Tensor;

const ACCUMULATOR: &str = "gradient_accumulator";
const LINEAR_ACCUMULATOR: &str = "linear_accumulator";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ftrl {
    learning_rate: f32,
    l1_strength: f32,
    l2_strength: f32,
    learning_rate_power: f32,
    l2_shrinkage_strength: f32,
    initial_accumulator_value: f32,
}

impl Ftrl {
    pub fn new(
        learning_rate: f32,
        l1_strength: f32,
        l2_strength: f32,
        learning_rate_power: f32,
    ) -> NnResult<Self> {
        non_negative("Ftrl", "learning_rate", learning_rate)?;
        non_negative("Ftrl", "l1_strength", l1_strength)?;
        non_negative("Ftrl", "l2_strength", l2_strength)?;
        if learning_rate_power > 0.0 {
            return Err(NnError::Configuration(format!(
                "Ftrl的learning_rate_power须<=0，实际为{learning_rate_power}"
            )));
        }
        Ok(Self {
            learning_rate,
            l1_strength,
            l2_strength,
            learning_rate_power,
            ..Self::default()
        })
    }

    pub fn with_l2_shrinkage(mut self, strength: f32) -> NnResult<Self> {
        non_negative(self.name(), "l2_shrinkage_strength", strength)?;
        self.l2_shrinkage_strength = strength;
        Ok(self)
    }

    pub fn with_initial_accumulator(mut self, value: f32) -> NnResult<Self> {
        non_negative(self.name(), "initial_accumulator_value", value)?;
        self.initial_accumulator_value = value;
        Ok(self)
    }
}

impl Default for Ftrl {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            l1_strength: 0.0,
            l2_strength: 0.0,
            learning_rate_power: -0.5,
            l2_shrinkage_strength: 0.0,
            initial_accumulator_value: 0.1,
        }
    }
}

impl OptimizerOps for Ftrl {
    fn name(&self) -> &'static str {
        "Ftrl"
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn allocate_slots(&self, graph: &mut Graph, trainable: &[VariableId]) -> NnResult<()> {
        add_slots(
            graph,
            trainable,
            &[
                (ACCUMULATOR, Init::Constant(self.initial_accumulator_value)),
                (LINEAR_ACCUMULATOR, Init::Zeros),
            ],
        )
    }

    fn apply_gradients(
        &self,
        graph: &Graph,
        trainable: &[VariableId],
        gradients: &[Tensor],
    ) -> NnResult<Vec<VariableUpdate>> {
        check_gradients(self.name(), trainable, gradients)?;
        let power = -self.learning_rate_power;
        let (lr, l1, l2) = (self.learning_rate, self.l1_strength, self.l2_strength);

        let mut updates = Vec::with_capacity(trainable.len() * 3);
        for (id, grad) in trainable.iter().zip(gradients) {
            let accum_id = slot_id(id, ACCUMULATOR)?;
            let linear_id = slot_id(id, LINEAR_ACCUMULATOR)?;
            let value = graph.value(id)?;
            let accum = graph.value(&accum_id)?;

            let shrunk_grad = grad + value * (2.0 * self.l2_shrinkage_strength);
            let accum_new = accum + grad.square();
            let sigma = (accum_new.map(|a| a.powf(power)) - accum.map(|a| a.powf(power))) / lr;
            let linear = graph.value(&linear_id)? + shrunk_grad - sigma * value;
            let quadratic = accum_new.map(|a| a.powf(power)) / lr + 2.0 * l2;
            let new_value = linear.zip_map(&quadratic, |lin, quad| {
                if lin.abs() > l1 {
                    (lin.signum() * l1 - lin) / quad
                } else {
                    0.0
                }
            })?;

            updates.push(VariableUpdate::new(id.clone(), new_value));
            updates.push(VariableUpdate::new(accum_id, accum_new));
            updates.push(VariableUpdate::new(linear_id, linear));
        }
        Ok(updates)
    }
}
