/*
 * @Author       : 老董
 * @Date         : 2026-02-03
 * @Description  : RMSProp 优化器（可选中心化版本）
 *
 * ms  = decay * ms + (1 - decay) * g²
 * mom = momentum * mom + lr * g / √(ms + ε)          （普通版）
 * mom = momentum * mom + lr * g / √(ms - mg² + ε)    （中心化版，mg = decay * mg + (1 - decay) * g）
 * θ   = θ - mom
 */

use serde::{Deserialize, Serialize};

use super::{OptimizerOps, add_slots, check_gradients, non_negative, slot_id};
use crate::nn::graph::{Graph, VariableId, VariableUpdate};
use crate::nn::init::Init;
use crate::nn::NnResult;
use crate::tensor::Tensor;

const RMS: &str = "rms";
const MOMENTUM: &str = "momentum";
const MEAN_GRADIENT: &str = "mg";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RMSProp {
    learning_rate: f32,
    decay: f32,
    momentum: f32,
    epsilon: f32,
    centered: bool,
}

impl RMSProp {
    pub fn new(
        learning_rate: f32,
        decay: f32,
        momentum: f32,
        epsilon: f32,
        centered: bool,
    ) -> NnResult<Self> {
        non_negative("RMSProp", "learning_rate", learning_rate)?;
        non_negative("RMSProp", "decay", decay)?;
        non_negative("RMSProp", "momentum", momentum)?;
        non_negative("RMSProp", "epsilon", epsilon)?;
        Ok(Self {
            learning_rate,
            decay,
            momentum,
            epsilon,
            centered,
        })
    }

    pub fn is_centered(&self) -> bool {
        self.centered
    }
}

impl Default for RMSProp {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            decay: 0.9,
            momentum: 0.0,
            epsilon: 1e-10,
            centered: false,
        }
    }
}

impl OptimizerOps for RMSProp {
    fn name(&self) -> &'static str {
        "RMSProp"
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn allocate_slots(&self, graph: &mut Graph, trainable: &[VariableId]) -> NnResult<()> {
        add_slots(
            graph,
            trainable,
            &[(RMS, Init::Ones), (MOMENTUM, Init::Zeros)],
        )?;
        if self.centered {
            add_slots(graph, trainable, &[(MEAN_GRADIENT, Init::Zeros)])?;
        }
        Ok(())
    }

    fn apply_gradients(
        &self,
        graph: &Graph,
        trainable: &[VariableId],
        gradients: &[Tensor],
    ) -> NnResult<Vec<VariableUpdate>> {
        check_gradients(self.name(), trainable, gradients)?;
        let mut updates = Vec::with_capacity(trainable.len() * 4);
        for (id, grad) in trainable.iter().zip(gradients) {
            let rms_id = slot_id(id, RMS)?;
            let mom_id = slot_id(id, MOMENTUM)?;

            let ms = graph.value(&rms_id)? * self.decay + grad.square() * (1.0 - self.decay);
            let denominator = if self.centered {
                let mg_id = slot_id(id, MEAN_GRADIENT)?;
                let mg = graph.value(&mg_id)? * self.decay + grad * (1.0 - self.decay);
                let denominator = (&ms - mg.square() + self.epsilon).sqrt();
                updates.push(VariableUpdate::new(mg_id, mg));
                denominator
            } else {
                (&ms + self.epsilon).sqrt()
            };
            let mom = graph.value(&mom_id)? * self.momentum + grad / &denominator * self.learning_rate;
            let value = graph.value(id)? - &mom;

            updates.push(VariableUpdate::new(id.clone(), value));
            updates.push(VariableUpdate::new(rms_id, ms));
            updates.push(VariableUpdate::new(mom_id, mom));
        }
        Ok(updates)
    }
}
