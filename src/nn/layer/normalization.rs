/*
 * @Author       : 老董
 * @Date         : 2026-01-30
 * @Description  : BatchNorm (批归一化) 层，沿最后一维（通道）归一化
 *
 * 训练模式：用当前批次的均值/方差归一化，并产出滑动统计量的更新
 *   moving = momentum * moving + (1 - momentum) * batch_stat
 * 推理模式（非训练，或层已冻结）：用滑动统计量归一化
 *
 * 变量：
 * - `{层名}_batch_norm_gamma`、`{层名}_batch_norm_beta`：可训练
 * - `{层名}_batch_norm_moving_mean`、`{层名}_batch_norm_moving_variance`：不可训练
 */

use serde::{Deserialize, Serialize};

use super::{LayerOps, LayerTrace, single};
use crate::nn::graph::{Gradients, Graph, VariableId, VariableUpdate};
use crate::nn::init::Init;
use crate::nn::{NnError, NnResult, ShapeSpec};
use crate::tensor::Tensor;

const GAMMA: &str = "batch_norm_gamma";
const BETA: &str = "batch_norm_beta";
const MOVING_MEAN: &str = "batch_norm_moving_mean";
const MOVING_VARIANCE: &str = "batch_norm_moving_variance";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNorm {
    momentum: f32,
    epsilon: f32,
    gamma_initializer: Init,
    beta_initializer: Init,
    moving_mean_initializer: Init,
    moving_variance_initializer: Init,
}

impl Default for BatchNorm {
    fn default() -> Self {
        Self {
            momentum: 0.99,
            epsilon: 1e-3,
            gamma_initializer: Init::Ones,
            beta_initializer: Init::Zeros,
            moving_mean_initializer: Init::Zeros,
            moving_variance_initializer: Init::Ones,
        }
    }
}

impl BatchNorm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_momentum(mut self, momentum: f32) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_gamma_initializer(mut self, init: Init) -> Self {
        self.gamma_initializer = init;
        self
    }

    pub fn with_beta_initializer(mut self, init: Init) -> Self {
        self.beta_initializer = init;
        self
    }

    /// 把输入视为[样本数, 通道数]的矩阵
    fn as_rows(x: &Tensor) -> NnResult<Tensor> {
        let channels = x.shape().last().copied().unwrap_or(1);
        Ok(x.reshape(&[x.size() / channels.max(1), channels])?)
    }
}

impl LayerOps for BatchNorm {
    fn type_name(&self) -> &'static str {
        "BatchNorm"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        let input = single(self.type_name(), inputs)?;
        if input.rank() < 2 {
            return Err(super::rank_error(self.type_name(), 2, input));
        }
        if !(0.0..1.0).contains(&self.momentum) || self.epsilon <= 0.0 {
            return Err(NnError::Configuration(format!(
                "BatchNorm层的momentum须在[0, 1)内且epsilon须大于0，实际为{}与{}",
                self.momentum, self.epsilon
            )));
        }
        Ok(input.clone())
    }

    fn allocate_variables(
        &self,
        graph: &mut Graph,
        layer: &str,
        inputs: &[ShapeSpec],
        trainable: bool,
    ) -> NnResult<Vec<VariableId>> {
        let input = single(self.type_name(), inputs)?;
        let channels = [input.last().unwrap_or(1)];
        Ok(vec![
            graph.add_layer_variable(layer, GAMMA, &channels, self.gamma_initializer.clone(), trainable, None)?,
            graph.add_layer_variable(layer, BETA, &channels, self.beta_initializer.clone(), trainable, None)?,
            graph.add_layer_variable(
                layer,
                MOVING_MEAN,
                &channels,
                self.moving_mean_initializer.clone(),
                false,
                None,
            )?,
            graph.add_layer_variable(
                layer,
                MOVING_VARIANCE,
                &channels,
                self.moving_variance_initializer.clone(),
                false,
                None,
            )?,
        ])
    }

    fn forward(
        &self,
        layer: &str,
        graph: &mut Graph,
        inputs: &[&Tensor],
        training: bool,
    ) -> NnResult<LayerTrace> {
        let x = single(self.type_name(), inputs)?;
        let rows = Self::as_rows(x)?;
        let use_batch_stats = training && !graph.is_layer_frozen(layer);

        let mean_id = VariableId::layer(layer, MOVING_MEAN);
        let variance_id = VariableId::layer(layer, MOVING_VARIANCE);
        let mut state_updates = Vec::new();
        let (mean, variance) = if use_batch_stats {
            let count = rows.batch_size().max(1) as f32;
            let channels = rows.shape()[1];
            let mean = rows.sum_to_shape(&[channels])? / count;
            let variance = (&rows - &mean).square().sum_to_shape(&[channels])? / count;

            // 滑动统计量随本批次的更新一起写回
            let m = self.momentum;
            let moving_mean = graph.value(&mean_id)? * m + &mean * (1.0 - m);
            let moving_variance = graph.value(&variance_id)? * m + &variance * (1.0 - m);
            state_updates.push(VariableUpdate::new(mean_id, moving_mean));
            state_updates.push(VariableUpdate::new(variance_id, moving_variance));
            (mean, variance)
        } else {
            (graph.value(&mean_id)?.clone(), graph.value(&variance_id)?.clone())
        };

        let inv_std = (variance + self.epsilon).sqrt().map(|s| 1.0 / s);
        let normalized = (&rows - &mean) * &inv_std;
        let gamma = graph.value(&VariableId::layer(layer, GAMMA))?;
        let beta = graph.value(&VariableId::layer(layer, BETA))?;
        let output = (&normalized * gamma + beta).reshape(x.shape())?;

        let mut trace = LayerTrace::new(output);
        trace.aux = vec![normalized, inv_std];
        trace.training = use_batch_stats;
        trace.state_updates = state_updates;
        Ok(trace)
    }

    fn backward(
        &self,
        layer: &str,
        graph: &Graph,
        inputs: &[&Tensor],
        trace: &LayerTrace,
        grad: &Tensor,
        grads: &mut Gradients,
    ) -> NnResult<Vec<Tensor>> {
        let x = single(self.type_name(), inputs)?;
        let [normalized, inv_std] = trace.aux.as_slice() else {
            return Err(NnError::Configuration(
                "BatchNorm层的反向传播缺少前向记录".to_string(),
            ));
        };
        let g = Self::as_rows(grad)?;
        let channels = [g.shape()[1]];

        grads.accumulate(
            &VariableId::layer(layer, GAMMA),
            (&g * normalized).sum_to_shape(&channels)?,
        );
        grads.accumulate(&VariableId::layer(layer, BETA), g.sum_to_shape(&channels)?);

        let gamma = graph.value(&VariableId::layer(layer, GAMMA))?;
        let d_normalized = &g * gamma;
        let dx = if trace.training {
            // dx = inv_std / N * (N * dxhat - Σdxhat - xhat * Σ(dxhat * xhat))
            let count = g.batch_size().max(1) as f32;
            let sum_d = d_normalized.sum_to_shape(&channels)?;
            let sum_dx_xhat = (&d_normalized * normalized).sum_to_shape(&channels)?;
            (&d_normalized * count - &sum_d - normalized * &sum_dx_xhat) * inv_std / count
        } else {
            &d_normalized * inv_std
        };
        Ok(vec![dx.reshape(x.shape())?])
    }
}
