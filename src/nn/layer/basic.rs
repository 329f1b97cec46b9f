use serde::{Deserialize, Serialize};

use super::{LayerOps, LayerTrace, single};
use crate::nn::graph::{Gradients, Graph};
use crate::nn::{Activation, NnError, NnResult, ShapeSpec};
use crate::tensor::Tensor;

// ==================== Dropout ====================

/// 训练时以`rate`的概率把元素置零，并把保留的元素放大`1/(1-rate)`倍；推理时原样输出
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dropout {
    rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        Self { rate }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl LayerOps for Dropout {
    fn type_name(&self) -> &'static str {
        "Dropout"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        if !(0.0..1.0).contains(&self.rate) {
            return Err(NnError::Configuration(format!(
                "Dropout的rate须在[0, 1)内，实际为{}",
                self.rate
            )));
        }
        Ok(single(self.type_name(), inputs)?.clone())
    }

    fn forward(
        &self,
        _layer: &str,
        graph: &mut Graph,
        inputs: &[&Tensor],
        training: bool,
    ) -> NnResult<LayerTrace> {
        let x = single(self.type_name(), inputs)?;
        if !training || self.rate == 0.0 {
            return Ok(LayerTrace::new((*x).clone()));
        }
        let keep = 1.0 - self.rate;
        let mask = Tensor::bernoulli_with_rng(keep, x.shape(), graph.rng_mut()) / keep;
        let mut trace = LayerTrace::new(*x * &mask);
        trace.aux.push(mask);
        trace.training = true;
        Ok(trace)
    }

    fn backward(
        &self,
        _layer: &str,
        _graph: &Graph,
        _inputs: &[&Tensor],
        trace: &LayerTrace,
        grad: &Tensor,
        _grads: &mut Gradients,
    ) -> NnResult<Vec<Tensor>> {
        Ok(vec![match trace.aux.first() {
            Some(mask) => grad * mask,
            None => grad.clone(),
        }])
    }
}

// ==================== Activation ====================

/// 单独作为一层的激活函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivationLayer {
    activation: Activation,
}

impl ActivationLayer {
    pub fn new(activation: Activation) -> Self {
        Self { activation }
    }
}

impl LayerOps for ActivationLayer {
    fn type_name(&self) -> &'static str {
        "Activation"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        Ok(single(self.type_name(), inputs)?.clone())
    }

    fn forward(
        &self,
        _layer: &str,
        _graph: &mut Graph,
        inputs: &[&Tensor],
        _training: bool,
    ) -> NnResult<LayerTrace> {
        let x = single(self.type_name(), inputs)?;
        Ok(LayerTrace::new(self.activation.apply(x)))
    }

    fn backward(
        &self,
        _layer: &str,
        _graph: &Graph,
        inputs: &[&Tensor],
        trace: &LayerTrace,
        grad: &Tensor,
        _grads: &mut Gradients,
    ) -> NnResult<Vec<Tensor>> {
        let x = single(self.type_name(), inputs)?;
        Ok(vec![self.activation.backward(x, &trace.output, grad)?])
    }
}
