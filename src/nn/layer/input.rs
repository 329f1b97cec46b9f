use serde::{Deserialize, Serialize};

use super::{LayerOps, LayerTrace, ensure_positive, single};
use crate::nn::graph::{Gradients, Graph};
use crate::nn::{NnError, NnResult, ShapeSpec};
use crate::tensor::Tensor;

/// 输入层：声明单个样本的形状，batch维在运行时确定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    shape: Vec<usize>,
}

impl Input {
    /// `shape`不含batch维，如MNIST为`[28, 28, 1]`
    pub fn new(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
}

impl LayerOps for Input {
    fn type_name(&self) -> &'static str {
        "Input"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        if !inputs.is_empty() {
            return Err(NnError::Configuration(
                "Input层不能有上游输入".to_string(),
            ));
        }
        if self.shape.is_empty() {
            return Err(NnError::Configuration(
                "Input层的样本形状不能为空".to_string(),
            ));
        }
        ensure_positive(self.type_name(), ShapeSpec::with_dynamic_batch(&self.shape))
    }

    fn forward(
        &self,
        _layer: &str,
        _graph: &mut Graph,
        inputs: &[&Tensor],
        _training: bool,
    ) -> NnResult<LayerTrace> {
        let x = single(self.type_name(), inputs)?;
        Ok(LayerTrace::new((*x).clone()))
    }

    fn backward(
        &self,
        _layer: &str,
        _graph: &Graph,
        _inputs: &[&Tensor],
        _trace: &LayerTrace,
        grad: &Tensor,
        _grads: &mut Gradients,
    ) -> NnResult<Vec<Tensor>> {
        Ok(vec![grad.clone()])
    }
}
