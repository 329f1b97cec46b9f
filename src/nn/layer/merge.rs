/*
 * @Author       : 老董
 * @Date         : 2026-01-30
 * @Description  : 合并层（只用于函数式模型）
 *
 * - Add：逐元素相加，所有输入形状须相同
 * - Concatenate：沿某一特征维拼接，其余维度须相同；不允许沿batch维拼接
 */

use serde::{Deserialize, Serialize};

use super::{LayerOps, LayerTrace};
use crate::nn::graph::{Gradients, Graph};
use crate::nn::{NnError, NnResult, ShapeSpec};
use crate::tensor::Tensor;

fn at_least_two<T>(type_name: &str, inputs: &[T]) -> NnResult<()> {
    if inputs.len() < 2 {
        return Err(NnError::Configuration(format!(
            "{type_name}层至少需要2个输入，实际为{}个",
            inputs.len()
        )));
    }
    Ok(())
}

// ==================== Add ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Add;

impl LayerOps for Add {
    fn type_name(&self) -> &'static str {
        "Add"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        at_least_two(self.type_name(), inputs)?;
        let first = &inputs[0];
        if let Some(other) = inputs.iter().find(|s| s.tail() != first.tail() || s.rank() != first.rank()) {
            return Err(NnError::Shape {
                expected: first.to_string(),
                actual: other.to_string(),
                message: "Add层的所有输入形状必须相同".to_string(),
            });
        }
        Ok(first.clone())
    }

    fn forward(
        &self,
        _layer: &str,
        _graph: &mut Graph,
        inputs: &[&Tensor],
        _training: bool,
    ) -> NnResult<LayerTrace> {
        at_least_two(self.type_name(), inputs)?;
        let mut sum = inputs[0].clone();
        for input in &inputs[1..] {
            sum += *input;
        }
        Ok(LayerTrace::new(sum))
    }

    fn backward(
        &self,
        _layer: &str,
        _graph: &Graph,
        inputs: &[&Tensor],
        _trace: &LayerTrace,
        grad: &Tensor,
        _grads: &mut Gradients,
    ) -> NnResult<Vec<Tensor>> {
        Ok(vec![grad.clone(); inputs.len()])
    }
}

// ==================== Concatenate ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concatenate {
    /// 负数表示从后往前数，默认-1（最后一维）
    axis: isize,
}

impl Default for Concatenate {
    fn default() -> Self {
        Self { axis: -1 }
    }
}

impl Concatenate {
    pub fn new(axis: isize) -> Self {
        Self { axis }
    }

    /// 把`axis`换算成非负下标，并检查不是batch维
    fn resolve_axis(&self, rank: usize) -> NnResult<usize> {
        let axis = if self.axis < 0 {
            rank as isize + self.axis
        } else {
            self.axis
        };
        if axis <= 0 || axis >= rank as isize {
            return Err(NnError::Configuration(format!(
                "Concatenate层的axis={}对{rank}阶输入无效（不能沿batch维拼接）",
                self.axis
            )));
        }
        Ok(axis as usize)
    }
}

impl LayerOps for Concatenate {
    fn type_name(&self) -> &'static str {
        "Concatenate"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        at_least_two(self.type_name(), inputs)?;
        let first = &inputs[0];
        let axis = self.resolve_axis(first.rank())?;

        let mut total = 0;
        for input in inputs {
            let compatible = input.rank() == first.rank()
                && (1..first.rank()).all(|d| d == axis || input.dim(d) == first.dim(d));
            if !compatible {
                return Err(NnError::Shape {
                    expected: first.to_string(),
                    actual: input.to_string(),
                    message: format!("Concatenate层的输入除第{axis}维外形状必须相同"),
                });
            }
            total += input.dim(axis).unwrap_or(0);
        }
        Ok(first.with_dim(axis, Some(total)))
    }

    fn forward(
        &self,
        _layer: &str,
        _graph: &mut Graph,
        inputs: &[&Tensor],
        _training: bool,
    ) -> NnResult<LayerTrace> {
        at_least_two(self.type_name(), inputs)?;
        let axis = self.resolve_axis(inputs[0].dimension())?;
        Ok(LayerTrace::new(Tensor::concat(inputs, axis)?))
    }

    fn backward(
        &self,
        _layer: &str,
        _graph: &Graph,
        inputs: &[&Tensor],
        _trace: &LayerTrace,
        grad: &Tensor,
        _grads: &mut Gradients,
    ) -> NnResult<Vec<Tensor>> {
        let axis = self.resolve_axis(grad.dimension())?;
        let sizes = inputs.iter().map(|t| t.shape()[axis]).collect::<Vec<_>>();
        Ok(grad.split(axis, &sizes)?)
    }
}
