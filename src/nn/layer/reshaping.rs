use ndarray::{Array4, s};
use serde::{Deserialize, Serialize};

use super::conv2d::nhwc;
use super::{LayerOps, LayerTrace, ensure_positive, rank_error, single};
use crate::nn::graph::{Gradients, Graph};
use crate::nn::{NnError, NnResult, ShapeSpec};
use crate::tensor::Tensor;

/// 把除batch维外的所有维度展平：[batch, d1, d2, ...] -> [batch, d1*d2*...]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flatten;

impl LayerOps for Flatten {
    fn type_name(&self) -> &'static str {
        "Flatten"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        let input = single(self.type_name(), inputs)?;
        let flattened = ShapeSpec::new(&[input.dim(0), Some(input.num_elements_per_sample())]);
        ensure_positive(self.type_name(), flattened)
    }

    fn forward(
        &self,
        _layer: &str,
        _graph: &mut Graph,
        inputs: &[&Tensor],
        _training: bool,
    ) -> NnResult<LayerTrace> {
        let x = single(self.type_name(), inputs)?;
        Ok(LayerTrace::new(x.flatten_batch()?))
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
        let x = single(self.type_name(), inputs)?;
        Ok(vec![grad.reshape(x.shape())?])
    }
}

/// 把单个样本重塑为`target_shape`（不含batch维），元素个数须不变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reshape {
    target_shape: Vec<usize>,
}

impl Reshape {
    pub fn new(target_shape: &[usize]) -> Self {
        Self {
            target_shape: target_shape.to_vec(),
        }
    }
}

impl LayerOps for Reshape {
    fn type_name(&self) -> &'static str {
        "Reshape"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        let input = single(self.type_name(), inputs)?;
        let target = self.target_shape.iter().product::<usize>();
        if self.target_shape.is_empty() || target != input.num_elements_per_sample() {
            return Err(NnError::Configuration(format!(
                "无法把形状{input}的样本重塑为{:?}",
                self.target_shape
            )));
        }
        let shape = ShapeSpec::new(&[input.dim(0)]).concat(&ShapeSpec::fixed(&self.target_shape));
        ensure_positive(self.type_name(), shape)
    }

    fn forward(
        &self,
        _layer: &str,
        _graph: &mut Graph,
        inputs: &[&Tensor],
        _training: bool,
    ) -> NnResult<LayerTrace> {
        let x = single(self.type_name(), inputs)?;
        let mut shape = vec![x.batch_size()];
        shape.extend_from_slice(&self.target_shape);
        Ok(LayerTrace::new(x.reshape(&shape)?))
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
        let x = single(self.type_name(), inputs)?;
        Ok(vec![grad.reshape(x.shape())?])
    }
}

/// 在NHWC图像的上、下、左、右补零
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroPadding2D {
    top: usize,
    bottom: usize,
    left: usize,
    right: usize,
}

impl ZeroPadding2D {
    /// 四边补同样多的零
    pub fn new(padding: usize) -> Self {
        Self::with_sides(padding, padding, padding, padding)
    }

    /// `(竖直, 水平)`：上下各补`vertical`行，左右各补`horizontal`列
    pub fn symmetric(vertical: usize, horizontal: usize) -> Self {
        Self::with_sides(vertical, vertical, horizontal, horizontal)
    }

    pub fn with_sides(top: usize, bottom: usize, left: usize, right: usize) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    /// (上, 下, 左, 右)
    pub fn padding(&self) -> (usize, usize, usize, usize) {
        (self.top, self.bottom, self.left, self.right)
    }
}

impl LayerOps for ZeroPadding2D {
    fn type_name(&self) -> &'static str {
        "ZeroPadding2D"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        let input = single(self.type_name(), inputs)?;
        if input.rank() != 4 {
            return Err(rank_error(self.type_name(), 4, input));
        }
        let shape = input
            .with_dim(1, input.dim(1).map(|h| h + self.top + self.bottom))
            .with_dim(2, input.dim(2).map(|w| w + self.left + self.right));
        ensure_positive(self.type_name(), shape)
    }

    fn forward(
        &self,
        _layer: &str,
        _graph: &mut Graph,
        inputs: &[&Tensor],
        _training: bool,
    ) -> NnResult<LayerTrace> {
        let x = nhwc(single(self.type_name(), inputs)?)?;
        let (batch, in_h, in_w, channels) = x.dim();
        let mut output = Array4::<f32>::zeros((
            batch,
            in_h + self.top + self.bottom,
            in_w + self.left + self.right,
            channels,
        ));
        output
            .slice_mut(s![.., self.top..self.top + in_h, self.left..self.left + in_w, ..])
            .assign(&x);
        Ok(LayerTrace::new(Tensor::from_array(output.into_dyn())))
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
        let x = nhwc(single(self.type_name(), inputs)?)?;
        let (_, in_h, in_w, _) = x.dim();
        // 补零处没有对应的输入，梯度直接丢弃
        let dx = nhwc(grad)?
            .slice(s![.., self.top..self.top + in_h, self.left..self.left + in_w, ..])
            .to_owned();
        Ok(vec![Tensor::from_array(dx.into_dyn())])
    }
}
