/*
 * @Author       : 老董
 * @Date         : 2026-01-29
 * @Description  : MaxPool2D / AvgPool2D / GlobalAvgPool2D (2D 池化) 层
 *
 * - 输入格式：[batch_size, H, W, channels]
 * - 输出格式：[batch_size, H', W', channels]；GlobalAvgPool2D为[batch_size, channels]
 * - 无可学习参数
 *
 * Same 填充时，填充区不参与取最大值，也不计入平均值的分母。
 */

use ndarray::{Array4, Axis};
use serde::{Deserialize, Serialize};

use super::conv2d::{Conv2dGeometry, nhwc};
use super::{LayerOps, LayerTrace, Padding, ensure_positive, rank_error, single};
use crate::nn::graph::{Gradients, Graph};
use crate::nn::{NnResult, ShapeSpec};
use crate::tensor::Tensor;

/// 池化窗口的超参数，最大池化与平均池化共用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct PoolWindow {
    pool_size: (usize, usize),
    strides: (usize, usize),
    padding: Padding,
}

impl PoolWindow {
    /// 步长默认等于窗口大小
    fn new(pool_size: (usize, usize)) -> Self {
        Self {
            pool_size,
            strides: pool_size,
            padding: Padding::Valid,
        }
    }

    fn output_shape(&self, type_name: &str, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        let input = single(type_name, inputs)?;
        let geometry =
            Conv2dGeometry::from_shape(input, type_name, self.pool_size, self.strides, self.padding)?;
        let shape = input
            .with_dim(1, Some(geometry.out_h))
            .with_dim(2, Some(geometry.out_w));
        ensure_positive(type_name, shape)
    }

    fn geometry(&self, in_h: usize, in_w: usize) -> NnResult<Conv2dGeometry> {
        Conv2dGeometry::new(in_h, in_w, self.pool_size, self.strides, self.padding)
    }
}

// ==================== MaxPool2D ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxPool2D {
    window: PoolWindow,
}

impl MaxPool2D {
    pub fn new(pool_size: (usize, usize)) -> Self {
        Self {
            window: PoolWindow::new(pool_size),
        }
    }

    pub fn with_strides(mut self, strides: (usize, usize)) -> Self {
        self.window.strides = strides;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.window.padding = padding;
        self
    }

    /// 窗口内最大值的位置；并列时取靠前者
    fn argmax_in_window(
        x: &ndarray::ArrayView4<f32>,
        geometry: &Conv2dGeometry,
        (b, oh, ow, c): (usize, usize, usize, usize),
    ) -> Option<(usize, usize)> {
        let mut best: Option<((usize, usize), f32)> = None;
        for (h, w) in geometry.window(oh, ow) {
            let value = x[[b, h, w, c]];
            if best.is_none_or(|(_, v)| value > v) {
                best = Some(((h, w), value));
            }
        }
        best.map(|(position, _)| position)
    }
}

impl Default for MaxPool2D {
    fn default() -> Self {
        Self::new((2, 2))
    }
}

impl LayerOps for MaxPool2D {
    fn type_name(&self) -> &'static str {
        "MaxPool2D"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        self.window.output_shape(self.type_name(), inputs)
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
        let geometry = self.window.geometry(in_h, in_w)?;
        let output = Array4::from_shape_fn(
            (batch, geometry.out_h, geometry.out_w, channels),
            |(b, oh, ow, c)| {
                Self::argmax_in_window(&x, &geometry, (b, oh, ow, c))
                    .map_or(0.0, |(h, w)| x[[b, h, w, c]])
            },
        );
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
        let grad = nhwc(grad)?;
        let (batch, in_h, in_w, channels) = x.dim();
        let geometry = self.window.geometry(in_h, in_w)?;

        // 梯度只流向每个窗口的最大值位置
        let mut dx = Array4::<f32>::zeros((batch, in_h, in_w, channels));
        for ((b, oh, ow, c), g) in grad.indexed_iter() {
            if let Some((h, w)) = Self::argmax_in_window(&x, &geometry, (b, oh, ow, c)) {
                dx[[b, h, w, c]] += *g;
            }
        }
        Ok(vec![Tensor::from_array(dx.into_dyn())])
    }
}

// ==================== AvgPool2D ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvgPool2D {
    window: PoolWindow,
}

impl AvgPool2D {
    pub fn new(pool_size: (usize, usize)) -> Self {
        Self {
            window: PoolWindow::new(pool_size),
        }
    }

    pub fn with_strides(mut self, strides: (usize, usize)) -> Self {
        self.window.strides = strides;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.window.padding = padding;
        self
    }
}

impl Default for AvgPool2D {
    fn default() -> Self {
        Self::new((2, 2))
    }
}

impl LayerOps for AvgPool2D {
    fn type_name(&self) -> &'static str {
        "AvgPool2D"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        self.window.output_shape(self.type_name(), inputs)
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
        let geometry = self.window.geometry(in_h, in_w)?;
        let output = Array4::from_shape_fn(
            (batch, geometry.out_h, geometry.out_w, channels),
            |(b, oh, ow, c)| {
                let (sum, count) = geometry
                    .window(oh, ow)
                    .fold((0.0, 0usize), |(s, n), (h, w)| (s + x[[b, h, w, c]], n + 1));
                if count == 0 { 0.0 } else { sum / count as f32 }
            },
        );
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
        let grad = nhwc(grad)?;
        let (batch, in_h, in_w, channels) = x.dim();
        let geometry = self.window.geometry(in_h, in_w)?;

        let mut dx = Array4::<f32>::zeros((batch, in_h, in_w, channels));
        for ((b, oh, ow, c), g) in grad.indexed_iter() {
            let count = geometry.window(oh, ow).count();
            if count == 0 {
                continue;
            }
            let share = *g / count as f32;
            for (h, w) in geometry.window(oh, ow) {
                dx[[b, h, w, c]] += share;
            }
        }
        Ok(vec![Tensor::from_array(dx.into_dyn())])
    }
}

// ==================== GlobalAvgPool2D ====================

/// 对每个通道在整个H×W平面上求平均：[batch, H, W, C] -> [batch, C]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GlobalAvgPool2D;

impl LayerOps for GlobalAvgPool2D {
    fn type_name(&self) -> &'static str {
        "GlobalAvgPool2D"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        let input = single(self.type_name(), inputs)?;
        if input.rank() != 4 {
            return Err(rank_error(self.type_name(), 4, input));
        }
        ensure_positive(self.type_name(), ShapeSpec::new(&[input.dim(0), input.dim(3)]))
    }

    fn forward(
        &self,
        _layer: &str,
        _graph: &mut Graph,
        inputs: &[&Tensor],
        _training: bool,
    ) -> NnResult<LayerTrace> {
        let x = nhwc(single(self.type_name(), inputs)?)?;
        let (_, in_h, in_w, _) = x.dim();
        let area = (in_h * in_w).max(1) as f32;
        let output = x.sum_axis(Axis(1)).sum_axis(Axis(1)) / area;
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
        let (batch, in_h, in_w, channels) = x.dim();
        let area = (in_h * in_w).max(1) as f32;
        let grad = grad.reshape(&[batch, channels])?;
        let grad = grad.view();

        // 每个位置分得该通道梯度的1/(H*W)
        let dx = Array4::from_shape_fn((batch, in_h, in_w, channels), |(b, _, _, c)| {
            grad[[b, c]] / area
        });
        Ok(vec![Tensor::from_array(dx.into_dyn())])
    }
}
