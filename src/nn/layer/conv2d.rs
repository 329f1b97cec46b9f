/*
 * @Author       : 老董
 * @Date         : 2026-01-29
 * @Description  : Conv2D (2D 卷积) 层
 *
 * 输入/输出形状（NHWC）：
 * - 输入：[batch_size, H, W, in_channels]
 * - 输出：[batch_size, H', W', filters]
 *
 * 输出尺寸计算：
 * - Valid：H' = (H - kernel_h) / stride_h + 1
 * - Same ：H' = ceil(H / stride_h)，不足部分在两侧补零（多出的一格补在下/右侧）
 *
 * 计算：先 im2col 展开成矩阵，再与 reshape 成 [kh*kw*C, filters] 的卷积核做矩阵乘法。
 * 变量：`{层名}_conv2d_kernel` [kh, kw, in_channels, filters]，`{层名}_conv2d_bias` [filters]
 */

use ndarray::{Array2, Array4, ArrayView2, ArrayView4, Ix2, Ix4};
use serde::{Deserialize, Serialize};

use super::{LayerOps, LayerTrace, ensure_positive, rank_error, single};
use crate::nn::graph::{Gradients, Graph, VariableId};
use crate::nn::init::{Init, Regularizer};
use crate::nn::{Activation, NnError, NnResult, ShapeSpec};
use crate::tensor::Tensor;

const KERNEL: &str = "conv2d_kernel";
const BIAS: &str = "conv2d_bias";

/// 卷积与池化的填充方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Padding {
    /// 补零使输出尺寸为 ceil(输入 / 步长)
    Same,
    /// 不补零
    Valid,
}

// ==================== 窗口几何 ====================

/// 一次二维滑窗运算（卷积或池化）在H、W两个方向上的几何关系
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Conv2dGeometry {
    pub in_h: usize,
    pub in_w: usize,
    pub kernel: (usize, usize),
    pub strides: (usize, usize),
    pub out_h: usize,
    pub out_w: usize,
    pad_top: usize,
    pad_left: usize,
}

impl Conv2dGeometry {
    pub fn new(
        in_h: usize,
        in_w: usize,
        kernel: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    ) -> NnResult<Self> {
        if kernel.0 == 0 || kernel.1 == 0 || strides.0 == 0 || strides.1 == 0 {
            return Err(NnError::Configuration(format!(
                "窗口大小{kernel:?}与步长{strides:?}都必须大于0"
            )));
        }
        let (out_h, pad_top) = axis_geometry(in_h, kernel.0, strides.0, padding)?;
        let (out_w, pad_left) = axis_geometry(in_w, kernel.1, strides.1, padding)?;
        Ok(Self {
            in_h,
            in_w,
            kernel,
            strides,
            out_h,
            out_w,
            pad_top,
            pad_left,
        })
    }

    /// 由4阶输入形状得到几何关系
    pub fn from_shape(
        input: &ShapeSpec,
        type_name: &str,
        kernel: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    ) -> NnResult<Self> {
        if input.rank() != 4 {
            return Err(rank_error(type_name, 4, input));
        }
        let tail = input.tail();
        Self::new(tail[0], tail[1], kernel, strides, padding)
    }

    /// 输出位置(oh, ow)的窗口中第(i, j)个元素对应的输入位置；落在填充区时为None
    pub fn input_position(&self, oh: usize, ow: usize, i: usize, j: usize) -> Option<(usize, usize)> {
        let h = (oh * self.strides.0 + i).checked_sub(self.pad_top)?;
        let w = (ow * self.strides.1 + j).checked_sub(self.pad_left)?;
        (h < self.in_h && w < self.in_w).then_some((h, w))
    }

    /// 输出位置(oh, ow)的窗口覆盖的所有有效输入位置
    pub fn window(&self, oh: usize, ow: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let (kh, kw) = self.kernel;
        (0..kh)
            .flat_map(move |i| (0..kw).map(move |j| (i, j)))
            .filter_map(move |(i, j)| self.input_position(oh, ow, i, j))
    }
}

/// 单个方向上的(输出长度, 前侧填充)
fn axis_geometry(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: Padding,
) -> NnResult<(usize, usize)> {
    match padding {
        Padding::Same if input > 0 => {
            let out = input.div_ceil(stride);
            let needed = ((out - 1) * stride + kernel).saturating_sub(input);
            Ok((out, needed / 2))
        }
        Padding::Valid if input >= kernel => Ok(((input - kernel) / stride + 1, 0)),
        _ => Err(NnError::Configuration(format!(
            "输入长度{input}不足以容纳大小为{kernel}的窗口（{padding:?}填充）"
        ))),
    }
}

pub(super) fn nhwc(x: &Tensor) -> NnResult<ArrayView4<'_, f32>> {
    x.view()
        .into_dimensionality::<Ix4>()
        .map_err(|_| NnError::Shape {
            expected: "[batch, H, W, C]".to_string(),
            actual: format!("{:?}", x.shape()),
            message: "卷积与池化层需要4阶的NHWC输入".to_string(),
        })
}

fn matrix(x: &Tensor) -> NnResult<ArrayView2<'_, f32>> {
    x.view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| NnError::Shape {
            expected: "2阶".to_string(),
            actual: format!("{:?}", x.shape()),
            message: "im2col矩阵必须是2阶的".to_string(),
        })
}

/// 把每个输出位置的感受野展开成一行，列顺序与卷积核[kh, kw, C]的展开顺序一致
fn im2col(x: &ArrayView4<f32>, geometry: &Conv2dGeometry) -> Array2<f32> {
    let (batch, channels) = (x.shape()[0], x.shape()[3]);
    let (kh, kw) = geometry.kernel;
    let mut cols = Array2::zeros((batch * geometry.out_h * geometry.out_w, kh * kw * channels));
    for b in 0..batch {
        for oh in 0..geometry.out_h {
            for ow in 0..geometry.out_w {
                let row = (b * geometry.out_h + oh) * geometry.out_w + ow;
                for i in 0..kh {
                    for j in 0..kw {
                        let Some((h, w)) = geometry.input_position(oh, ow, i, j) else {
                            continue;
                        };
                        for c in 0..channels {
                            cols[[row, (i * kw + j) * channels + c]] = x[[b, h, w, c]];
                        }
                    }
                }
            }
        }
    }
    cols
}

/// im2col的逆运算：把每行的梯度累加回各自的输入位置
fn col2im(
    cols: &ArrayView2<f32>,
    geometry: &Conv2dGeometry,
    batch: usize,
    channels: usize,
) -> Array4<f32> {
    let (kh, kw) = geometry.kernel;
    let mut image = Array4::zeros((batch, geometry.in_h, geometry.in_w, channels));
    for b in 0..batch {
        for oh in 0..geometry.out_h {
            for ow in 0..geometry.out_w {
                let row = (b * geometry.out_h + oh) * geometry.out_w + ow;
                for i in 0..kh {
                    for j in 0..kw {
                        let Some((h, w)) = geometry.input_position(oh, ow, i, j) else {
                            continue;
                        };
                        for c in 0..channels {
                            image[[b, h, w, c]] += cols[[row, (i * kw + j) * channels + c]];
                        }
                    }
                }
            }
        }
    }
    image
}

// ==================== Conv2D ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv2D {
    filters: usize,
    kernel_size: (usize, usize),
    strides: (usize, usize),
    padding: Padding,
    activation: Activation,
    kernel_initializer: Init,
    bias_initializer: Init,
    kernel_regularizer: Option<Regularizer>,
    bias_regularizer: Option<Regularizer>,
    use_bias: bool,
}

impl Conv2D {
    /// 默认：步长(1, 1)，Same填充，线性激活，GlorotUniform核，零偏置
    pub fn new(filters: usize, kernel_size: (usize, usize)) -> Self {
        Self {
            filters,
            kernel_size,
            strides: (1, 1),
            padding: Padding::Same,
            activation: Activation::Linear,
            kernel_initializer: Init::GlorotUniform,
            bias_initializer: Init::Zeros,
            kernel_regularizer: None,
            bias_regularizer: None,
            use_bias: true,
        }
    }

    pub fn with_strides(mut self, strides: (usize, usize)) -> Self {
        self.strides = strides;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_kernel_initializer(mut self, init: Init) -> Self {
        self.kernel_initializer = init;
        self
    }

    pub fn with_bias_initializer(mut self, init: Init) -> Self {
        self.bias_initializer = init;
        self
    }

    pub fn with_kernel_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.kernel_regularizer = Some(regularizer);
        self
    }

    pub fn with_bias_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.bias_regularizer = Some(regularizer);
        self
    }

    pub fn without_bias(mut self) -> Self {
        self.use_bias = false;
        self
    }

    pub fn filters(&self) -> usize {
        self.filters
    }

    fn geometry(&self, input: &ShapeSpec) -> NnResult<Conv2dGeometry> {
        Conv2dGeometry::from_shape(
            input,
            self.type_name(),
            self.kernel_size,
            self.strides,
            self.padding,
        )
    }

    fn kernel_matrix_shape(&self, channels: usize) -> [usize; 2] {
        [self.kernel_size.0 * self.kernel_size.1 * channels, self.filters]
    }
}

impl LayerOps for Conv2D {
    fn type_name(&self) -> &'static str {
        "Conv2D"
    }

    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec> {
        let input = single(self.type_name(), inputs)?;
        let geometry = self.geometry(input)?;
        if self.filters == 0 {
            return Err(NnError::Configuration(
                "Conv2D层的filters必须大于0".to_string(),
            ));
        }
        let shape = input
            .with_dim(1, Some(geometry.out_h))
            .with_dim(2, Some(geometry.out_w))
            .with_dim(3, Some(self.filters));
        ensure_positive(self.type_name(), shape)
    }

    fn allocate_variables(
        &self,
        graph: &mut Graph,
        layer: &str,
        inputs: &[ShapeSpec],
        trainable: bool,
    ) -> NnResult<Vec<VariableId>> {
        let input = single(self.type_name(), inputs)?;
        let channels = input.tail()[2];
        let (kh, kw) = self.kernel_size;
        let mut ids = vec![graph.add_layer_variable(
            layer,
            KERNEL,
            &[kh, kw, channels, self.filters],
            self.kernel_initializer.clone(),
            trainable,
            self.kernel_regularizer,
        )?];
        if self.use_bias {
            ids.push(graph.add_layer_variable(
                layer,
                BIAS,
                &[self.filters],
                self.bias_initializer.clone(),
                trainable,
                self.bias_regularizer,
            )?);
        }
        Ok(ids)
    }

    fn forward(
        &self,
        layer: &str,
        graph: &mut Graph,
        inputs: &[&Tensor],
        _training: bool,
    ) -> NnResult<LayerTrace> {
        let x = single(self.type_name(), inputs)?;
        let view = nhwc(x)?;
        let (batch, in_h, in_w, channels) = view.dim();
        let geometry = Conv2dGeometry::new(in_h, in_w, self.kernel_size, self.strides, self.padding)?;

        // 1. 展开输入
        let cols = Tensor::from_array(im2col(&view, &geometry).into_dyn());

        // 2. 与卷积核相乘并加偏置
        let kernel = graph
            .value(&VariableId::layer(layer, KERNEL))?
            .reshape(&self.kernel_matrix_shape(channels))?;
        let mut z = cols.mat_mul(&kernel)?;
        if self.use_bias {
            z += graph.value(&VariableId::layer(layer, BIAS))?;
        }
        let z = z.reshape(&[batch, geometry.out_h, geometry.out_w, self.filters])?;

        // 3. 激活
        let mut trace = LayerTrace::new(self.activation.apply(&z));
        trace.pre_activation = Some(z);
        trace.aux.push(cols);
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
        let (batch, in_h, in_w, channels) = nhwc(x)?.dim();
        let geometry = Conv2dGeometry::new(in_h, in_w, self.kernel_size, self.strides, self.padding)?;
        let cols = trace.aux.first().ok_or_else(|| {
            NnError::Configuration("Conv2D层的反向传播缺少前向记录".to_string())
        })?;

        let pre = trace.pre_activation.as_ref().unwrap_or(&trace.output);
        let dz = self
            .activation
            .backward(pre, &trace.output, grad)?
            .reshape(&[batch * geometry.out_h * geometry.out_w, self.filters])?;

        // 1. 变量的梯度
        let kernel_id = VariableId::layer(layer, KERNEL);
        let (kh, kw) = self.kernel_size;
        let d_kernel = cols
            .transpose()
            .mat_mul(&dz)?
            .reshape(&[kh, kw, channels, self.filters])?;
        grads.accumulate(&kernel_id, d_kernel);
        if self.use_bias {
            grads.accumulate(
                &VariableId::layer(layer, BIAS),
                dz.sum_to_shape(&[self.filters])?,
            );
        }

        // 2. 输入的梯度
        let kernel = graph
            .value(&kernel_id)?
            .reshape(&self.kernel_matrix_shape(channels))?;
        let d_cols = dz.mat_mul(&kernel.transpose())?;
        let dx = col2im(&matrix(&d_cols)?, &geometry, batch, channels);
        Ok(vec![Tensor::from_array(dx.into_dyn())])
    }
}
