/*
 * @Author       : 老董
 * @Date         : 2026-01-28
 * @Description  : Layer 模块：声明式的层描述
 *
 * 每种层都实现同一组能力（`LayerOps`）：
 * - 由输入形状推出输出形状（纯函数）
 * - 在 Graph 中为自己分配变量
 * - 前向计算，以及对应的反向传播
 *
 * 层本身只保存超参数，不保存变量的值；变量全部归 Graph 所有，
 * 层通过`层名 + 用途`在 Graph 中找到自己的变量。
 */

mod basic;
mod conv2d;
mod dense;
mod input;
mod merge;
mod normalization;
mod pooling;
mod reshaping;

pub use basic::{ActivationLayer, Dropout};
pub use conv2d::{Conv2D, Padding};
pub use dense::Dense;
pub use input::Input;
pub use merge::{Add, Concatenate};
pub use normalization::BatchNorm;
pub use pooling::{AvgPool2D, GlobalAvgPool2D, MaxPool2D};
pub use reshaping::{Flatten, Reshape, ZeroPadding2D};

use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

use crate::nn::graph::{Gradients, Graph, VariableId, VariableUpdate};
use crate::nn::{NnError, NnResult, ShapeSpec};
use crate::tensor::Tensor;

/// 一次前向计算留下的记录，供同一批次的反向传播使用
#[derive(Debug, Clone)]
pub struct LayerTrace {
    pub output: Tensor,
    /// 激活前的值（带激活函数的层才有）
    pub pre_activation: Option<Tensor>,
    /// 各层自定义的中间结果（如卷积的im2col矩阵、Dropout的掩码）
    pub aux: Vec<Tensor>,
    /// 本次前向是否按训练模式执行
    pub training: bool,
    /// 前向产生的状态更新（如BatchNorm的滑动统计量），与优化器的更新在同一次运行中写入
    pub state_updates: Vec<VariableUpdate>,
}

impl LayerTrace {
    pub fn new(output: Tensor) -> Self {
        Self {
            output,
            pre_activation: None,
            aux: Vec::new(),
            training: false,
            state_updates: Vec::new(),
        }
    }
}

#[enum_dispatch]
pub trait LayerOps {
    /// 层的类型名，同时用于生成默认层名（如`dense_1`）
    fn type_name(&self) -> &'static str;

    /// 由输入形状推出输出形状。幂等、无副作用
    fn compute_output_shape(&self, inputs: &[ShapeSpec]) -> NnResult<ShapeSpec>;

    /// 在`graph`中为名为`layer`的层分配变量，返回分配的变量（按分配顺序）
    ///
    /// 对同一个 Graph 调用两次会得到`NameCollision`
    fn allocate_variables(
        &self,
        _graph: &mut Graph,
        _layer: &str,
        _inputs: &[ShapeSpec],
        _trainable: bool,
    ) -> NnResult<Vec<VariableId>> {
        Ok(Vec::new())
    }

    /// 前向计算。`graph`可变是因为 Dropout 要取随机数；需要写回的状态放进`LayerTrace::state_updates`
    fn forward(
        &self,
        layer: &str,
        graph: &mut Graph,
        inputs: &[&Tensor],
        training: bool,
    ) -> NnResult<LayerTrace>;

    /// 反向传播：把本层变量的梯度累加进`grads`，返回对每个输入的梯度
    fn backward(
        &self,
        layer: &str,
        graph: &Graph,
        inputs: &[&Tensor],
        trace: &LayerTrace,
        grad: &Tensor,
        grads: &mut Gradients,
    ) -> NnResult<Vec<Tensor>>;
}

/// 所有层类型的闭集
#[enum_dispatch(LayerOps)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerKind {
    Input,
    Dense,
    Conv2D,
    MaxPool2D,
    AvgPool2D,
    GlobalAvgPool2D,
    ZeroPadding2D,
    Flatten,
    Reshape,
    BatchNorm,
    Dropout,
    ActivationLayer,
    Add,
    Concatenate,
}

/// 模型中的一层：层类型与超参数，加上层名、是否可训练、入边（函数式模型用）
///
/// ```
/// use only_keras::nn::layer::{Dense, Layer};
/// use only_keras::nn::Activation;
///
/// let layer = Layer::new(Dense::new(10).with_activation(Activation::Relu)).named("hidden");
/// assert_eq!(layer.name(), "hidden");
/// assert!(layer.is_trainable());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    name: String,
    trainable: bool,
    inbound: Vec<String>,
    kind: LayerKind,
}

impl Layer {
    /// 层名为空时，编译阶段会自动命名为`{类型名}_{序号}`
    pub fn new(kind: impl Into<LayerKind>) -> Self {
        Self {
            name: String::new(),
            trainable: true,
            inbound: Vec::new(),
            kind: kind.into(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// 指定输入来自哪些层（只对函数式模型有意义）
    pub fn with_inbound(mut self, inbound: &[&str]) -> Self {
        self.inbound = inbound.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn frozen(mut self) -> Self {
        self.trainable = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn is_trainable(&self) -> bool {
        self.trainable
    }

    pub fn set_trainable(&mut self, trainable: bool) {
        self.trainable = trainable;
    }

    pub fn inbound(&self) -> &[String] {
        &self.inbound
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }
}

// ========== 各层共用的校验 ==========

/// 取出唯一的输入；输入个数不为1时报配置错误
pub(crate) fn single<'a, T>(type_name: &str, inputs: &'a [T]) -> NnResult<&'a T> {
    match inputs {
        [only] => Ok(only),
        _ => Err(NnError::Configuration(format!(
            "{type_name}层只接受1个输入，实际为{}个",
            inputs.len()
        ))),
    }
}

/// 输入形状的阶数不对
pub(crate) fn rank_error(type_name: &str, expected_rank: usize, actual: &ShapeSpec) -> NnError {
    NnError::Shape {
        expected: format!("{expected_rank}阶"),
        actual: format!("{}阶{actual}", actual.rank()),
        message: format!("{type_name}层的输入阶数不兼容"),
    }
}

/// 层的输出形状除batch维外都须为正
pub(crate) fn ensure_positive(type_name: &str, shape: ShapeSpec) -> NnResult<ShapeSpec> {
    if shape.has_positive_tail() {
        Ok(shape)
    } else {
        Err(NnError::Configuration(format!(
            "{type_name}层的输出形状{shape}含有非正的维度"
        )))
    }
}
