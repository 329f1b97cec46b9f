/*
 * ShapeSpec: 层与层之间传递的形状描述
 *
 * 类似 Keras 的 (None, 28, 28, 1) 设计：第一维（batch）可以未知，其余维度固定。
 * 一旦赋给已编译的层就不再修改；替换某一维总是返回新实例。
 *
 * # 示例
 * ```
 * use only_keras::nn::ShapeSpec;
 *
 * let shape = ShapeSpec::with_dynamic_batch(&[28, 28, 1]);
 * assert_eq!(shape.to_string(), "[?, 28, 28, 1]");
 * assert_eq!(shape.tail(), vec![28, 28, 1]);
 * ```
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// 维度值：Some(n) 表示固定值 n，None 表示未知（仅允许出现在 batch 维）
pub type Dim = Option<usize>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeSpec {
    dims: Vec<Dim>,
}

impl ShapeSpec {
    pub fn new(dims: &[Dim]) -> Self {
        Self {
            dims: dims.to_vec(),
        }
    }

    /// 所有维度都确定
    pub fn fixed(dims: &[usize]) -> Self {
        Self {
            dims: dims.iter().map(|&d| Some(d)).collect(),
        }
    }

    /// 第一维未知，其余维度固定
    ///
    /// ```
    /// use only_keras::nn::ShapeSpec;
    ///
    /// let shape = ShapeSpec::with_dynamic_batch(&[128]);
    /// assert_eq!(shape.rank(), 2);
    /// assert_eq!(shape.dim(0), None);
    /// ```
    pub fn with_dynamic_batch(feature_dims: &[usize]) -> Self {
        let mut dims = vec![None];
        dims.extend(feature_dims.iter().map(|&d| Some(d)));
        Self { dims }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    /// 获取指定维度的值，越界或未知时返回None
    pub fn dim(&self, index: usize) -> Dim {
        self.dims.get(index).copied().flatten()
    }

    /// 去掉batch维后的固定维度；未知维度记为0
    pub fn tail(&self) -> Vec<usize> {
        self.dims
            .iter()
            .skip(1)
            .map(|d| d.unwrap_or(0))
            .collect()
    }

    /// 最后一维的大小（如Dense输出的神经元数）
    pub fn last(&self) -> Dim {
        self.dims.last().copied().flatten()
    }

    /// 除batch维之外所有维度的乘积
    pub fn num_elements_per_sample(&self) -> usize {
        self.tail().iter().product()
    }

    /// 替换某一维，返回新形状
    pub fn with_dim(&self, index: usize, dim: Dim) -> Self {
        let mut dims = self.dims.clone();
        if index < dims.len() {
            dims[index] = dim;
        }
        Self { dims }
    }

    /// 将第一维设置为未知
    pub fn with_batch_dynamic(&self) -> Self {
        self.with_dim(0, None)
    }

    /// 拼接两个形状的维度列表
    pub fn concat(&self, other: &ShapeSpec) -> Self {
        let mut dims = self.dims.clone();
        dims.extend_from_slice(&other.dims);
        Self { dims }
    }

    /// 检查实际张量形状是否与本形状兼容：阶数一致，且每个已知维度都相等
    pub fn is_compatible_with_tensor(&self, tensor_shape: &[usize]) -> bool {
        self.dims.len() == tensor_shape.len()
            && self
                .dims
                .iter()
                .zip(tensor_shape)
                .all(|(d, &actual)| d.is_none_or(|expected| expected == actual))
    }

    /// batch维之外的维度是否都大于0
    pub fn has_positive_tail(&self) -> bool {
        self.dims.iter().skip(1).all(|d| d.is_some_and(|v| v > 0))
    }
}

impl fmt::Display for ShapeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .dims
            .iter()
            .map(|d| match d {
                Some(n) => n.to_string(),
                None => "?".to_string(),
            })
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

impl From<&[usize]> for ShapeSpec {
    fn from(shape: &[usize]) -> Self {
        Self::fixed(shape)
    }
}
