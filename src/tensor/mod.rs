/*
 * @Author       : 老董
 * @Date         : 2023-08-17 17:24:24
 * @Description  : 张量：基于ndarray的动态维度f32数组，是整个框架的数值计算引擎。
 *                 神经网络层、优化器只通过这里暴露的运算接触具体数值。
 */

use ndarray::{Array, ArrayD, IxDyn};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::TensorError;

mod ops;
mod property;

#[cfg(test)]
mod tests;

/// 定义张量的结构体。其可以是标量、向量、矩阵或更高维度的数组。
/// 注：只要通Tensor初始化的都是张量（即使标量也是张量）；
/// 而通常意义上的数字（类型为usize、i32、f64等）就只是纯数（number），在这里不被认为是张量。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: Array<f32, IxDyn>,
}

impl Tensor {
    /// 创建一个张量，若为标量，`shape`可以是[]、[1]、[1,1]...
    /// 若为向量，`shape`可以是[n]、[1,n]、[n,1]；
    /// 若为矩阵，`shape`可以是[n,m]；
    /// 若为更高维度的数组，`shape`可以是[c,n,m,...]；
    ///
    /// # Panics
    /// `data`的长度必须和`shape`中所有元素的乘积相等，否则panic。
    /// 若数据来自外部输入，请使用`try_new`。
    pub fn new(data: &[f32], shape: &[usize]) -> Tensor {
        match Self::try_new(data, shape) {
            Ok(tensor) => tensor,
            Err(e) => panic!("{e}"),
        }
    }

    /// 同`new`，但以`Result`返回形状错误
    pub fn try_new(data: &[f32], shape: &[usize]) -> Result<Tensor, TensorError> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(TensorError::DataLengthMismatch {
                data_len: data.len(),
                shape: shape.to_vec(),
                expected,
            });
        }
        let data = Array::from_shape_vec(IxDyn(shape), data.to_vec()).map_err(|_| {
            TensorError::DataLengthMismatch {
                data_len: expected,
                shape: shape.to_vec(),
                expected,
            }
        })?;
        Ok(Tensor { data })
    }

    /// 直接由ndarray数组创建
    pub fn from_array(data: ArrayD<f32>) -> Tensor {
        Tensor { data }
    }

    /// 创建形状为`[]`的标量张量
    pub fn scalar(value: f32) -> Tensor {
        Tensor {
            data: ArrayD::from_elem(IxDyn(&[]), value),
        }
    }

    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    pub fn ones(shape: &[usize]) -> Tensor {
        Self::full(1.0, shape)
    }

    /// 创建所有元素均为`value`的张量
    pub fn full(value: f32, shape: &[usize]) -> Tensor {
        Tensor {
            data: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    /// 创建与`other`同形状的全零张量
    pub fn zeros_like(other: &Tensor) -> Tensor {
        Self::zeros(other.shape())
    }

    /// 使用指定的RNG创建一个[min, max]闭区间内均匀分布的随机张量
    pub fn uniform_with_rng(min: f32, max: f32, shape: &[usize], rng: &mut StdRng) -> Tensor {
        let dist = Uniform::from(min..=max);
        let data = (0..shape.iter().product::<usize>())
            .map(|_| dist.sample(rng))
            .collect::<Vec<_>>();
        Tensor::new(&data, shape)
    }

    /// 使用指定的RNG创建一个服从正态分布的随机张量（Box-Muller变换）
    pub fn normal_with_rng(mean: f32, std_dev: f32, shape: &[usize], rng: &mut StdRng) -> Tensor {
        let data_len = shape.iter().product::<usize>();
        let mut data = Vec::with_capacity(data_len);

        while data.len() < data_len {
            let u1: f32 = rng.r#gen();
            let u2: f32 = rng.r#gen();
            let r = (-2.0 * u1.ln()).sqrt();
            let theta = 2.0 * std::f32::consts::PI * u2;
            let z0 = mean + std_dev * r * theta.cos();
            let z1 = mean + std_dev * r * theta.sin();

            if z0.is_finite() {
                data.push(z0);
            }
            if data.len() < data_len && z1.is_finite() {
                data.push(z1);
            }
        }

        Tensor::new(&data, shape)
    }

    /// 使用指定的RNG生成伯努利掩码：每个元素以`keep_prob`的概率为1，否则为0
    pub fn bernoulli_with_rng(keep_prob: f32, shape: &[usize], rng: &mut StdRng) -> Tensor {
        let data = (0..shape.iter().product::<usize>())
            .map(|_| if rng.r#gen::<f32>() < keep_prob { 1.0 } else { 0.0 })
            .collect::<Vec<_>>();
        Tensor::new(&data, shape)
    }
}
