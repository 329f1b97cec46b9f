/*
 * @Author       : 老董
 * @Date         : 2026-01-08
 * @Description  : 变量初始化策略与正则化项
 */

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::nn::{NnError, NnResult};
use crate::tensor::Tensor;

// ==================== Init 枚举 ====================

/// 参数初始化策略
///
/// 卷积核形状约定为`[kernel_h, kernel_w, in_channels, filters]`，
/// 全连接核为`[in_features, units]`，据此计算fan_in/fan_out。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Init {
    /// 常数初始化
    Constant(f32),
    /// 全零
    Zeros,
    /// 全一
    Ones,
    /// 正态分布
    Normal { mean: f32, std: f32 },
    /// [min, max]均匀分布
    Uniform { min: f32, max: f32 },
    /// Kaiming/He 正态初始化（适用于 `ReLU`）
    HeNormal,
    /// Xavier/Glorot 正态初始化（适用于 Sigmoid/Tanh）
    GlorotNormal,
    /// Xavier/Glorot 均匀初始化（Dense/Conv2D的默认核初始化）
    GlorotUniform,
}

impl Init {
    /// 检查初始化器自身的参数：边界与常数须有限，`min <= max`，`std >= 0`
    pub fn validate(&self) -> NnResult<()> {
        let valid = match *self {
            Self::Constant(v) => v.is_finite(),
            Self::Normal { mean, std } => mean.is_finite() && std.is_finite() && std >= 0.0,
            Self::Uniform { min, max } => min.is_finite() && max.is_finite() && min <= max,
            Self::Zeros | Self::Ones | Self::HeNormal | Self::GlorotNormal | Self::GlorotUniform => {
                true
            }
        };
        if valid {
            Ok(())
        } else {
            Err(NnError::Configuration(format!("非法的初始化器参数：{self:?}")))
        }
    }

    /// 使用注册表的RNG生成初始值
    pub fn generate_with_rng(&self, shape: &[usize], rng: &mut StdRng) -> Tensor {
        match self {
            Self::Constant(v) => Tensor::full(*v, shape),
            Self::Zeros => Tensor::zeros(shape),
            Self::Ones => Tensor::ones(shape),
            Self::Normal { mean, std } => Tensor::normal_with_rng(*mean, *std, shape, rng),
            Self::Uniform { min, max } => Tensor::uniform_with_rng(*min, *max, shape, rng),
            Self::HeNormal => {
                let (fan_in, _) = fans(shape);
                let std = (2.0 / fan_in as f32).sqrt();
                Tensor::normal_with_rng(0.0, std, shape, rng)
            }
            Self::GlorotNormal => {
                let (fan_in, fan_out) = fans(shape);
                let std = (2.0 / (fan_in + fan_out) as f32).sqrt();
                Tensor::normal_with_rng(0.0, std, shape, rng)
            }
            Self::GlorotUniform => {
                let (fan_in, fan_out) = fans(shape);
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                Tensor::uniform_with_rng(-limit, limit, shape, rng)
            }
        }
    }
}

/// (fan_in, fan_out)；最后两维之前的维度视为感受野
fn fans(shape: &[usize]) -> (usize, usize) {
    match shape.len() {
        0 => (1, 1),
        1 => (shape[0].max(1), shape[0].max(1)),
        n => {
            let receptive_field = shape[..n - 2].iter().product::<usize>();
            (
                (shape[n - 2] * receptive_field).max(1),
                (shape[n - 1] * receptive_field).max(1),
            )
        }
    }
}

// ==================== 正则化 ====================

/// 作用在单个变量上的正则化项，其值加到训练损失上
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Regularizer {
    L1(f32),
    L2(f32),
    L1L2 { l1: f32, l2: f32 },
}

impl Regularizer {
    /// 正则化损失值
    pub fn loss(&self, value: &Tensor) -> f32 {
        match *self {
            Self::L1(l1) => l1 * value.abs().sum(),
            Self::L2(l2) => l2 * value.square().sum(),
            Self::L1L2 { l1, l2 } => l1 * value.abs().sum() + l2 * value.square().sum(),
        }
    }

    /// 正则化损失对变量的梯度
    pub fn gradient(&self, value: &Tensor) -> Tensor {
        let signs = value.map(sign);
        match *self {
            Self::L1(l1) => &signs * l1,
            Self::L2(l2) => value * (2.0 * l2),
            Self::L1L2 { l1, l2 } => &signs * l1 + value * (2.0 * l2),
        }
    }
}

/// 0处取0的符号函数（`f32::signum`在0处返回1）
fn sign(x: f32) -> f32 {
    if x == 0.0 { 0.0 } else { x.signum() }
}
