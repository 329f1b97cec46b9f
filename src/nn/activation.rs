/*
 * @Author       : 老董
 * @Date         : 2026-01-17
 * @Description  : 激活函数（前向与对应的反向）
 */

use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::nn::NnResult;
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    /// 沿最后一维
    Softmax,
    Elu,
}

fn sigmoid<F: Float>(x: F) -> F {
    F::one() / (F::one() + (-x).exp())
}

fn elu<F: Float>(x: F) -> F {
    if x > F::zero() { x } else { x.exp() - F::one() }
}

impl Activation {
    pub fn apply(&self, x: &Tensor) -> Tensor {
        match self {
            Self::Linear => x.clone(),
            Self::Relu => x.map(|v| v.max(0.0)),
            Self::Sigmoid => x.map(sigmoid),
            Self::Tanh => x.map(f32::tanh),
            Self::Softmax => x.softmax_last_axis(),
            Self::Elu => x.map(elu),
        }
    }

    /// 已知激活前`pre`、激活后`out`与输出梯度`grad`，求激活前的梯度
    pub fn backward(&self, pre: &Tensor, out: &Tensor, grad: &Tensor) -> NnResult<Tensor> {
        let local = match self {
            Self::Linear => return Ok(grad.clone()),
            Self::Relu => pre.map(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Self::Sigmoid => out.map(|s| s * (1.0 - s)),
            Self::Tanh => out.map(|t| 1.0 - t * t),
            Self::Elu => pre.map(|v| if v > 0.0 { 1.0 } else { v.exp() }),
            Self::Softmax => {
                // dx = y * (g - Σ(g * y))
                let last_axis = out.dimension().saturating_sub(1);
                let weighted = (grad * out).sum_axis_keepdims(last_axis);
                return Ok(out * &(grad - &weighted));
            }
        };
        Ok(local.zip_map(grad, |l, g| l * g)?)
    }
}
