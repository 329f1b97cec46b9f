use serde::{Deserialize, Serialize};
use std::fmt;

use crate::nn::{NnError, NnResult};
use crate::tensor::Tensor;

/// 评估指标（作用在预测值上，而非原始logits）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// 多列时比较argmax，单列时以0.5为阈值
    Accuracy,
    MSE,
    MAE,
}

impl Metric {
    pub fn compute(&self, y_pred: &Tensor, y_true: &Tensor) -> NnResult<f32> {
        if !y_pred.is_same_shape(y_true) {
            return Err(NnError::Shape {
                expected: format!("{:?}", y_pred.shape()),
                actual: format!("{:?}", y_true.shape()),
                message: format!("无法计算指标{self}"),
            });
        }
        let value = match self {
            Self::Accuracy => {
                let width = y_pred.shape().last().copied().unwrap_or(1);
                let rows = y_pred.batch_size().max(1);
                let correct = if width > 1 {
                    y_pred
                        .argmax_rows()
                        .iter()
                        .zip(y_true.argmax_rows())
                        .filter(|(p, t)| **p == *t)
                        .count()
                } else {
                    y_pred
                        .to_vec()
                        .iter()
                        .zip(y_true.to_vec())
                        .filter(|(p, t)| (**p >= 0.5) == (*t >= 0.5))
                        .count()
                };
                correct as f32 / rows as f32
            }
            Self::MSE => (y_pred - y_true).square().mean(),
            Self::MAE => (y_pred - y_true).abs().mean(),
        };
        Ok(value)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accuracy => "accuracy",
            Self::MSE => "mse",
            Self::MAE => "mae",
        };
        write!(f, "{name}")
    }
}
