/*
 * @Author       : 老董
 * @Date         : 2025-01-21
 * @Description  : 损失函数：给出批次损失值以及它对模型输出的梯度
 *
 * 所有损失都按元素（交叉熵按样本）取平均。
 */

use serde::{Deserialize, Serialize};

use crate::nn::{NnError, NnResult};
use crate::tensor::Tensor;

const EPSILON: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Loss {
    /// 输出为logits，内置softmax；预测时会对输出做softmax
    SoftmaxCrossEntropyWithLogits,
    /// 输出为概率（如sigmoid之后）
    BinaryCrossEntropy,
    MSE,
    MAE,
    /// delta = 1.0
    Huber,
}

impl Loss {
    /// 批次损失值及其对`y_pred`的梯度
    pub fn value_and_gradient(&self, y_pred: &Tensor, y_true: &Tensor) -> NnResult<(f32, Tensor)> {
        if !y_pred.is_same_shape(y_true) {
            return Err(NnError::Shape {
                expected: format!("{:?}", y_pred.shape()),
                actual: format!("{:?}", y_true.shape()),
                message: "标签形状与模型输出形状不一致".to_string(),
            });
        }
        let n = y_pred.size().max(1) as f32;
        let batch = y_pred.batch_size().max(1) as f32;

        let result = match self {
            Self::SoftmaxCrossEntropyWithLogits => {
                let probs = y_pred.softmax_last_axis();
                let log_probs = probs.map(|p| p.max(EPSILON).ln());
                let value = -(y_true * &log_probs).sum() / batch;
                let grad = (&probs - y_true) / batch;
                (value, grad)
            }
            Self::BinaryCrossEntropy => {
                let p = y_pred.map(|v| v.clamp(EPSILON, 1.0 - EPSILON));
                let terms = p.zip_map(y_true, |p, y| y * p.ln() + (1.0 - y) * (1.0 - p).ln())?;
                let grad = p.zip_map(y_true, |p, y| (p - y) / (p * (1.0 - p)))? / n;
                (-terms.mean(), grad)
            }
            Self::MSE => {
                let diff = y_pred - y_true;
                (diff.square().mean(), &diff * (2.0 / n))
            }
            Self::MAE => {
                let diff = y_pred - y_true;
                let grad = diff.map(|d| if d == 0.0 { 0.0 } else { d.signum() }) / n;
                (diff.abs().mean(), grad)
            }
            Self::Huber => {
                let diff = y_pred - y_true;
                let value = diff
                    .map(|d| {
                        if d.abs() <= 1.0 {
                            0.5 * d * d
                        } else {
                            d.abs() - 0.5
                        }
                    })
                    .mean();
                let grad = diff.map(|d| d.clamp(-1.0, 1.0)) / n;
                (value, grad)
            }
        };
        Ok(result)
    }

    /// 由模型原始输出得到预测值
    pub fn prediction(&self, output: &Tensor) -> Tensor {
        match self {
            Self::SoftmaxCrossEntropyWithLogits => output.softmax_last_axis(),
            _ => output.clone(),
        }
    }
}
