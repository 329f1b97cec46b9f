/*
 * @Author       : 老董
 * @Date         : 2026-02-05
 * @Description  : 训练历史与评估结果
 */

use serde::{Deserialize, Serialize};

use crate::nn::Metric;

/// 按`metric`取出指标值
pub fn metric_value(values: &[(Metric, f32)], metric: Metric) -> Option<f32> {
    values.iter().find(|(m, _)| *m == metric).map(|(_, v)| *v)
}

/// 一个训练批次结束时的统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTrainingEvent {
    /// 从1开始计数
    pub epoch: usize,
    /// 从0开始计数
    pub batch: usize,
    pub loss: f32,
    pub metrics: Vec<(Metric, f32)>,
}

impl BatchTrainingEvent {
    pub fn metric(&self, metric: Metric) -> Option<f32> {
        metric_value(&self.metrics, metric)
    }
}

/// 一轮训练结束时的统计：各批次的不加权平均，以及可选的验证结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochTrainingEvent {
    pub epoch: usize,
    pub loss: f32,
    pub metrics: Vec<(Metric, f32)>,
    pub val_loss: Option<f32>,
    pub val_metrics: Option<Vec<(Metric, f32)>>,
}

impl EpochTrainingEvent {
    pub fn metric(&self, metric: Metric) -> Option<f32> {
        metric_value(&self.metrics, metric)
    }

    pub fn val_metric(&self, metric: Metric) -> Option<f32> {
        self.val_metrics
            .as_deref()
            .and_then(|values| metric_value(values, metric))
    }
}

/// `fit`的返回值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    batch_history: Vec<BatchTrainingEvent>,
    epoch_history: Vec<EpochTrainingEvent>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_batch(&mut self, event: BatchTrainingEvent) {
        self.batch_history.push(event);
    }

    pub fn append_epoch(&mut self, event: EpochTrainingEvent) {
        self.epoch_history.push(event);
    }

    pub fn batch_history(&self) -> &[BatchTrainingEvent] {
        &self.batch_history
    }

    pub fn epoch_history(&self) -> &[EpochTrainingEvent] {
        &self.epoch_history
    }

    /// 第`epoch`轮（从1开始）的统计
    pub fn epoch(&self, epoch: usize) -> Option<&EpochTrainingEvent> {
        self.epoch_history.iter().find(|e| e.epoch == epoch)
    }

    pub fn last_epoch(&self) -> Option<&EpochTrainingEvent> {
        self.epoch_history.last()
    }

    /// 实际完成的轮数（提前停止时小于请求的轮数）
    pub fn epochs_run(&self) -> usize {
        self.epoch_history.len()
    }
}

/// `evaluate`的返回值：各批次的不加权平均
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub loss: f32,
    pub metrics: Vec<(Metric, f32)>,
}

impl EvaluationResult {
    pub fn metric(&self, metric: Metric) -> Option<f32> {
        metric_value(&self.metrics, metric)
    }
}
