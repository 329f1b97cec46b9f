/*
 * @Author       : 老董
 * @Date         : 2026-02-05
 * @Description  : 训练回调
 *
 * 回调在训练开始/结束、每轮开始/结束、每批开始/结束时被调用；
 * `on_epoch_end`与`on_train_batch_end`可以返回`TrainingControl::Stop`来终止训练。
 */

use std::fmt;

use super::history::{BatchTrainingEvent, EpochTrainingEvent, TrainingHistory, metric_value};
use crate::nn::{Metric, NnError, NnResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingControl {
    Continue,
    Stop,
}

/// 训练回调。所有方法都有空的默认实现
pub trait Callback: fmt::Debug {
    fn on_train_begin(&mut self) {}

    fn on_epoch_begin(&mut self, _epoch: usize) {}

    fn on_train_batch_begin(&mut self, _epoch: usize, _batch: usize) {}

    fn on_train_batch_end(&mut self, _event: &BatchTrainingEvent) -> TrainingControl {
        TrainingControl::Continue
    }

    fn on_epoch_end(
        &mut self,
        _event: &EpochTrainingEvent,
        _history: &TrainingHistory,
    ) -> TrainingControl {
        TrainingControl::Continue
    }

    fn on_train_end(&mut self, _history: &TrainingHistory) {}
}

/// 提前停止所监控的量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Monitor {
    Loss,
    Metric(Metric),
    ValidationLoss,
    ValidationMetric(Metric),
}

impl Monitor {
    fn value(&self, event: &EpochTrainingEvent) -> Option<f32> {
        match self {
            Self::Loss => Some(event.loss),
            Self::Metric(metric) => metric_value(&event.metrics, *metric),
            Self::ValidationLoss => event.val_loss,
            Self::ValidationMetric(metric) => event.val_metric(*metric),
        }
    }

    /// `Auto`模式下是否以“越大越好”判断
    fn prefers_larger(&self) -> bool {
        matches!(
            self,
            Self::Metric(Metric::Accuracy) | Self::ValidationMetric(Metric::Accuracy)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EarlyStoppingMode {
    /// 准确率越大越好，损失与误差类指标越小越好
    #[default]
    Auto,
    Min,
    Max,
}

/// 当监控量在`patience`轮内没有改善（改善量不足`min_delta`）时停止训练
///
/// ```
/// use only_keras::nn::model::{EarlyStopping, EarlyStoppingMode, Monitor};
///
/// let early_stopping = EarlyStopping::new(Monitor::ValidationLoss, 1e-3, 2, EarlyStoppingMode::Auto, None).unwrap();
/// assert_eq!(early_stopping.stopped_epoch(), None);
/// ```
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    monitor: Monitor,
    min_delta: f32,
    patience: usize,
    mode: EarlyStoppingMode,
    baseline: Option<f32>,
    wait: usize,
    best: f32,
    stopped_epoch: Option<usize>,
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self {
            monitor: Monitor::ValidationLoss,
            min_delta: 0.0,
            patience: 0,
            mode: EarlyStoppingMode::Auto,
            baseline: None,
            wait: 0,
            best: f32::INFINITY,
            stopped_epoch: None,
        }
    }
}

impl EarlyStopping {
    /// `baseline`给定时，监控量必须优于它才算改善
    pub fn new(
        monitor: Monitor,
        min_delta: f32,
        patience: usize,
        mode: EarlyStoppingMode,
        baseline: Option<f32>,
    ) -> NnResult<Self> {
        if min_delta.is_nan() || min_delta < 0.0 {
            return Err(NnError::Configuration(format!(
                "EarlyStopping的min_delta必须非负，实际为{min_delta}"
            )));
        }
        let mut early_stopping = Self {
            monitor,
            min_delta,
            patience,
            mode,
            baseline,
            ..Self::default()
        };
        early_stopping.reset();
        Ok(early_stopping)
    }

    pub fn monitor(&self) -> Monitor {
        self.monitor
    }

    /// 触发停止的轮次；未触发时为None
    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    pub fn best(&self) -> f32 {
        self.best
    }

    fn maximize(&self) -> bool {
        match self.mode {
            EarlyStoppingMode::Min => false,
            EarlyStoppingMode::Max => true,
            EarlyStoppingMode::Auto => self.monitor.prefers_larger(),
        }
    }

    fn improved(&self, current: f32) -> bool {
        if self.maximize() {
            current - self.min_delta > self.best
        } else {
            current + self.min_delta < self.best
        }
    }

    fn reset(&mut self) {
        self.wait = 0;
        self.stopped_epoch = None;
        self.best = match (self.baseline, self.maximize()) {
            (Some(baseline), _) => baseline,
            (None, true) => f32::NEG_INFINITY,
            (None, false) => f32::INFINITY,
        };
    }
}

impl Callback for EarlyStopping {
    fn on_train_begin(&mut self) {
        self.reset();
    }

    fn on_epoch_end(
        &mut self,
        event: &EpochTrainingEvent,
        _history: &TrainingHistory,
    ) -> TrainingControl {
        let Some(current) = self.monitor.value(event) else {
            log::warn!("EarlyStopping监控的{:?}在第{}轮不可用，跳过", self.monitor, event.epoch);
            return TrainingControl::Continue;
        };

        if self.improved(current) {
            self.best = current;
            self.wait = 0;
            return TrainingControl::Continue;
        }

        self.wait += 1;
        if self.wait > self.patience {
            self.stopped_epoch = Some(event.epoch);
            log::info!(
                "第{}轮触发提前停止：{:?}已连续{}轮没有改善（最佳值{}）",
                event.epoch,
                self.monitor,
                self.wait,
                self.best
            );
            TrainingControl::Stop
        } else {
            TrainingControl::Continue
        }
    }
}
