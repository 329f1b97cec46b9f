use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_abs_diff_eq;

use super::{classification_dataset, mlp};
use crate::nn::model::{
    BatchTrainingEvent, Callback, EarlyStopping, EarlyStoppingMode, EpochTrainingEvent, Monitor,
    TrainingControl, TrainingHistory,
};
use crate::nn::optimizer::SGD;
use crate::nn::{Loss, Metric, NnError};

fn epoch_event(epoch: usize, loss: f32, accuracy: f32, val_loss: Option<f32>) -> EpochTrainingEvent {
    EpochTrainingEvent {
        epoch,
        loss,
        metrics: vec![(Metric::Accuracy, accuracy)],
        val_loss,
        val_metrics: None,
    }
}

/// 依次喂入损失值，返回每轮的决定
fn drive(early_stopping: &mut EarlyStopping, losses: &[f32]) -> Vec<TrainingControl> {
    let history = TrainingHistory::new();
    early_stopping.on_train_begin();
    losses
        .iter()
        .enumerate()
        .map(|(i, &loss)| early_stopping.on_epoch_end(&epoch_event(i + 1, loss, 0.0, None), &history))
        .collect()
}

#[test]
fn test_early_stopping_patience() {
    let mut early_stopping =
        EarlyStopping::new(Monitor::Loss, 0.0, 2, EarlyStoppingMode::Auto, None).unwrap();
    let decisions = drive(&mut early_stopping, &[1.0, 0.8, 0.9, 0.85, 0.95]);
    use TrainingControl::{Continue, Stop};
    assert_eq!(decisions, vec![Continue, Continue, Continue, Continue, Stop]);
    assert_eq!(early_stopping.stopped_epoch(), Some(5));
    assert_abs_diff_eq!(early_stopping.best(), 0.8);
}

#[test]
fn test_early_stopping_min_delta() {
    // 每轮只改善0.01，不足min_delta=0.05
    let mut early_stopping =
        EarlyStopping::new(Monitor::Loss, 0.05, 0, EarlyStoppingMode::Min, None).unwrap();
    let decisions = drive(&mut early_stopping, &[1.0, 0.99]);
    assert_eq!(decisions[1], TrainingControl::Stop);
    assert_eq!(early_stopping.stopped_epoch(), Some(2));
}

#[test]
fn test_early_stopping_baseline_and_restart() {
    let mut early_stopping =
        EarlyStopping::new(Monitor::Loss, 0.0, 0, EarlyStoppingMode::Auto, Some(0.5)).unwrap();
    assert_eq!(drive(&mut early_stopping, &[0.6]), vec![TrainingControl::Stop]);

    // 重新开始训练时状态被重置
    assert_eq!(drive(&mut early_stopping, &[0.4]), vec![TrainingControl::Continue]);
    assert_eq!(early_stopping.stopped_epoch(), None);
}

#[test]
fn test_early_stopping_auto_mode_maximizes_accuracy() {
    let mut early_stopping = EarlyStopping::new(
        Monitor::Metric(Metric::Accuracy),
        0.0,
        0,
        EarlyStoppingMode::Auto,
        None,
    )
    .unwrap();
    let history = TrainingHistory::new();
    early_stopping.on_train_begin();
    assert_eq!(
        early_stopping.on_epoch_end(&epoch_event(1, 1.0, 0.5, None), &history),
        TrainingControl::Continue
    );
    assert_eq!(
        early_stopping.on_epoch_end(&epoch_event(2, 1.0, 0.7, None), &history),
        TrainingControl::Continue
    );
    assert_eq!(
        early_stopping.on_epoch_end(&epoch_event(3, 1.0, 0.6, None), &history),
        TrainingControl::Stop
    );
}

#[test]
fn test_early_stopping_missing_value_continues() {
    let mut early_stopping = EarlyStopping::default();
    assert_eq!(early_stopping.monitor(), Monitor::ValidationLoss);
    let decisions = drive(&mut early_stopping, &[1.0, 2.0, 3.0]);
    assert!(decisions.iter().all(|d| *d == TrainingControl::Continue));
}

#[test]
fn test_early_stopping_rejects_negative_min_delta() {
    assert!(matches!(
        EarlyStopping::new(Monitor::Loss, -0.1, 0, EarlyStoppingMode::Auto, None),
        Err(NnError::Configuration(_))
    ));
}

/// 记录被调用的钩子，并在指定批次后要求停止
#[derive(Debug)]
struct Recorder {
    log: Rc<RefCell<Vec<String>>>,
    stop_after_batch: Option<usize>,
}

impl Callback for Recorder {
    fn on_train_begin(&mut self) {
        self.log.borrow_mut().push("train_begin".to_string());
    }

    fn on_epoch_begin(&mut self, epoch: usize) {
        self.log.borrow_mut().push(format!("epoch_begin {epoch}"));
    }

    fn on_train_batch_end(&mut self, event: &BatchTrainingEvent) -> TrainingControl {
        self.log
            .borrow_mut()
            .push(format!("batch_end {} {}", event.epoch, event.batch));
        if self.stop_after_batch == Some(event.batch) {
            TrainingControl::Stop
        } else {
            TrainingControl::Continue
        }
    }

    fn on_epoch_end(&mut self, event: &EpochTrainingEvent, history: &TrainingHistory) -> TrainingControl {
        assert_eq!(history.epochs_run(), event.epoch);
        self.log.borrow_mut().push(format!("epoch_end {}", event.epoch));
        TrainingControl::Continue
    }

    fn on_train_end(&mut self, _history: &TrainingHistory) {
        self.log.borrow_mut().push("train_end".to_string());
    }
}

#[test]
fn test_callback_hooks_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut model = mlp(8, 3).with_seed(1);
    model
        .compile(SGD::default(), Loss::SoftmaxCrossEntropyWithLogits, &[])
        .unwrap();
    model.add_callback(Recorder {
        log: Rc::clone(&log),
        stop_after_batch: None,
    });

    let dataset = classification_dataset(6, 4, 3);
    model.fit(&dataset, 2, 4).unwrap();
    assert_eq!(
        *log.borrow(),
        vec![
            "train_begin",
            "epoch_begin 1",
            "batch_end 1 0",
            "batch_end 1 1",
            "epoch_end 1",
            "epoch_begin 2",
            "batch_end 2 0",
            "batch_end 2 1",
            "epoch_end 2",
            "train_end",
        ]
    );
}

#[test]
fn test_stop_after_batch() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut model = mlp(8, 3).with_seed(1);
    model
        .compile(SGD::default(), Loss::SoftmaxCrossEntropyWithLogits, &[])
        .unwrap();
    model.add_callback(Recorder {
        log: Rc::clone(&log),
        stop_after_batch: Some(0),
    });

    let history = model.fit(&classification_dataset(6, 4, 3), 5, 2).unwrap();
    // 当前轮在第0批之后结束，不再开始下一轮
    assert_eq!(history.batch_history().len(), 1);
    assert_eq!(history.epochs_run(), 1);
    assert_eq!(log.borrow().last().map(String::as_str), Some("train_end"));
}

#[test]
fn test_early_stopping_in_fit() {
    let mut model = mlp(8, 3).with_seed(1);
    model
        .compile(SGD::default(), Loss::SoftmaxCrossEntropyWithLogits, &[])
        .unwrap();
    // 损失不可能低于-1，因此从第一轮起就没有改善
    let early_stopping =
        EarlyStopping::new(Monitor::Loss, 0.0, 1, EarlyStoppingMode::Min, Some(-1.0)).unwrap();
    model.add_callback(early_stopping);

    let history = model.fit(&classification_dataset(6, 4, 3), 10, 3).unwrap();
    assert_eq!(history.epochs_run(), 2);
}
