/*
 * @Author       : 老董
 * @Date         : 2026-02-05
 * @Description  : 训练、评估与推理
 *
 * 每个批次：校验形状 → 按拓扑序前向 → 损失（含正则项） → 逆拓扑序反向
 * → 优化器生成更新 → 一次性执行全部更新。任何一步出错立即返回。
 */

use super::callback::{Callback, TrainingControl};
use super::history::{BatchTrainingEvent, EpochTrainingEvent, EvaluationResult, TrainingHistory};
use super::{Compiled, Model, not_compiled};
use crate::data::{DataLoader, TensorDataset};
use crate::nn::graph::Gradients;
use crate::nn::layer::{Layer, LayerKind, LayerOps, LayerTrace};
use crate::nn::optimizer::OptimizerOps;
use crate::nn::{Metric, NnError, NnResult};
use crate::tensor::Tensor;

impl Model {
    // ========== 训练 ==========

    /// 训练`epochs`轮，返回训练历史；首次训练前自动初始化变量
    pub fn fit(
        &mut self,
        dataset: &TensorDataset,
        epochs: usize,
        batch_size: usize,
    ) -> NnResult<TrainingHistory> {
        self.fit_with_callbacks(dataset, None, epochs, batch_size, batch_size)
    }

    /// 训练，并在每轮结束时在`validation`上评估
    pub fn fit_with_validation(
        &mut self,
        train: &TensorDataset,
        validation: &TensorDataset,
        epochs: usize,
        train_batch_size: usize,
        validation_batch_size: usize,
    ) -> NnResult<TrainingHistory> {
        self.fit_with_callbacks(
            train,
            Some(validation),
            epochs,
            train_batch_size,
            validation_batch_size,
        )
    }

    fn fit_with_callbacks(
        &mut self,
        train: &TensorDataset,
        validation: Option<&TensorDataset>,
        epochs: usize,
        train_batch_size: usize,
        validation_batch_size: usize,
    ) -> NnResult<TrainingHistory> {
        // 回调在训练期间从模型中取出，结束（包括出错）后放回
        let mut callbacks = std::mem::take(&mut self.callbacks);
        let result = self.run_epochs(
            &mut callbacks,
            train,
            validation,
            epochs,
            train_batch_size,
            validation_batch_size,
        );
        self.callbacks = callbacks;
        result
    }

    fn run_epochs(
        &mut self,
        callbacks: &mut [Box<dyn Callback>],
        train: &TensorDataset,
        validation: Option<&TensorDataset>,
        epochs: usize,
        train_batch_size: usize,
        validation_batch_size: usize,
    ) -> NnResult<TrainingHistory> {
        let metrics = self.compiled_state()?.metrics.clone();
        if train.is_empty() {
            return Err(NnError::Configuration("训练集为空".to_string()));
        }
        let loader = DataLoader::new(train, train_batch_size)?;
        self.initialize_for_training()?;

        for callback in callbacks.iter_mut() {
            callback.on_train_begin();
        }

        let mut history = TrainingHistory::new();
        for epoch in 1..=epochs {
            for callback in callbacks.iter_mut() {
                callback.on_epoch_begin(epoch);
            }

            let mut stop = false;
            let mut means = BatchMeans::new(&metrics);
            for (batch, (x, y)) in loader.iter().enumerate() {
                for callback in callbacks.iter_mut() {
                    callback.on_train_batch_begin(epoch, batch);
                }

                let (loss, batch_metrics) = self.train_step(&x, &y)?;
                if !loss.is_finite() {
                    log::debug!("epochs: {epoch} batch: {batch} 损失值非有限：{loss}");
                }
                log::debug!(
                    "epochs: {epoch} batch: {batch} loss: {loss} metric: {}",
                    format_metrics(&batch_metrics)
                );
                means.add(loss, &batch_metrics);

                let event = BatchTrainingEvent {
                    epoch,
                    batch,
                    loss,
                    metrics: batch_metrics,
                };
                stop |= notify_all(callbacks, |c| c.on_train_batch_end(&event));
                history.append_batch(event);
                if stop {
                    break;
                }
            }

            let (loss, epoch_metrics) = means.finish();
            let mut event = EpochTrainingEvent {
                epoch,
                loss,
                metrics: epoch_metrics,
                val_loss: None,
                val_metrics: None,
            };
            if let Some(validation) = validation {
                let result = self.evaluate(validation, validation_batch_size)?;
                event.val_loss = Some(result.loss);
                event.val_metrics = Some(result.metrics);
            }
            log::info!(
                "epochs: {} loss: {} metric: {}",
                epoch,
                event.loss,
                format_metrics(&event.metrics)
            );
            if let (Some(val_loss), Some(val_metrics)) = (event.val_loss, &event.val_metrics) {
                log::info!(
                    "epochs: {} val_loss: {} val_metric: {}",
                    epoch,
                    val_loss,
                    format_metrics(val_metrics)
                );
            }

            history.append_epoch(event.clone());
            stop |= notify_all(callbacks, |c| c.on_epoch_end(&event, &history));
            if stop {
                log::info!("第{epoch}轮结束后停止训练");
                break;
            }
        }

        for callback in callbacks.iter_mut() {
            callback.on_train_end(&history);
        }
        Ok(history)
    }

    /// 首次训练前初始化层变量；优化器变量只补齐缺失的（加载权重时可能已带有优化器状态）
    fn initialize_for_training(&mut self) -> NnResult<()> {
        let compiled = self.compiled.as_mut().ok_or_else(not_compiled)?;
        if !self.is_initialized {
            compiled.graph.initialize_layer_variables();
            self.is_initialized = true;
            log::debug!("模型`{}`的层变量已初始化", self.name);
        }
        if !self.is_optimizer_initialized {
            compiled.graph.initialize_missing_optimizer_variables();
            self.is_optimizer_initialized = true;
        }
        Ok(())
    }

    /// 一个批次的训练，返回（损失，指标）
    fn train_step(&mut self, x: &Tensor, y: &Tensor) -> NnResult<(f32, Vec<(Metric, f32)>)> {
        let compiled = self.compiled.as_mut().ok_or_else(not_compiled)?;
        compiled.check_batch(&self.layers, x, y)?;

        // 1. 前向
        let traces = compiled.forward(&self.layers, x, true)?;
        let output = compiled.output(&traces)?;

        // 2. 损失与指标
        let (loss, output_grad) = compiled.loss.value_and_gradient(output, y)?;
        let loss = loss + compiled.graph.regularization_loss()?;
        let metrics = compiled.compute_metrics(output, y)?;

        // 3. 反向
        let grads = compiled.backward(&self.layers, &traces, output_grad)?;
        let graph = &compiled.graph;
        let gradients = grads.ordered(&compiled.trainable, |id| {
            graph
                .variable(id)
                .map(|v| v.shape().to_vec())
                .unwrap_or_default()
        });

        // 4. 更新：优化器的更新与各层的状态更新在同一次运行中写入
        let mut updates =
            compiled
                .optimizer
                .apply_gradients(&compiled.graph, &compiled.trainable, &gradients)?;
        updates.extend(
            traces
                .into_iter()
                .flatten()
                .flat_map(|trace| trace.state_updates),
        );
        compiled.graph.run_updates(updates)?;

        Ok((loss, metrics))
    }

    // ========== 评估 ==========

    /// 在数据集上评估，返回各批次（含较短的最后一批）的不加权平均
    pub fn evaluate(
        &mut self,
        dataset: &TensorDataset,
        batch_size: usize,
    ) -> NnResult<EvaluationResult> {
        let compiled = self.compiled.as_mut().ok_or_else(not_compiled)?;
        if !self.is_initialized {
            return Err(NnError::UninitializedModel(
                "评估前需要先训练、调用init()或加载权重".to_string(),
            ));
        }
        if dataset.is_empty() {
            return Err(NnError::Configuration("评估集为空".to_string()));
        }

        let loader = DataLoader::new(dataset, batch_size)?;
        let mut means = BatchMeans::new(&compiled.metrics);
        for (batch, (x, y)) in loader.iter().enumerate() {
            compiled.check_batch(&self.layers, &x, &y)?;
            let traces = compiled.forward(&self.layers, &x, false)?;
            let output = compiled.output(&traces)?;
            let (loss, _) = compiled.loss.value_and_gradient(output, &y)?;
            let loss = loss + compiled.graph.regularization_loss()?;
            let metrics = compiled.compute_metrics(output, &y)?;
            log::debug!(
                "evaluate batch: {batch} loss: {loss} metric: {}",
                format_metrics(&metrics)
            );
            means.add(loss, &metrics);
        }

        let (loss, metrics) = means.finish();
        Ok(EvaluationResult { loss, metrics })
    }

    // ========== 推理 ==========

    /// 单个样本的预测类别（argmax）
    pub fn predict(&mut self, x: &Tensor) -> NnResult<usize> {
        let batch = self.single_sample_batch(x)?;
        Ok(self.predict_softly_batch(&batch)?.argmax())
    }

    /// 单个样本的预测值（SoftmaxCrossEntropyWithLogits下为概率）
    pub fn predict_softly(&mut self, x: &Tensor) -> NnResult<Vec<f32>> {
        let batch = self.single_sample_batch(x)?;
        Ok(self.predict_softly_batch(&batch)?.to_vec())
    }

    /// 一批样本的预测类别
    pub fn predict_batch(&mut self, x: &Tensor) -> NnResult<Vec<usize>> {
        Ok(self.predict_softly_batch(x)?.argmax_rows())
    }

    /// 一批样本的预测值
    pub fn predict_softly_batch(&mut self, x: &Tensor) -> NnResult<Tensor> {
        let compiled = self.compiled.as_mut().ok_or_else(not_compiled)?;
        if !self.is_initialized {
            return Err(NnError::UninitializedModel(
                "预测前需要先训练、调用init()或加载权重".to_string(),
            ));
        }
        compiled.check_input(x)?;
        let traces = compiled.forward(&self.layers, x, false)?;
        Ok(compiled.loss.prediction(compiled.output(&traces)?))
    }

    /// 单个样本可以带或不带大小为1的batch维
    fn single_sample_batch(&self, x: &Tensor) -> NnResult<Tensor> {
        let compiled = self.compiled_state()?;
        let input = &compiled.output_shapes[compiled.input_layer];
        let tail = input.tail();
        let shape = x.shape();
        if shape == tail.as_slice() {
            let mut batched = vec![1];
            batched.extend_from_slice(&tail);
            return Ok(x.reshape(&batched)?);
        }
        if shape.first() == Some(&1) && shape[1..] == tail[..] {
            return Ok(x.clone());
        }
        Err(NnError::Shape {
            expected: input.to_string(),
            actual: format!("{shape:?}"),
            message: "predict只接受单个样本".to_string(),
        })
    }

    // ========== 初始化 ==========

    /// 显式初始化全部变量；已初始化的模型请用`reset()`
    pub fn init(&mut self) -> NnResult<()> {
        let compiled = self.compiled.as_mut().ok_or_else(not_compiled)?;
        if self.is_initialized {
            return Err(NnError::Configuration(format!(
                "模型`{}`已初始化，如需重新初始化请调用reset()",
                self.name
            )));
        }
        compiled.graph.initialize_layer_variables();
        compiled.graph.initialize_missing_optimizer_variables();
        self.is_initialized = true;
        self.is_optimizer_initialized = true;
        Ok(())
    }

    /// 重新运行所有初始化器（层变量与优化器变量）
    pub fn reset(&mut self) -> NnResult<()> {
        let compiled = self.compiled.as_mut().ok_or_else(not_compiled)?;
        compiled.graph.initialize_layer_variables();
        compiled.graph.initialize_optimizer_variables();
        self.is_initialized = true;
        self.is_optimizer_initialized = true;
        log::debug!("模型`{}`的全部变量已重新初始化", self.name);
        Ok(())
    }
}

impl Compiled {
    fn check_input(&self, x: &Tensor) -> NnResult<()> {
        let input = &self.output_shapes[self.input_layer];
        if input.is_compatible_with_tensor(x.shape()) {
            return Ok(());
        }
        Err(NnError::Shape {
            expected: input.to_string(),
            actual: format!("{:?}", x.shape()),
            message: "输入数据的形状与Input层不一致".to_string(),
        })
    }

    fn check_batch(&self, layers: &[Layer], x: &Tensor, y: &Tensor) -> NnResult<()> {
        self.check_input(x)?;
        if x.batch_size() != y.batch_size() {
            return Err(NnError::Shape {
                expected: format!("{}个标签", x.batch_size()),
                actual: format!("{}个标签", y.batch_size()),
                message: "特征与标签的样本数不一致".to_string(),
            });
        }

        let output = &self.output_shapes[self.output_layer];
        if output.is_compatible_with_tensor(y.shape()) {
            return Ok(());
        }
        let label_width = y.shape().last().copied().unwrap_or(1);
        let classes = output.last().unwrap_or(0);
        let hint = match layers
            .iter()
            .rev()
            .find(|l| matches!(l.kind(), LayerKind::Dense(_)))
        {
            Some(dense) => format!("请检查最后一个Dense层`{}`的units", dense.name()),
            None => "请检查输出层的宽度".to_string(),
        };
        Err(NnError::Shape {
            expected: output.to_string(),
            actual: format!("{:?}", y.shape()),
            message: format!(
                "标签宽度为{label_width}，而模型输出的类别数（number_of_classes）为{classes}；{hint}"
            ),
        })
    }

    /// 按拓扑序前向，返回每层的记录（下标与层下标一致）
    fn forward(
        &mut self,
        layers: &[Layer],
        x: &Tensor,
        training: bool,
    ) -> NnResult<Vec<Option<LayerTrace>>> {
        let mut traces: Vec<Option<LayerTrace>> = (0..layers.len()).map(|_| None).collect();
        for &idx in &self.order {
            let layer = &layers[idx];
            let trace = {
                let inputs = if idx == self.input_layer {
                    vec![x]
                } else {
                    layer_inputs(&traces, &self.inbound[idx])?
                };
                layer
                    .kind()
                    .forward(layer.name(), &mut self.graph, &inputs, training)?
            };
            traces[idx] = Some(trace);
        }
        Ok(traces)
    }

    fn output<'a>(&self, traces: &'a [Option<LayerTrace>]) -> NnResult<&'a Tensor> {
        traces[self.output_layer]
            .as_ref()
            .map(|t| &t.output)
            .ok_or_else(|| NnError::Configuration("输出层没有执行前向计算".to_string()))
    }

    /// 按逆拓扑序反向，汇总所有层变量的梯度（含正则项）
    fn backward(
        &self,
        layers: &[Layer],
        traces: &[Option<LayerTrace>],
        output_grad: Tensor,
    ) -> NnResult<Gradients> {
        let mut upstream: Vec<Option<Tensor>> = (0..layers.len()).map(|_| None).collect();
        upstream[self.output_layer] = Some(output_grad);

        let mut grads = Gradients::new();
        for &idx in self.order.iter().rev() {
            if idx == self.input_layer {
                continue;
            }
            // 不通向输出的层没有梯度
            let Some(grad) = upstream[idx].take() else {
                continue;
            };
            let layer = &layers[idx];
            let trace = traces[idx].as_ref().ok_or_else(|| {
                NnError::Configuration(format!("层`{}`没有执行前向计算", layer.name()))
            })?;
            let inputs = layer_inputs(traces, &self.inbound[idx])?;
            let input_grads =
                layer
                    .kind()
                    .backward(layer.name(), &self.graph, &inputs, trace, &grad, &mut grads)?;

            // 一个层的输出被多个层使用时，梯度相加
            for (&source, input_grad) in self.inbound[idx].iter().zip(input_grads) {
                let merged = match upstream[source].take() {
                    Some(mut acc) => {
                        acc += &input_grad;
                        acc
                    }
                    None => input_grad,
                };
                upstream[source] = Some(merged);
            }
        }

        self.graph.accumulate_regularization_gradients(&mut grads)?;
        Ok(grads)
    }

    fn compute_metrics(&self, output: &Tensor, y: &Tensor) -> NnResult<Vec<(Metric, f32)>> {
        let prediction = self.loss.prediction(output);
        self.metrics
            .iter()
            .map(|&metric| Ok((metric, metric.compute(&prediction, y)?)))
            .collect()
    }
}

fn layer_inputs<'a>(
    traces: &'a [Option<LayerTrace>],
    sources: &[usize],
) -> NnResult<Vec<&'a Tensor>> {
    sources
        .iter()
        .map(|&i| {
            traces[i]
                .as_ref()
                .map(|t| &t.output)
                .ok_or_else(|| NnError::Configuration(format!("第{i}层尚未执行前向计算")))
        })
        .collect()
}

/// 依次通知所有回调（不因某个回调要求停止而跳过其余回调），任一要求停止则返回true
fn notify_all(
    callbacks: &mut [Box<dyn Callback>],
    mut notify: impl FnMut(&mut dyn Callback) -> TrainingControl,
) -> bool {
    let mut stop = false;
    for callback in callbacks.iter_mut() {
        stop |= notify(callback.as_mut()) == TrainingControl::Stop;
    }
    stop
}

fn format_metrics(metrics: &[(Metric, f32)]) -> String {
    if metrics.is_empty() {
        return "-".to_string();
    }
    metrics
        .iter()
        .map(|(metric, value)| format!("{metric}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 各批次损失与指标的不加权平均
struct BatchMeans {
    loss_sum: f32,
    metric_sums: Vec<(Metric, f32)>,
    count: usize,
}

impl BatchMeans {
    fn new(metrics: &[Metric]) -> Self {
        Self {
            loss_sum: 0.0,
            metric_sums: metrics.iter().map(|&m| (m, 0.0)).collect(),
            count: 0,
        }
    }

    fn add(&mut self, loss: f32, metrics: &[(Metric, f32)]) {
        self.loss_sum += loss;
        for ((_, sum), (_, value)) in self.metric_sums.iter_mut().zip(metrics) {
            *sum += value;
        }
        self.count += 1;
    }

    fn finish(self) -> (f32, Vec<(Metric, f32)>) {
        let n = self.count.max(1) as f32;
        let metrics = self
            .metric_sums
            .into_iter()
            .map(|(m, sum)| (m, sum / n))
            .collect();
        (self.loss_sum / n, metrics)
    }
}
