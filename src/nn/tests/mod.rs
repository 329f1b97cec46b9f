/*
 * @Author       : 老董
 * @Date         : 2026-02-07
 * @Description  : nn 模块单元测试
 */

mod callback;
mod graph;
mod loss_metric;
mod transfer;

use crate::data::TensorDataset;
use crate::data::transforms::one_hot;
use crate::nn::layer::{Dense, Input, Layer};
use crate::nn::{Activation, Model};
use crate::tensor::Tensor;

/// 可复现的小型分类数据：第i个样本属于第`i % classes`类，特征与类别相关
fn classification_dataset(n: usize, features: usize, classes: usize) -> TensorDataset {
    let mut data = Vec::with_capacity(n * features);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let class = i % classes;
        for j in 0..features {
            let noise = ((i * 7 + j * 3) % 5) as f32 * 0.05;
            let signal = if j % classes == class { 1.0 } else { 0.0 };
            data.push(signal + noise);
        }
        labels.push(class as f32);
    }
    let x = Tensor::new(&data, &[n, features]);
    let y = one_hot(&Tensor::new(&labels, &[n]), classes).unwrap();
    TensorDataset::new(x, y).unwrap()
}

/// Input(4) -> Dense(hidden, Relu) -> Dense(classes)
fn mlp(hidden: usize, classes: usize) -> Model {
    Model::sequential(vec![
        Layer::new(Input::new(&[4])),
        Layer::new(Dense::new(hidden).with_activation(Activation::Relu)),
        Layer::new(Dense::new(classes)),
    ])
}
