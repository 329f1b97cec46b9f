/*
 * @Author       : 老董
 * @Date         : 2026-02-08
 * @Description  : 权重快照的保存与恢复：快照经字节序列化后加载到新模型，
 *                 新模型的预测以及带优化器状态的后续训练都与原模型一致
 */
use only_keras::data::TensorDataset;
use only_keras::data::transforms::one_hot;
use only_keras::nn::layer::{Dense, Input, Layer};
use only_keras::nn::model::WeightSnapshot;
use only_keras::nn::optimizer::Adam;
use only_keras::nn::{Activation, Loss, Metric, Model, NnResult};
use only_keras::tensor::Tensor;

fn build_model(seed: u64) -> NnResult<Model> {
    let mut model = Model::sequential(vec![
        Layer::new(Input::new(&[3])),
        Layer::new(Dense::new(6).with_activation(Activation::Relu)),
        Layer::new(Dense::new(2)),
    ])
    .with_seed(seed);
    model.compile(
        Adam::default(),
        Loss::SoftmaxCrossEntropyWithLogits,
        &[Metric::Accuracy],
    )?;
    Ok(model)
}

fn get_data() -> TensorDataset {
    let n = 12;
    let x: Vec<f32> = (0..n * 3).map(|v| ((v * 5) % 11) as f32 / 11.0).collect();
    let labels: Vec<f32> = (0..n).map(|i| (i % 2) as f32).collect();
    let y = one_hot(&Tensor::new(&labels, &[n]), 2).unwrap();
    TensorDataset::new(Tensor::new(&x, &[n, 3]), y).unwrap()
}

#[test]
fn test_checkpoint_round_trip() -> NnResult<()> {
    let dataset = get_data();
    let mut original = build_model(1)?;
    original.fit(&dataset, 3, 4)?;

    // 1. 保存
    let bytes = original.weights_snapshot(true)?.to_bytes()?;
    println!("快照大小: {}字节", bytes.len());

    // 2. 恢复到另一个种子的新模型
    let mut restored = build_model(2)?;
    restored.load_weights(&WeightSnapshot::from_bytes(&bytes)?, true)?;

    let probe = Tensor::new(&[0.2, 0.4, 0.6], &[1, 3]);
    assert_eq!(
        original.predict_softly_batch(&probe)?,
        restored.predict_softly_batch(&probe)?
    );

    // 3. 继续训练，两者保持一致
    original.fit(&dataset, 2, 4)?;
    restored.fit(&dataset, 2, 4)?;
    assert_eq!(original.weights_snapshot(true)?, restored.weights_snapshot(true)?);
    Ok(())
}
