/*
 * @Author       : 老董
 * @Date         : 2026-02-08
 * @Description  : XOR（异或）问题测试 - 经典的非线性分类问题，需要隐藏层+非线性激活才能解决
 *                 网络结构：Input(2) -> Dense(8, Tanh) -> Dense(2) -> SoftmaxCrossEntropy
 */
use only_keras::data::TensorDataset;
use only_keras::data::transforms::one_hot;
use only_keras::nn::layer::{Dense, Input, Layer};
use only_keras::nn::optimizer::Adam;
use only_keras::nn::{Activation, Loss, Metric, Model, NnResult};
use only_keras::tensor::Tensor;

/// XOR问题训练数据
/// 输入: (0,0), (0,1), (1,0), (1,1)
/// 输出: 0, 1, 1, 0
fn get_xor_data() -> TensorDataset {
    let x = Tensor::new(&[0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0], &[4, 2]);
    let y = one_hot(&Tensor::new(&[0.0, 1.0, 1.0, 0.0], &[4]), 2).unwrap();
    TensorDataset::new(x, y).unwrap()
}

#[test]
fn test_xor() -> NnResult<()> {
    let start_time = std::time::Instant::now();

    // ========== 网络结构 ==========
    let mut model = Model::sequential(vec![
        Layer::new(Input::new(&[2])),
        Layer::new(Dense::new(8).with_activation(Activation::Tanh)),
        Layer::new(Dense::new(2)),
    ])
    .with_name("xor")
    .with_seed(42);
    model.compile(
        Adam::new(0.05, 0.9, 0.999, 1e-7)?,
        Loss::SoftmaxCrossEntropyWithLogits,
        &[Metric::Accuracy],
    )?;

    let dataset = get_xor_data();

    // 测试参数
    let max_epochs = 500;
    let consecutive_success_required = 10;
    let mut consecutive_success_count = 0;
    let mut test_passed = false;

    for epoch in 0..max_epochs {
        model.fit(&dataset, 1, 4)?;
        let result = model.evaluate(&dataset, 4)?;
        let accuracy = result.metric(Metric::Accuracy).unwrap_or(0.0);

        if (epoch + 1) % 50 == 0 || epoch == 0 {
            println!(
                "训练回合: {}, 损失: {:.4}, 正确率: {:.1}%",
                epoch + 1,
                result.loss,
                accuracy * 100.0
            );
        }

        if accuracy >= 1.0 {
            consecutive_success_count += 1;
            if consecutive_success_count >= consecutive_success_required {
                test_passed = true;
                println!("🎉 测试通过！第{}回合起连续{}次全部正确", epoch + 2 - consecutive_success_required, consecutive_success_required);
                break;
            }
        } else {
            consecutive_success_count = 0;
        }
    }

    println!("总耗时: {:.2?}", start_time.elapsed());

    // 打印最终的预测结果
    println!("\n=== 最终预测结果 ===");
    let samples = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
    for (sample, expected) in samples.iter().zip([0, 1, 1, 0]) {
        let input = Tensor::new(sample, &[2]);
        let predicted = model.predict(&input)?;
        let probabilities = model.predict_softly(&input)?;
        println!(
            "XOR({}, {}) = {} (预测: {}, 概率: {:?})",
            sample[0], sample[1], expected, predicted, probabilities
        );
        if test_passed {
            assert_eq!(predicted, expected);
        }
    }

    assert!(test_passed, "XOR在{max_epochs}个回合内没有学会");
    Ok(())
}
