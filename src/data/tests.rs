//! 数据模块单元测试

use crate::data::transforms::{normalize_pixels, one_hot};
use crate::data::{DataError, DataLoader, TensorDataset};
use crate::tensor::Tensor;

fn sequential_dataset(n: usize) -> TensorDataset {
    let features = Tensor::new(&(0..n * 2).map(|x| x as f32).collect::<Vec<_>>(), &[n, 2]);
    let labels = Tensor::new(&(0..n).map(|x| x as f32).collect::<Vec<_>>(), &[n, 1]);
    TensorDataset::new(features, labels).unwrap()
}

#[test]
fn test_tensor_dataset() {
    let dataset = sequential_dataset(3);
    assert_eq!(dataset.len(), 3);
    assert!(!dataset.is_empty());
    assert_eq!(dataset.feature_shape(), &[2]);
}

#[test]
fn test_tensor_dataset_len_mismatch() {
    let features = Tensor::zeros(&[3, 2]);
    let labels = Tensor::zeros(&[4, 1]);
    assert_eq!(
        TensorDataset::new(features, labels),
        Err(DataError::ShapeMismatch {
            expected: vec![3],
            got: vec![4],
        })
    );
}

#[test]
fn test_dataset_batch_out_of_bounds() {
    let dataset = sequential_dataset(3);
    let (x, y) = dataset.batch(&[2, 0]).unwrap();
    assert_eq!(x.to_vec(), vec![4.0, 5.0, 0.0, 1.0]);
    assert_eq!(y.to_vec(), vec![2.0, 0.0]);
    assert_eq!(
        dataset.batch(&[3]),
        Err(DataError::IndexOutOfBounds { index: 3, len: 3 })
    );
}

#[test]
fn test_dataset_split() {
    let dataset = sequential_dataset(10);
    let (train, test) = dataset.split(0.8).unwrap();
    assert_eq!(train.len(), 8);
    assert_eq!(test.len(), 2);
    assert_eq!(test.labels().to_vec(), vec![8.0, 9.0]);
    assert_eq!(dataset.split(1.0), Err(DataError::InvalidSplitRatio(1.0)));
}

#[test]
fn test_dataloader_basic() {
    let dataset = sequential_dataset(10);
    let loader = DataLoader::new(&dataset, 3).unwrap();
    assert_eq!(loader.num_batches(), 4); // 10 / 3 = 3.33, 向上取整 = 4

    let batches: Vec<_> = loader.iter().collect();
    assert_eq!(batches.len(), 4);
    assert_eq!(batches[0].0.shape(), &[3, 2]);
    assert_eq!(batches[2].1.shape(), &[3, 1]);
    // 最后一个批次大小为 1
    assert_eq!(batches[3].0.shape(), &[1, 2]);
    assert_eq!(batches[3].1.to_vec(), vec![9.0]);
}

#[test]
fn test_dataloader_drop_last() {
    let dataset = sequential_dataset(10);
    let loader = DataLoader::new(&dataset, 3).unwrap().drop_last(true);
    assert_eq!(loader.num_batches(), 3);
    assert_eq!(loader.iter().count(), 3);
}

#[test]
fn test_dataloader_zero_batch_size() {
    let dataset = sequential_dataset(2);
    assert_eq!(
        DataLoader::new(&dataset, 0).unwrap_err(),
        DataError::InvalidBatchSize
    );
}

#[test]
fn test_dataloader_shuffle_with_seed() {
    let dataset = sequential_dataset(10);

    // 使用相同种子，两次迭代应该产生相同的结果
    let loader1 = DataLoader::new(&dataset, 3).unwrap().shuffle(true).seed(42);
    let loader2 = DataLoader::new(&dataset, 3).unwrap().shuffle(true).seed(42);
    let batches1: Vec<_> = loader1.iter().collect();
    let batches2: Vec<_> = loader2.iter().collect();
    assert_eq!(batches1, batches2);

    // 打乱后特征与标签仍然成对
    for (x, y) in &batches1 {
        for (row, label) in x.to_vec().chunks(2).zip(y.to_vec()) {
            assert_eq!(row[0], label * 2.0);
        }
    }

    // 所有样本都恰好出现一次
    let mut labels: Vec<f32> = batches1.iter().flat_map(|(_, y)| y.to_vec()).collect();
    labels.sort_by(f32::total_cmp);
    assert_eq!(labels, (0..10).map(|x| x as f32).collect::<Vec<_>>());
}

#[test]
fn test_one_hot() {
    let labels = Tensor::new(&[0.0, 2.0, 1.0], &[3, 1]);
    let encoded = one_hot(&labels, 3).unwrap();
    assert_eq!(encoded.shape(), &[3, 3]);
    assert_eq!(encoded.to_vec(), vec![1., 0., 0., 0., 0., 1., 0., 1., 0.]);

    assert_eq!(
        one_hot(&labels, 2),
        Err(DataError::IndexOutOfBounds { index: 2, len: 2 })
    );
}

#[test]
fn test_normalize_pixels() {
    let pixels = Tensor::new(&[0.0, 127.5, 255.0], &[3]);
    assert_eq!(normalize_pixels(&pixels).to_vec(), vec![0.0, 0.5, 1.0]);
}
