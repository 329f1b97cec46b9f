/*
 * @Author       : 老董
 * @Date         : 2025-01-21
 * @Description  : DataLoader - 数据批量加载器
 *
 * 提供统一的数据迭代 API，支持：
 * - 自动分批 (batch_size)
 * - 随机打乱 (shuffle)
 * - 丢弃不完整批次 (drop_last)
 *
 * 模型的 fit/evaluate 只依赖它的 Iterator 行为。
 */

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::DataError;
use crate::tensor::Tensor;

/// TensorDataset - 持有特征和标签的数据集
///
/// # 示例
/// ```
/// use only_keras::data::TensorDataset;
/// use only_keras::tensor::Tensor;
///
/// let x = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
/// let y = Tensor::new(&[0.0, 1.0], &[2, 1]);
/// let dataset = TensorDataset::new(x, y).unwrap();
/// assert_eq!(dataset.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDataset {
    features: Tensor,
    labels: Tensor,
    len: usize,
}

impl TensorDataset {
    /// 创建新的 TensorDataset
    ///
    /// # 参数
    /// - `features`: 特征张量，第一维为样本数
    /// - `labels`: 标签张量，第一维为样本数（必须与 features 一致）
    pub fn new(features: Tensor, labels: Tensor) -> Result<Self, DataError> {
        let len = features.shape().first().copied().unwrap_or(0);
        let label_len = labels.shape().first().copied().unwrap_or(0);
        if features.dimension() == 0 || labels.dimension() == 0 || len != label_len {
            return Err(DataError::ShapeMismatch {
                expected: vec![len],
                got: vec![label_len],
            });
        }
        Ok(Self {
            features,
            labels,
            len,
        })
    }

    /// 获取样本数量
    pub fn len(&self) -> usize {
        self.len
    }

    /// 检查数据集是否为空
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn features(&self) -> &Tensor {
        &self.features
    }

    pub fn labels(&self) -> &Tensor {
        &self.labels
    }

    /// 单个样本的特征形状（不含batch维）
    pub fn feature_shape(&self) -> &[usize] {
        &self.features.shape()[1..]
    }

    /// 按下标取出一批样本
    pub fn batch(&self, indices: &[usize]) -> Result<(Tensor, Tensor), DataError> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.len) {
            return Err(DataError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        Ok((
            self.features.select_rows(indices),
            self.labels.select_rows(indices),
        ))
    }

    /// 按顺序把前`train_ratio`比例的样本划为训练集，其余为测试集
    pub fn split(&self, train_ratio: f32) -> Result<(TensorDataset, TensorDataset), DataError> {
        if !(train_ratio > 0.0 && train_ratio < 1.0) {
            return Err(DataError::InvalidSplitRatio(train_ratio));
        }
        let boundary = (self.len as f32 * train_ratio).round() as usize;
        let part = |start: usize, end: usize| Self {
            features: self.features.slice_rows(start, end),
            labels: self.labels.slice_rows(start, end),
            len: end - start,
        };
        Ok((part(0, boundary), part(boundary, self.len)))
    }
}

/// DataLoader - 数据批量加载器，借用数据集而不复制
///
/// # 示例
/// ```
/// use only_keras::data::{DataLoader, TensorDataset};
/// use only_keras::tensor::Tensor;
///
/// let x = Tensor::new(&(0..20).map(|v| v as f32).collect::<Vec<_>>(), &[10, 2]);
/// let y = Tensor::zeros(&[10, 1]);
/// let dataset = TensorDataset::new(x, y).unwrap();
/// let loader = DataLoader::new(&dataset, 4).unwrap().shuffle(true).seed(42);
///
/// let sizes: Vec<usize> = loader.iter().map(|(x, _)| x.batch_size()).collect();
/// assert_eq!(sizes, vec![4, 4, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct DataLoader<'a> {
    dataset: &'a TensorDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Option<u64>,
}

impl<'a> DataLoader<'a> {
    pub fn new(dataset: &'a TensorDataset, batch_size: usize) -> Result<Self, DataError> {
        if batch_size == 0 {
            return Err(DataError::InvalidBatchSize);
        }
        Ok(Self {
            dataset,
            batch_size,
            shuffle: false,
            drop_last: false,
            seed: None,
        })
    }

    /// 设置是否打乱数据
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// 设置是否丢弃最后一个不完整的批次
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// 设置随机种子（用于 shuffle）
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 获取批次数量
    pub fn num_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// 创建迭代器；每次调用都重新生成（必要时重新打乱）样本顺序
    pub fn iter(&self) -> DataLoaderIterator<'_> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            match self.seed {
                Some(seed) => indices.shuffle(&mut StdRng::seed_from_u64(seed)),
                None => indices.shuffle(&mut rand::thread_rng()),
            }
        }
        DataLoaderIterator {
            dataset: self.dataset,
            batch_size: self.batch_size,
            drop_last: self.drop_last,
            indices,
            current_batch: 0,
        }
    }
}

/// DataLoader 迭代器
pub struct DataLoaderIterator<'a> {
    dataset: &'a TensorDataset,
    batch_size: usize,
    drop_last: bool,
    indices: Vec<usize>,
    current_batch: usize,
}

impl Iterator for DataLoaderIterator<'_> {
    type Item = (Tensor, Tensor);

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.indices.len();
        let start = self.current_batch * self.batch_size;
        if start >= n {
            return None;
        }

        let end = (start + self.batch_size).min(n);
        // 如果 drop_last 且批次不完整，则结束
        if self.drop_last && end - start < self.batch_size {
            return None;
        }
        self.current_batch += 1;

        let batch = &self.indices[start..end];
        Some((
            self.dataset.features.select_rows(batch),
            self.dataset.labels.select_rows(batch),
        ))
    }
}
