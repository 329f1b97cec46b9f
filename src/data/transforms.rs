//! 数据变换函数
//!
//! 提供常用的数据预处理操作，如归一化、one-hot 编码等。

use super::DataError;
use crate::tensor::Tensor;

/// 将 0-255 像素值归一化到 0-1
pub fn normalize_pixels(tensor: &Tensor) -> Tensor {
    tensor / 255.0
}

/// 将类别索引转换为 one-hot 编码
///
/// # 参数
/// - `labels`: 类别索引 Tensor，形状 [N] 或 [N, 1]，值为 0..num_classes
/// - `num_classes`: 类别总数
///
/// # 返回
/// one-hot 编码 Tensor，形状 [N, num_classes]；类别越界时返回错误
///
/// # 示例
/// ```
/// use only_keras::data::transforms::one_hot;
/// use only_keras::tensor::Tensor;
///
/// let labels = Tensor::new(&[0.0, 2.0, 1.0], &[3]);
/// let encoded = one_hot(&labels, 3).unwrap();
/// assert_eq!(encoded.to_vec(), vec![1., 0., 0., 0., 0., 1., 0., 1., 0.]);
/// ```
pub fn one_hot(labels: &Tensor, num_classes: usize) -> Result<Tensor, DataError> {
    let flat = labels.to_vec();
    let n = flat.len();

    let mut data = vec![0.0; n * num_classes];
    for (i, &label) in flat.iter().enumerate() {
        let class_idx = label as usize;
        if label < 0.0 || class_idx >= num_classes {
            return Err(DataError::IndexOutOfBounds {
                index: class_idx,
                len: num_classes,
            });
        }
        data[i * num_classes + class_idx] = 1.0;
    }
    Ok(Tensor::new(&data, &[n, num_classes]))
}
