//! 数据加载错误类型定义

use thiserror::Error;

/// 数据加载相关错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    /// 索引越界
    #[error("索引越界: {index} >= {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// 形状不匹配
    #[error("形状不匹配: 期望 {expected:?}, 实际 {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// 批大小非法
    #[error("批大小必须大于 0")]
    InvalidBatchSize,

    /// 划分比例非法
    #[error("划分比例须在 (0, 1) 内，实际为 {0}")]
    InvalidSplitRatio(f32),
}
