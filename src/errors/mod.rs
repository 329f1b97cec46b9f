/*
 * @Author       : 老董
 * @Date         : 2023-08-17 17:24:24
 * @Description  : 张量层面的错误类型
 */

use std::fmt::{self, Display};
use thiserror::Error;

/// 张量的二元运算符（仅用于错误提示）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    MatMul,
    Concat,
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operation_name = match self {
            Self::Add => "相加",
            Self::Sub => "相减",
            Self::Mul => "相乘",
            Self::Div => "相除",
            Self::MatMul => "矩阵相乘",
            Self::Concat => "拼接",
        };
        write!(f, "{operation_name}")
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    // 张量二元运算
    #[error(
        "形状不一致，故无法{operator}：第一个张量的形状为{tensor1_shape:?}，第二个张量的形状为{tensor2_shape:?}"
    )]
    OperatorError {
        operator: Operator,
        tensor1_shape: Vec<usize>,
        tensor2_shape: Vec<usize>,
    },

    #[error("数据长度{data_len}与形状{shape:?}所需的元素个数{expected}不一致")]
    DataLengthMismatch {
        data_len: usize,
        shape: Vec<usize>,
        expected: usize,
    },

    #[error("无法将形状为{from:?}的张量重塑为{to:?}")]
    ReshapeError { from: Vec<usize>, to: Vec<usize> },

    #[error("该操作要求{expected}阶张量，实际为{got}阶")]
    RankMismatch { expected: usize, got: usize },

    #[error("维度{axis}越界：张量只有{rank}阶")]
    AxisOutOfRange { axis: usize, rank: usize },

    #[error("张量列表为空")]
    EmptyList,
}
