/*
 * @Author       : 老董
 * @Date         : 2026-01-27
 * @Description  : 神经网络模块的错误类型
 */

use crate::data::DataError;
use crate::errors::TensorError;
use thiserror::Error;

/// 模型搭建、编译、训练、权重迁移过程中的错误
///
/// 任何错误都不会被静默吞掉，均向调用方传播
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NnError {
    /// 拓扑或超参数非法（环、输入层个数不对、形状链不兼容、重复编译等），编译期致命
    #[error("配置错误：{0}")]
    Configuration(String),

    /// 实际喂入的数据形状与编译时确定的形状不一致
    #[error("形状错误：期望{expected}，实际{actual}。{message}")]
    Shape {
        expected: String,
        actual: String,
        message: String,
    },

    /// 变量尚未持有有意义的值（未训练、未init、未加载权重）
    #[error("模型未初始化：{0}")]
    UninitializedModel(String),

    /// 同一注册表中两个层或变量解析为同一名称
    #[error("名称冲突：`{0}`已存在")]
    NameCollision(String),

    /// 权重复制/加载时请求的变量在目标注册表中不存在
    #[error("变量缺失：`{0}`")]
    MissingVariable(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("序列化错误：{0}")]
    Serialization(String),
}

impl From<serde_json::Error> for NnError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for NnError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type NnResult<T> = Result<T, NnError>;
