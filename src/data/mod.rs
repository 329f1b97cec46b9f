//! 数据加载模块
//!
//! 提供数据集、批处理与常用变换。
//!
//! # 主要组件
//!
//! - [`DataLoader`]: 数据批量加载器
//! - [`TensorDataset`]: 持有特征和标签的数据集
//! - [`transforms`]: 数据变换函数（归一化、one-hot 等）
//! - [`DataError`]: 数据加载错误类型
//!
//! # 使用示例
//!
//! ```ignore
//! use only_keras::data::{DataLoader, TensorDataset};
//!
//! let dataset = TensorDataset::new(train_x, train_y)?;
//! let loader = DataLoader::new(&dataset, 32)?.shuffle(true).seed(42);
//!
//! for (x_batch, y_batch) in loader.iter() {
//!     // ...
//! }
//! ```

mod dataloader;
pub mod error;
pub mod transforms;

#[cfg(test)]
mod tests;

pub use dataloader::{DataLoader, DataLoaderIterator, TensorDataset};
pub use error::DataError;
